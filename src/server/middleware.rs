use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

use super::AppState;
use crate::error::AppError;

/// Header carrying the shared intake key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Rejects intake requests whose `X-API-Key` does not match `api.key`.
///
/// With no key configured every request passes.
pub async fn api_key_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected_key) = &state.settings.api.key else {
        return Ok(next.run(req).await);
    };

    match req.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        Some(key) if key == expected_key => Ok(next.run(req).await),
        Some(_) => Err(AppError::Unauthorized("Invalid API key".to_string())),
        None => Err(AppError::Unauthorized(format!(
            "Missing {} header",
            API_KEY_HEADER
        ))),
    }
}

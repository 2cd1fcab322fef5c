use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::push::{Receipt, SubmitError};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct SubmitReceiptResponse {
    pub accepted: bool,
    /// Receipts waiting in the queue after this one was added
    pub queued: usize,
    pub timestamp: DateTime<Utc>,
}

/// POST /api/v1/receipts - queue a receipt for push delivery
///
/// Delivery is best-effort: 202 only means the receipt was queued.
#[tracing::instrument(skip_all, fields(topic = %receipt.payload.topic))]
pub async fn submit_receipt(
    State(state): State<AppState>,
    Json(receipt): Json<Receipt>,
) -> Result<(StatusCode, Json<SubmitReceiptResponse>)> {
    if receipt.to.is_empty() {
        return Err(AppError::Validation("Receipt has no recipients".to_string()));
    }

    let intake = state
        .push
        .intake()
        .ok_or(AppError::NotAccepted(SubmitError::NotReady))?;
    intake.try_submit(receipt)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitReceiptResponse {
            accepted: true,
            queued: intake.queued(),
            timestamp: Utc::now(),
        }),
    ))
}

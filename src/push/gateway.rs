//! Push gateway client abstraction and send-failure classification.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::message::PushMessage;

/// Failure of a single send, as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("message rate exceeded")]
    MessageRateExceeded,

    #[error("server unavailable")]
    ServerUnavailable,

    #[error("internal gateway error")]
    Internal,

    #[error("unknown gateway error: {0}")]
    Unknown(String),

    #[error("mismatched sender credential")]
    MismatchedCredential,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("registration token not registered")]
    RegistrationTokenNotRegistered,

    #[error("{0}")]
    Other(String),
}

/// What the pipeline does after a failed send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    /// Stop sending the rest of this batch
    AbortBatch,
    /// Delete the device registration and continue
    PruneDevice,
    /// Log and move on to the next device
    Continue,
}

impl GatewayError {
    /// Map a gateway HTTP v1 error code onto an error variant.
    pub fn from_error_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "QUOTA_EXCEEDED" | "MESSAGE_RATE_EXCEEDED" => GatewayError::MessageRateExceeded,
            "UNAVAILABLE" | "SERVER_UNAVAILABLE" => GatewayError::ServerUnavailable,
            "INTERNAL" => GatewayError::Internal,
            "UNKNOWN" | "UNSPECIFIED_ERROR" => GatewayError::Unknown(message),
            "SENDER_ID_MISMATCH" | "MISMATCHED_CREDENTIAL" => GatewayError::MismatchedCredential,
            "INVALID_ARGUMENT" => GatewayError::InvalidArgument(message),
            "UNREGISTERED" | "REGISTRATION_TOKEN_NOT_REGISTERED" => {
                GatewayError::RegistrationTokenNotRegistered
            }
            _ => GatewayError::Other(format!("{}: {}", code, message)),
        }
    }

    /// Failures caused by this service's own configuration
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            GatewayError::MismatchedCredential | GatewayError::InvalidArgument(_)
        )
    }

    pub fn remediation(&self) -> Remediation {
        match self {
            GatewayError::MessageRateExceeded
            | GatewayError::ServerUnavailable
            | GatewayError::Internal
            | GatewayError::Unknown(_)
            | GatewayError::MismatchedCredential
            | GatewayError::InvalidArgument(_) => Remediation::AbortBatch,
            GatewayError::RegistrationTokenNotRegistered => Remediation::PruneDevice,
            GatewayError::Other(_) => Remediation::Continue,
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::MessageRateExceeded => "rate_exceeded",
            GatewayError::ServerUnavailable => "server_unavailable",
            GatewayError::Internal => "internal",
            GatewayError::Unknown(_) => "unknown",
            GatewayError::MismatchedCredential => "mismatched_credential",
            GatewayError::InvalidArgument(_) => "invalid_argument",
            GatewayError::RegistrationTokenNotRegistered => "unregistered",
            GatewayError::Other(_) => "other",
        }
    }
}

/// Client of the external push gateway.
///
/// Shared by all concurrent pipeline runs.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Send one message, returning the gateway's message ID.
    async fn send(&self, message: &PushMessage) -> Result<String, GatewayError>;
}

/// Gateway that logs messages instead of delivering them
#[derive(Debug, Default)]
pub struct DryRunGateway;

#[async_trait]
impl PushGateway for DryRunGateway {
    async fn send(&self, message: &PushMessage) -> Result<String, GatewayError> {
        let id = format!("dry-run/{}", Uuid::new_v4());
        match serde_json::to_string(message) {
            Ok(body) => tracing::info!(message_id = %id, body = %body, "Dry-run push"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize dry-run push"),
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_table() {
        let abort = [
            GatewayError::MessageRateExceeded,
            GatewayError::ServerUnavailable,
            GatewayError::Internal,
            GatewayError::Unknown("?".to_string()),
            GatewayError::MismatchedCredential,
            GatewayError::InvalidArgument("bad token format".to_string()),
        ];
        for err in abort {
            assert_eq!(err.remediation(), Remediation::AbortBatch, "{:?}", err);
        }
        assert!(GatewayError::MismatchedCredential.is_config());
        assert!(GatewayError::InvalidArgument("bad".to_string()).is_config());
        assert!(!GatewayError::ServerUnavailable.is_config());
        assert!(!GatewayError::RegistrationTokenNotRegistered.is_config());

        assert_eq!(
            GatewayError::RegistrationTokenNotRegistered.remediation(),
            Remediation::PruneDevice
        );
        assert_eq!(
            GatewayError::Other("payload too big".to_string()).remediation(),
            Remediation::Continue
        );
    }

    #[test]
    fn test_from_error_code() {
        assert_eq!(
            GatewayError::from_error_code("UNREGISTERED", "Requested entity was not found."),
            GatewayError::RegistrationTokenNotRegistered
        );
        assert_eq!(
            GatewayError::from_error_code("QUOTA_EXCEEDED", ""),
            GatewayError::MessageRateExceeded
        );
        assert_eq!(
            GatewayError::from_error_code("SENDER_ID_MISMATCH", ""),
            GatewayError::MismatchedCredential
        );
        assert_eq!(
            GatewayError::from_error_code("INVALID_ARGUMENT", "bad ttl"),
            GatewayError::InvalidArgument("bad ttl".to_string())
        );
        assert_eq!(
            GatewayError::from_error_code("THIRD_PARTY_AUTH_ERROR", "apns rejected"),
            GatewayError::Other("THIRD_PARTY_AUTH_ERROR: apns rejected".to_string())
        );
    }

    #[tokio::test]
    async fn test_dry_run_gateway_accepts_everything() {
        let id = DryRunGateway.send(&PushMessage::default()).await.unwrap();
        assert!(id.starts_with("dry-run/"));
    }
}

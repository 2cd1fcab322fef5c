use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::config::PushConfig;
use crate::metrics::IntakeMetrics;

use super::content::ContentRenderer;
use super::device::DeviceStore;
use super::gateway::PushGateway;
use super::pipeline::{PipelineStatsSnapshot, PushPipeline};
use super::types::Receipt;

/// Errors that prevent the push handler from starting
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Push is enabled but no gateway credentials are configured")]
    MissingCredentials,

    #[error("Invalid gateway credentials: {0}")]
    InvalidCredentials(#[from] serde_json::Error),

    #[error("Credentials file not readable: {0}")]
    CredentialsFileNotFound(String),
}

/// Reasons a receipt was not accepted for delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("Push queue is full")]
    QueueFull,

    #[error("Push dispatcher has stopped")]
    Closed,

    #[error("Push is not enabled")]
    NotReady,
}

/// Producer side of the receipt queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PushIntake {
    sender: mpsc::Sender<Receipt>,
}

impl PushIntake {
    pub(crate) fn new(sender: mpsc::Sender<Receipt>) -> Self {
        Self { sender }
    }

    /// Queue a receipt without waiting. A full queue drops the receipt.
    pub fn try_submit(&self, receipt: Receipt) -> Result<(), SubmitError> {
        match self.sender.try_send(receipt) {
            Ok(()) => {
                IntakeMetrics::record_accepted();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(receipt)) => {
                IntakeMetrics::record_queue_full();
                tracing::warn!(
                    topic = %receipt.payload.topic,
                    "Push queue full, receipt dropped"
                );
                Err(SubmitError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                IntakeMetrics::record_closed();
                Err(SubmitError::Closed)
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Receipts waiting for the dispatcher
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Readiness and shutdown surface of the push subsystem
pub struct PushHandler {
    intake: Option<PushIntake>,
    pipeline: Option<Arc<PushPipeline>>,
    shutdown: Option<broadcast::Sender<()>>,
}

impl PushHandler {
    /// A handler that accepts nothing
    pub fn disabled() -> Self {
        Self {
            intake: None,
            pipeline: None,
            shutdown: None,
        }
    }

    /// Intake handle, present only when the dispatcher was started
    pub fn intake(&self) -> Option<PushIntake> {
        self.intake.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.intake.as_ref().is_some_and(|i| !i.is_closed())
    }

    pub fn submit(&self, receipt: Receipt) -> Result<(), SubmitError> {
        match &self.intake {
            Some(intake) => intake.try_submit(receipt),
            None => Err(SubmitError::NotReady),
        }
    }

    /// Signal the dispatcher loop to stop. Runs already spawned finish on their own.
    pub fn stop(&self) {
        if let Some(shutdown) = &self.shutdown {
            // No receivers means the loop is already gone
            let _ = shutdown.send(());
        }
    }

    pub fn stats(&self) -> Option<PipelineStatsSnapshot> {
        self.pipeline.as_ref().map(|p| p.stats())
    }
}

/// Validate configuration and start the dispatcher loop.
///
/// Returns a disabled handler when push is turned off. Must be called from
/// within a Tokio runtime.
pub fn create_push_handler(
    config: &PushConfig,
    devices: Arc<dyn DeviceStore>,
    gateway: Arc<dyn PushGateway>,
    renderer: Arc<dyn ContentRenderer>,
    shutdown: broadcast::Sender<()>,
) -> Result<PushHandler, InitError> {
    if !config.enabled {
        tracing::info!("Push notifications disabled");
        return Ok(PushHandler::disabled());
    }

    check_credentials(config)?;

    let capacity = config.queue_capacity();
    let (tx, rx) = mpsc::channel(capacity);
    let pipeline = Arc::new(PushPipeline::new(
        config.clone(),
        devices.clone(),
        gateway,
        renderer,
    ));

    tokio::spawn(run_dispatcher(rx, pipeline.clone(), shutdown.subscribe()));

    tracing::info!(
        capacity,
        device_store = devices.backend_type(),
        android_notifications = config.android.enabled,
        "Push dispatcher started"
    );

    Ok(PushHandler {
        intake: Some(PushIntake::new(tx)),
        pipeline: Some(pipeline),
        shutdown: Some(shutdown),
    })
}

fn check_credentials(config: &PushConfig) -> Result<(), InitError> {
    let raw = match (&config.credentials, &config.credentials_file) {
        (Some(inline), _) if !inline.trim().is_empty() => inline.clone(),
        (_, Some(path)) if !path.trim().is_empty() => std::fs::read_to_string(Path::new(path))
            .map_err(|e| InitError::CredentialsFileNotFound(format!("{}: {}", path, e)))?,
        _ => return Err(InitError::MissingCredentials),
    };

    let credentials: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw)?;
    tracing::debug!(
        project_id = credentials
            .get("project_id")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown"),
        "Loaded gateway credentials"
    );
    Ok(())
}

async fn run_dispatcher(
    mut rx: mpsc::Receiver<Receipt>,
    pipeline: Arc<PushPipeline>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("Push dispatcher shutting down");
                break;
            }
            receipt = rx.recv() => {
                let Some(receipt) = receipt else {
                    break;
                };
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    pipeline.process(receipt).await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::content::DraftyRenderer;
    use crate::push::device::{Device, MemoryDeviceStore, Platform};
    use crate::push::gateway::GatewayError;
    use crate::push::message::PushMessage;
    use crate::push::types::{Payload, Recipient};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    struct ChannelGateway {
        tx: mpsc::UnboundedSender<PushMessage>,
    }

    #[async_trait]
    impl PushGateway for ChannelGateway {
        async fn send(&self, message: &PushMessage) -> Result<String, GatewayError> {
            let _ = self.tx.send(message.clone());
            Ok("ok".to_string())
        }
    }

    fn enabled_config() -> PushConfig {
        PushConfig {
            enabled: true,
            credentials: Some(r#"{"project_id":"test"}"#.to_string()),
            ..Default::default()
        }
    }

    fn receipt(user_id: &str) -> Receipt {
        Receipt {
            to: HashMap::from([(user_id.to_string(), Recipient::default())]),
            payload: Payload::message("grp1", "usr0", 1, serde_json::json!("Hello")),
        }
    }

    #[tokio::test]
    async fn test_submitted_receipt_is_delivered() {
        let store = Arc::new(MemoryDeviceStore::new());
        store.register(Device::new("usr1", "tok1", Platform::Android));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (shutdown, _) = broadcast::channel(1);

        let handler = create_push_handler(
            &enabled_config(),
            store,
            Arc::new(ChannelGateway { tx }),
            Arc::new(DraftyRenderer),
            shutdown,
        )
        .unwrap();
        assert!(handler.is_ready());

        tokio_test::assert_ok!(handler.submit(receipt("usr1")));

        let sent = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent.token, "tok1");
        handler.stop();
    }

    #[tokio::test]
    async fn test_full_queue_drops_receipt() {
        let (tx, _rx) = mpsc::channel(1);
        let intake = PushIntake::new(tx);

        tokio_test::assert_ok!(intake.try_submit(receipt("usr1")));
        assert_eq!(intake.queued(), 1);
        assert_eq!(intake.try_submit(receipt("usr2")), Err(SubmitError::QueueFull));
    }

    #[tokio::test]
    async fn test_stop_closes_intake() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (shutdown, _) = broadcast::channel(1);
        let handler = create_push_handler(
            &enabled_config(),
            Arc::new(MemoryDeviceStore::new()),
            Arc::new(ChannelGateway { tx }),
            Arc::new(DraftyRenderer),
            shutdown,
        )
        .unwrap();
        let intake = handler.intake().unwrap();

        handler.stop();

        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            while !intake.is_closed() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(closed.is_ok());
        assert_eq!(intake.try_submit(receipt("usr1")), Err(SubmitError::Closed));
        assert!(!handler.is_ready());
    }

    #[tokio::test]
    async fn test_disabled_handler_is_not_ready() {
        let (shutdown, _) = broadcast::channel(1);
        let (tx, _rx) = mpsc::unbounded_channel();
        let handler = create_push_handler(
            &PushConfig::default(),
            Arc::new(MemoryDeviceStore::new()),
            Arc::new(ChannelGateway { tx }),
            Arc::new(DraftyRenderer),
            shutdown,
        )
        .unwrap();

        assert!(!handler.is_ready());
        assert!(handler.intake().is_none());
        assert_eq!(handler.submit(receipt("usr1")), Err(SubmitError::NotReady));
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_init() {
        let (shutdown, _) = broadcast::channel(1);
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = PushConfig {
            enabled: true,
            ..Default::default()
        };

        let result = create_push_handler(
            &config,
            Arc::new(MemoryDeviceStore::new()),
            Arc::new(ChannelGateway { tx }),
            Arc::new(DraftyRenderer),
            shutdown,
        );
        assert!(matches!(result, Err(InitError::MissingCredentials)));
    }

    #[tokio::test]
    async fn test_malformed_credentials_fail_init() {
        let (shutdown, _) = broadcast::channel(1);
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = PushConfig {
            enabled: true,
            credentials: Some("not json".to_string()),
            ..Default::default()
        };

        let result = create_push_handler(
            &config,
            Arc::new(MemoryDeviceStore::new()),
            Arc::new(ChannelGateway { tx }),
            Arc::new(DraftyRenderer),
            shutdown,
        );
        assert!(matches!(result, Err(InitError::InvalidCredentials(_))));
    }
}

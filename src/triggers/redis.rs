use std::time::Duration;

use futures::StreamExt;
use tokio::sync::broadcast;

use crate::config::RedisConfig;
use crate::push::{PushIntake, Receipt, SubmitError};

/// Redis Pub/Sub subscriber feeding receipts into the push queue
pub struct RedisSubscriber {
    config: RedisConfig,
    intake: PushIntake,
    shutdown: broadcast::Sender<()>,
}

impl RedisSubscriber {
    pub fn new(config: RedisConfig, intake: PushIntake, shutdown: broadcast::Sender<()>) -> Self {
        Self {
            config,
            intake,
            shutdown,
        }
    }

    /// Start the Redis subscriber loop
    pub async fn start(&self) -> anyhow::Result<()> {
        let channels = &self.config.channels;
        if channels.is_empty() {
            tracing::info!("No receipt channels configured, skipping Redis subscriber");
            return Ok(());
        }

        tracing::info!(channels = ?channels, "Starting Redis subscriber");

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            match self.run_subscription_loop(channels).await {
                Ok(()) => {
                    tracing::info!("Redis subscriber stopped gracefully");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Redis subscription error, reconnecting in 5 seconds...");
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                    }
                }
            }
        }

        Ok(())
    }

    async fn run_subscription_loop(&self, channels: &[String]) -> anyhow::Result<()> {
        let client = redis::Client::open(self.config.url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;

        for channel in channels {
            if channel.contains('*') || channel.contains('?') || channel.contains('[') {
                pubsub.psubscribe(channel).await?;
                tracing::debug!(pattern = %channel, "Subscribed to pattern");
            } else {
                pubsub.subscribe(channel).await?;
                tracing::debug!(channel = %channel, "Subscribed to channel");
            }
        }

        tracing::info!("Redis subscription established");

        let mut message_stream = pubsub.on_message();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Received shutdown signal");
                    break;
                }
                msg = message_stream.next() => {
                    let Some(msg) = msg else {
                        anyhow::bail!("Redis message stream ended");
                    };
                    let channel = msg.get_channel_name().to_string();
                    let payload: String = match msg.get_payload() {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to get message payload");
                            continue;
                        }
                    };

                    if self.handle_message(&channel, &payload) == Err(SubmitError::Closed) {
                        tracing::info!("Push intake closed, stopping Redis subscriber");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Parse and queue one receipt. Malformed messages are logged and dropped.
    fn handle_message(&self, channel: &str, payload: &str) -> Result<(), SubmitError> {
        let receipt = match parse_receipt(payload) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    channel = %channel,
                    "Failed to parse receipt"
                );
                return Ok(());
            }
        };

        tracing::debug!(
            channel = %channel,
            topic = %receipt.payload.topic,
            recipients = receipt.to.len(),
            "Received receipt"
        );

        match self.intake.try_submit(receipt) {
            // Overflow is already logged by the intake
            Err(SubmitError::QueueFull) => Ok(()),
            other => other,
        }
    }
}

fn parse_receipt(payload: &str) -> Result<Receipt, serde_json::Error> {
    serde_json::from_str(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::{AccessMode, EventKind};
    use tokio::sync::mpsc;

    #[test]
    fn test_parse_message_receipt() {
        let json = r#"{
            "to": {
                "usr1": {"devices": ["tok-live"], "unread": 4},
                "usr2": {}
            },
            "payload": {
                "what": "msg",
                "topic": "grp1",
                "from": "usr0",
                "timestamp": "2024-03-01T10:00:00Z",
                "seq": 12,
                "content_type": "text/x-drafty",
                "content": {"txt": "Hello"}
            }
        }"#;

        let receipt = parse_receipt(json).unwrap();
        assert_eq!(receipt.payload.kind(), Some(EventKind::Message));
        assert_eq!(receipt.unread("usr1"), 4);
        assert_eq!(receipt.unread("usr2"), 0);
        assert!(receipt.skip_devices().contains("tok-live"));
    }

    #[test]
    fn test_parse_subscription_receipt() {
        let json = r#"{
            "to": {"usr1": {}},
            "payload": {
                "what": "sub",
                "topic": "grp1",
                "from": "usr0",
                "timestamp": "2024-03-01T10:00:00Z",
                "mode_want": "JRWPS",
                "mode_given": "JRW"
            }
        }"#;

        let receipt = parse_receipt(json).unwrap();
        assert_eq!(receipt.payload.kind(), Some(EventKind::Subscription));
        assert!(receipt.payload.mode_given.contains(AccessMode::WRITE));
    }

    #[tokio::test]
    async fn test_malformed_message_is_dropped() {
        let (tx, mut rx) = mpsc::channel(4);
        let (shutdown, _) = broadcast::channel(1);
        let subscriber = RedisSubscriber::new(RedisConfig::default(), PushIntake::new(tx), shutdown);

        assert_eq!(subscriber.handle_message("receipts", "{not json"), Ok(()));
        assert!(rx.try_recv().is_err());
    }
}

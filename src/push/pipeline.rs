use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::config::PushConfig;
use crate::metrics::PushMetrics;

use super::content::ContentRenderer;
use super::device::DeviceStore;
use super::gateway::{PushGateway, Remediation};
use super::message::{build_message, MessageContext};
use super::transform::{event_data, KEY_CONTENT};
use super::types::Receipt;

/// How a pipeline run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every eligible device got a send attempt
    Completed,
    /// A transient or configuration error stopped the remaining sends
    BatchAborted,
    /// None of the recipients has a registered device
    NoDevices,
    /// Device lookup failed
    StoreError,
    /// The payload could not be turned into push data
    InvalidPayload,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::BatchAborted => "batch_aborted",
            RunOutcome::NoDevices => "no_devices",
            RunOutcome::StoreError => "store_error",
            RunOutcome::InvalidPayload => "invalid_payload",
        }
    }
}

/// Result of processing one receipt
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Send calls made to the gateway
    pub attempted: usize,
    /// Sends the gateway accepted
    pub delivered: usize,
    /// Sends the gateway rejected
    pub failed: usize,
    /// Devices excluded as already notified or without a token
    pub skipped: usize,
    /// Registrations deleted after the gateway reported them unregistered
    pub pruned: usize,
}

impl RunReport {
    fn new(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            attempted: 0,
            delivered: 0,
            failed: 0,
            skipped: 0,
            pruned: 0,
        }
    }
}

/// Running totals across all pipeline runs
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub runs: AtomicU64,
    pub batches_aborted: AtomicU64,
    pub sends_attempted: AtomicU64,
    pub sends_delivered: AtomicU64,
    pub sends_failed: AtomicU64,
    pub devices_skipped: AtomicU64,
    pub devices_pruned: AtomicU64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            batches_aborted: self.batches_aborted.load(Ordering::Relaxed),
            sends_attempted: self.sends_attempted.load(Ordering::Relaxed),
            sends_delivered: self.sends_delivered.load(Ordering::Relaxed),
            sends_failed: self.sends_failed.load(Ordering::Relaxed),
            devices_skipped: self.devices_skipped.load(Ordering::Relaxed),
            devices_pruned: self.devices_pruned.load(Ordering::Relaxed),
        }
    }

    fn record(&self, report: &RunReport) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        if report.outcome == RunOutcome::BatchAborted {
            self.batches_aborted.fetch_add(1, Ordering::Relaxed);
        }
        self.sends_attempted
            .fetch_add(report.attempted as u64, Ordering::Relaxed);
        self.sends_delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.sends_failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        self.devices_skipped
            .fetch_add(report.skipped as u64, Ordering::Relaxed);
        self.devices_pruned
            .fetch_add(report.pruned as u64, Ordering::Relaxed);
    }
}

/// Snapshot of pipeline statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStatsSnapshot {
    pub runs: u64,
    pub batches_aborted: u64,
    pub sends_attempted: u64,
    pub sends_delivered: u64,
    pub sends_failed: u64,
    pub devices_skipped: u64,
    pub devices_pruned: u64,
}

/// Turns one receipt into gateway sends for every eligible device.
pub struct PushPipeline {
    config: PushConfig,
    devices: Arc<dyn DeviceStore>,
    gateway: Arc<dyn PushGateway>,
    renderer: Arc<dyn ContentRenderer>,
    stats: PipelineStats,
}

impl PushPipeline {
    pub fn new(
        config: PushConfig,
        devices: Arc<dyn DeviceStore>,
        gateway: Arc<dyn PushGateway>,
        renderer: Arc<dyn ContentRenderer>,
    ) -> Self {
        Self {
            config,
            devices,
            gateway,
            renderer,
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Process one receipt to completion.
    ///
    /// Devices are sent to one at a time, so a batch abort stops every later send.
    #[tracing::instrument(
        skip(self, receipt),
        fields(topic = %receipt.payload.topic, what = %receipt.payload.what)
    )]
    pub async fn process(&self, receipt: Receipt) -> RunReport {
        PushMetrics::run_started();
        let report = self.run(&receipt).await;
        PushMetrics::run_finished(report.outcome.as_str());
        self.stats.record(&report);

        tracing::debug!(
            outcome = report.outcome.as_str(),
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            pruned = report.pruned,
            "Push run finished"
        );
        report
    }

    async fn run(&self, receipt: &Receipt) -> RunReport {
        let Some(kind) = receipt.payload.kind() else {
            tracing::warn!(what = %receipt.payload.what, "Unsupported event kind");
            return RunReport::new(RunOutcome::InvalidPayload);
        };
        let data = match event_data(&receipt.payload, kind, self.renderer.as_ref()) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build push data");
                return RunReport::new(RunOutcome::InvalidPayload);
            }
        };

        let user_ids = receipt.user_ids();
        let lookup = match self.devices.get_all(&user_ids).await {
            Ok(lookup) => lookup,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    backend = self.devices.backend_type(),
                    "Failed to fetch devices"
                );
                return RunReport::new(RunOutcome::StoreError);
            }
        };
        if lookup.is_empty() {
            return RunReport::new(RunOutcome::NoDevices);
        }

        let skip = receipt.skip_devices();
        let android_text = self.config.android.enabled.then(|| {
            let content = data.get(KEY_CONTENT).map(String::as_str).unwrap_or("");
            self.config.android.resolve_text(kind, content)
        });
        let ctx = MessageContext {
            topic: &receipt.payload.topic,
            android_text: android_text.as_ref(),
            time_to_live: self.config.time_to_live,
            timestamp: receipt.payload.timestamp,
        };

        let mut report = RunReport::new(RunOutcome::Completed);

        'batch: for user_id in &user_ids {
            let Some(devices) = lookup.devices.get(user_id) else {
                continue;
            };
            let badge = receipt.unread(user_id);

            for device in devices {
                if device.device_id.is_empty() || skip.contains(device.device_id.as_str()) {
                    report.skipped += 1;
                    PushMetrics::record_skipped();
                    continue;
                }

                let message = build_message(device, &data, badge, &ctx);
                let platform = device.platform.to_string();
                let started = Instant::now();
                report.attempted += 1;

                let err = match self.gateway.send(&message).await {
                    Ok(message_id) => {
                        report.delivered += 1;
                        PushMetrics::record_send(&platform, started.elapsed());
                        tracing::trace!(user_id = %user_id, message_id = %message_id, "Push sent");
                        continue;
                    }
                    Err(e) => e,
                };

                report.failed += 1;
                PushMetrics::record_send_failure(err.kind());

                match err.remediation() {
                    Remediation::AbortBatch => {
                        if err.is_config() {
                            tracing::error!(
                                user_id = %user_id,
                                platform = %platform,
                                error = %err,
                                "Gateway rejected push configuration, aborting remaining sends"
                            );
                        } else {
                            tracing::warn!(
                                user_id = %user_id,
                                platform = %platform,
                                error = %err,
                                "Transient gateway failure, aborting remaining sends"
                            );
                        }
                        report.outcome = RunOutcome::BatchAborted;
                        break 'batch;
                    }
                    Remediation::PruneDevice => {
                        match self.devices.delete(user_id, &device.device_id).await {
                            Ok(()) => {
                                report.pruned += 1;
                                PushMetrics::record_pruned();
                                tracing::info!(
                                    user_id = %user_id,
                                    platform = %platform,
                                    "Removed unregistered device"
                                );
                            }
                            Err(e) => {
                                PushMetrics::record_prune_failed();
                                tracing::warn!(
                                    user_id = %user_id,
                                    error = %e,
                                    "Failed to remove unregistered device"
                                );
                            }
                        }
                    }
                    Remediation::Continue => {
                        tracing::warn!(
                            user_id = %user_id,
                            platform = %platform,
                            error = %err,
                            "Push failed"
                        );
                    }
                }
            }
        }

        report
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
    use std::sync::Mutex;

    /// Records tokens and fails the ones listed in `failures`
    #[derive(Default)]
    struct ScriptedGateway {
        sent: Mutex<Vec<String>>,
        failures: HashMap<String, GatewayError>,
    }

    #[async_trait]
    impl PushGateway for ScriptedGateway {
        async fn send(&self, message: &PushMessage) -> Result<String, GatewayError> {
            self.sent.lock().unwrap().push(message.token.clone());
            match self.failures.get(&message.token) {
                Some(err) => Err(err.clone()),
                None => Ok(format!("id-{}", message.token)),
            }
        }
    }

    fn receipt(recipients: &[(&str, &[&str])]) -> Receipt {
        let to = recipients
            .iter()
            .map(|(uid, live)| {
                (
                    uid.to_string(),
                    Recipient {
                        devices: live.iter().map(|d| d.to_string()).collect(),
                        unread: 0,
                    },
                )
            })
            .collect();
        Receipt {
            to,
            payload: Payload::message("grp1", "usr0", 7, serde_json::json!("Hello")),
        }
    }

    fn pipeline(
        store: Arc<MemoryDeviceStore>,
        gateway: Arc<ScriptedGateway>,
    ) -> PushPipeline {
        PushPipeline::new(
            PushConfig::default(),
            store,
            gateway,
            Arc::new(DraftyRenderer),
        )
    }

    #[tokio::test]
    async fn test_skip_set_and_empty_token() {
        let store = Arc::new(MemoryDeviceStore::new());
        store.register(Device::new("usr1", "tok-live", Platform::Android));
        store.register(Device::new("usr1", "tok-other", Platform::Android));
        store.register(Device::new("usr1", "", Platform::Android));
        let gateway = Arc::new(ScriptedGateway::default());

        let report = pipeline(store, gateway.clone())
            .process(receipt(&[("usr1", &["tok-live"])]))
            .await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.skipped, 2);
        assert_eq!(*gateway.sent.lock().unwrap(), vec!["tok-other".to_string()]);
    }

    #[tokio::test]
    async fn test_abort_stops_later_devices() {
        let store = Arc::new(MemoryDeviceStore::new());
        store.register(Device::new("usr1", "a", Platform::Android));
        store.register(Device::new("usr1", "b", Platform::Android));
        store.register(Device::new("usr2", "c", Platform::Ios));
        let gateway = Arc::new(ScriptedGateway {
            failures: HashMap::from([("b".to_string(), GatewayError::ServerUnavailable)]),
            ..Default::default()
        });

        let report = pipeline(store, gateway.clone())
            .process(receipt(&[("usr1", &[]), ("usr2", &[])]))
            .await;

        assert_eq!(report.outcome, RunOutcome::BatchAborted);
        assert_eq!(report.attempted, 2);
        assert_eq!(*gateway.sent.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_other_errors_continue() {
        let store = Arc::new(MemoryDeviceStore::new());
        store.register(Device::new("usr1", "a", Platform::Android));
        store.register(Device::new("usr1", "b", Platform::Android));
        let gateway = Arc::new(ScriptedGateway {
            failures: HashMap::from([("a".to_string(), GatewayError::Other("boom".to_string()))]),
            ..Default::default()
        });

        let pipeline = pipeline(store.clone(), gateway.clone());
        let report = pipeline.process(receipt(&[("usr1", &[])])).await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(store.device_count(), 2);
        assert_eq!(pipeline.stats().sends_attempted, 2);
    }

    #[tokio::test]
    async fn test_no_devices_is_benign() {
        let store = Arc::new(MemoryDeviceStore::new());
        let gateway = Arc::new(ScriptedGateway::default());

        let report = pipeline(store, gateway.clone())
            .process(receipt(&[("usr1", &[])]))
            .await;

        assert_eq!(report.outcome, RunOutcome::NoDevices);
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_kind_aborts_run() {
        let store = Arc::new(MemoryDeviceStore::new());
        store.register(Device::new("usr1", "a", Platform::Android));
        let gateway = Arc::new(ScriptedGateway::default());

        let mut r = receipt(&[("usr1", &[])]);
        r.payload.what = "pres".to_string();
        let report = pipeline(store, gateway.clone()).process(r).await;

        assert_eq!(report.outcome, RunOutcome::InvalidPayload);
        assert!(gateway.sent.lock().unwrap().is_empty());
    }
}

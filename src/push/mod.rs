//! Push notification delivery.
//!
//! Receipts enter through a bounded queue (`PushIntake`). A dispatcher loop
//! spawns one `PushPipeline` run per receipt; each run flattens the payload
//! into data attributes, looks up the recipients' devices and sends one
//! platform-specific message per device through a `PushGateway`, reacting to
//! gateway errors by aborting the batch, pruning the device, or continuing.
//!
//! Device storage uses a backend abstraction:
//!
//! - `MemoryDeviceStore`: In-memory storage using DashMap (default)
//! - `RedisDeviceStore`: One Redis hash per user
//!
//! Use `create_device_store()` to create the appropriate backend based on configuration.

mod content;
mod device;
mod dispatcher;
mod gateway;
mod message;
mod notification_config;
mod pipeline;
mod redis_device_store;
mod transform;
mod types;

use std::sync::Arc;

use crate::config::DeviceStoreConfig;
use crate::redis::pool::RedisPool;

pub use content::{ContentRenderer, DraftyRenderer, RenderError};
pub use device::{Device, DeviceLookup, DeviceStore, DeviceStoreError, MemoryDeviceStore, Platform};
pub use dispatcher::{create_push_handler, InitError, PushHandler, PushIntake, SubmitError};
pub use gateway::{DryRunGateway, GatewayError, PushGateway, Remediation};
pub use message::{
    build_message, AndroidConfig, AndroidNotification, AndroidPriority, ApnsConfig, ApnsPayload,
    Aps, ApsAlert, MessageContext, Notification, PushMessage, IOS_ALERT_TITLE, IOS_DEFAULT_SOUND,
};
pub use notification_config::{
    AndroidNotificationConfig, NotificationField, NotificationText, CONTENT_PLACEHOLDER,
};
pub use pipeline::{PipelineStatsSnapshot, PushPipeline, RunOutcome, RunReport};
pub use redis_device_store::RedisDeviceStore;
pub use transform::{
    event_data, payload_to_data, truncate_content, TransformError, MAX_MESSAGE_LENGTH,
};
pub use types::{
    AccessMode, DataAttributes, EventKind, Payload, Receipt, Recipient, ACT_MSG, ACT_SUB,
};

/// Create a device store based on configuration.
///
/// - `"redis"`: Returns a `RedisDeviceStore` if a Redis pool is provided
/// - `"memory"` (default): Returns a `MemoryDeviceStore`
pub fn create_device_store(
    settings: &DeviceStoreConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn DeviceStore> {
    match settings.backend.as_str() {
        "redis" => {
            if let Some(pool) = redis_pool {
                tracing::info!(
                    backend = "redis",
                    prefix = %settings.redis_prefix,
                    "Creating Redis device store"
                );
                Arc::new(RedisDeviceStore::new(pool, settings.redis_prefix.clone()))
            } else {
                tracing::warn!("Redis device store requested but no pool provided, falling back to memory");
                Arc::new(MemoryDeviceStore::new())
            }
        }
        other => {
            if other != "memory" {
                tracing::warn!(backend = %other, "Unknown device store backend, using memory");
            }
            tracing::info!(backend = "memory", "Creating in-memory device store");
            Arc::new(MemoryDeviceStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_falls_back_to_memory() {
        let settings = DeviceStoreConfig {
            backend: "redis".to_string(),
            redis_prefix: "push:devices".to_string(),
        };
        let store = create_device_store(&settings, None);
        assert_eq!(store.backend_type(), "memory");

        let store = create_device_store(&DeviceStoreConfig::default(), None);
        assert_eq!(store.backend_type(), "memory");
    }
}

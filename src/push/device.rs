//! Registered push endpoints and the store they live in.
//!
//! Devices are registered by the client-facing API elsewhere; the push
//! pipeline only reads them and deletes registrations the gateway reports
//! as no longer valid.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::redis::pool::PoolError;

/// Target platform of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Web,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Web => "web",
            Platform::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A registered push endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Gateway registration token; empty when the client never registered one
    pub device_id: String,
    pub platform: Platform,
    /// Owning user
    pub user_id: String,
}

impl Device {
    pub fn new(
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        platform: Platform,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            platform,
            user_id: user_id.into(),
        }
    }
}

/// Devices found for a set of users
#[derive(Debug, Clone, Default)]
pub struct DeviceLookup {
    /// user_id -> devices
    pub devices: HashMap<String, Vec<Device>>,
    /// Total number of devices across all users
    pub count: usize,
}

impl DeviceLookup {
    pub fn from_devices(devices: HashMap<String, Vec<Device>>) -> Self {
        let count = devices.values().map(Vec::len).sum();
        Self { devices, count }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[derive(Debug, Error)]
pub enum DeviceStoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend is temporarily unavailable
    #[error("Device store unavailable: {0}")]
    Unavailable(String),
}

impl From<PoolError> for DeviceStoreError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Redis(e) => DeviceStoreError::Redis(e),
            PoolError::ConnectionUnavailable(msg) => DeviceStoreError::Unavailable(msg),
        }
    }
}

/// Storage of device registrations.
///
/// Implementations are shared by all concurrent pipeline runs and must be
/// safe for concurrent reads and deletes.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Fetch all devices registered by the given users.
    async fn get_all(&self, user_ids: &[String]) -> Result<DeviceLookup, DeviceStoreError>;

    /// Remove a single device registration. Deleting a missing device is not an error.
    async fn delete(&self, user_id: &str, device_id: &str) -> Result<(), DeviceStoreError>;

    /// Backend type identifier
    fn backend_type(&self) -> &'static str;
}

/// In-memory device store
#[derive(Default)]
pub struct MemoryDeviceStore {
    /// user_id -> devices
    devices: DashMap<String, Vec<Device>>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device, replacing any registration with the same ID for that user.
    pub fn register(&self, device: Device) {
        let mut devices = self.devices.entry(device.user_id.clone()).or_default();
        match devices.iter_mut().find(|d| d.device_id == device.device_id) {
            Some(existing) => *existing = device,
            None => devices.push(device),
        }
    }

    pub fn device_count(&self) -> usize {
        self.devices.iter().map(|entry| entry.value().len()).sum()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn get_all(&self, user_ids: &[String]) -> Result<DeviceLookup, DeviceStoreError> {
        let mut found = HashMap::new();
        for user_id in user_ids {
            if let Some(devices) = self.devices.get(user_id) {
                if !devices.is_empty() {
                    found.insert(user_id.clone(), devices.clone());
                }
            }
        }
        Ok(DeviceLookup::from_devices(found))
    }

    async fn delete(&self, user_id: &str, device_id: &str) -> Result<(), DeviceStoreError> {
        if let Some(mut devices) = self.devices.get_mut(user_id) {
            devices.retain(|d| d.device_id != device_id);
        }
        self.devices.remove_if(user_id, |_, devices| devices.is_empty());

        tracing::debug!(user_id = %user_id, device_id = %device_id, "Device registration removed");
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_deserialization() {
        let p: Platform = serde_json::from_str("\"android\"").unwrap();
        assert_eq!(p, Platform::Android);
        let p: Platform = serde_json::from_str("\"ios\"").unwrap();
        assert_eq!(p, Platform::Ios);
        let p: Platform = serde_json::from_str("\"blackberry\"").unwrap();
        assert_eq!(p, Platform::Unknown);
    }

    #[tokio::test]
    async fn test_memory_store_lookup() {
        let store = MemoryDeviceStore::new();
        store.register(Device::new("usr1", "tok-1", Platform::Android));
        store.register(Device::new("usr1", "tok-2", Platform::Ios));
        store.register(Device::new("usr2", "tok-3", Platform::Android));

        let lookup = store
            .get_all(&["usr1".to_string(), "usr3".to_string()])
            .await
            .unwrap();
        assert_eq!(lookup.count, 2);
        assert_eq!(lookup.devices["usr1"].len(), 2);
        assert!(!lookup.devices.contains_key("usr3"));
    }

    #[tokio::test]
    async fn test_register_replaces_same_device() {
        let store = MemoryDeviceStore::new();
        store.register(Device::new("usr1", "tok-1", Platform::Android));
        store.register(Device::new("usr1", "tok-1", Platform::Ios));

        assert_eq!(store.device_count(), 1);
        let lookup = store.get_all(&["usr1".to_string()]).await.unwrap();
        assert_eq!(lookup.devices["usr1"][0].platform, Platform::Ios);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryDeviceStore::new();
        store.register(Device::new("usr1", "tok-1", Platform::Android));

        tokio_test::assert_ok!(store.delete("usr1", "tok-1").await);
        tokio_test::assert_ok!(store.delete("usr1", "tok-1").await);
        tokio_test::assert_ok!(store.delete("nobody", "tok-9").await);

        let lookup = store.get_all(&["usr1".to_string()]).await.unwrap();
        assert!(lookup.is_empty());
        assert_eq!(store.device_count(), 0);
    }
}

//! Redis-backed device store.
//!
//! Each user owns one hash at `{prefix}:{user_id}`; fields are device IDs and
//! values are the JSON-encoded `Device`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::redis::pool::RedisPool;

use super::device::{Device, DeviceLookup, DeviceStore, DeviceStoreError};

pub struct RedisDeviceStore {
    pool: Arc<RedisPool>,
    prefix: String,
}

impl RedisDeviceStore {
    pub fn new(pool: Arc<RedisPool>, prefix: String) -> Self {
        Self { pool, prefix }
    }

    fn user_key(&self, user_id: &str) -> String {
        format!("{}:{}", self.prefix, user_id)
    }

    /// Store a device registration.
    pub async fn register(&self, device: &Device) -> Result<(), DeviceStoreError> {
        let key = self.user_key(&device.user_id);
        let field = device.device_id.clone();
        let value = serde_json::to_string(device)?;

        self.pool
            .execute(|mut conn| async move {
                let _: i64 = conn.hset(&key, &field, &value).await?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DeviceStore for RedisDeviceStore {
    async fn get_all(&self, user_ids: &[String]) -> Result<DeviceLookup, DeviceStoreError> {
        if user_ids.is_empty() {
            return Ok(DeviceLookup::default());
        }

        let mut pipe = redis::pipe();
        for user_id in user_ids {
            pipe.hgetall(self.user_key(user_id));
        }

        let rows: Vec<HashMap<String, String>> = self
            .pool
            .execute(|mut conn| async move { pipe.query_async(&mut conn).await })
            .await?;

        let mut found = HashMap::new();
        for (user_id, row) in user_ids.iter().zip(rows) {
            let mut devices = Vec::with_capacity(row.len());
            for (device_id, raw) in row {
                match serde_json::from_str::<Device>(&raw) {
                    Ok(device) => devices.push(device),
                    Err(e) => {
                        tracing::warn!(
                            user_id = %user_id,
                            device_id = %device_id,
                            error = %e,
                            "Skipping unreadable device record"
                        );
                    }
                }
            }
            if !devices.is_empty() {
                devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
                found.insert(user_id.clone(), devices);
            }
        }

        Ok(DeviceLookup::from_devices(found))
    }

    async fn delete(&self, user_id: &str, device_id: &str) -> Result<(), DeviceStoreError> {
        let key = self.user_key(user_id);
        let field = device_id.to_string();

        let removed: i64 = self
            .pool
            .execute(|mut conn| async move { conn.hdel(&key, &field).await })
            .await?;

        tracing::debug!(
            user_id = %user_id,
            device_id = %device_id,
            removed = removed,
            "Device registration removed from Redis"
        );
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "redis"
    }
}

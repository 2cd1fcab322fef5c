use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::push::AndroidNotificationConfig;

/// Intake queue capacity used when none is configured
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub devices: DeviceStoreConfig,
    #[serde(default)]
    pub push: PushConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Pub/Sub channels carrying JSON receipts; empty disables the subscriber
    #[serde(default)]
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceStoreConfig {
    /// Backend type: "memory" or "redis"
    #[serde(default = "default_device_backend")]
    pub backend: String,
    /// Key prefix for per-user device hashes
    #[serde(default = "default_device_prefix")]
    pub redis_prefix: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Intake queue capacity; unset or non-positive means `DEFAULT_QUEUE_CAPACITY`
    #[serde(default)]
    pub buffer: i64,
    /// Gateway service account credentials as inline JSON
    #[serde(default)]
    pub credentials: Option<String>,
    /// Path to the gateway service account credentials
    #[serde(default)]
    pub credentials_file: Option<String>,
    /// Message time to live in seconds, 0 for the gateway default
    #[serde(default)]
    pub time_to_live: u32,
    #[serde(default)]
    pub android: AndroidNotificationConfig,
}

impl PushConfig {
    pub fn queue_capacity(&self) -> usize {
        if self.buffer <= 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            self.buffer as usize
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_device_backend() -> String {
    "memory".to_string()
}

fn default_device_prefix() -> String {
    "push:devices".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8082)?
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("devices.backend", "memory")?
            .set_default("devices.redis_prefix", "push:devices")?
            .set_default("push.enabled", false)?
            .set_default("push.buffer", DEFAULT_QUEUE_CAPACITY as i64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER__PORT, PUSH__ENABLED, PUSH__TIME_TO_LIVE, REDIS__URL, etc.
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("redis.channels"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            channels: vec![],
        }
    }
}

impl Default for DeviceStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_device_backend(),
            redis_prefix: default_device_prefix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8082);

        let devices = DeviceStoreConfig::default();
        assert_eq!(devices.backend, "memory");
    }

    #[test]
    fn test_queue_capacity_fallback() {
        let mut push = PushConfig::default();
        assert_eq!(push.queue_capacity(), 32);
        push.buffer = -5;
        assert_eq!(push.queue_capacity(), 32);
        push.buffer = 128;
        assert_eq!(push.queue_capacity(), 128);
    }

    #[test]
    fn test_push_config_from_toml() {
        let toml = r##"
            [push]
            enabled = true
            buffer = 0
            credentials_file = "/etc/push/sa.json"
            time_to_live = 3600

            [push.android]
            enabled = true
            title = "New"
            icon_color = "#00ff00"

            [push.android.msg]
            body = "$content"
        "##;

        let settings: Settings = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(settings.push.enabled);
        assert_eq!(settings.push.queue_capacity(), 32);
        assert_eq!(settings.push.time_to_live, 3600);
        assert_eq!(settings.push.android.defaults.title, "New");
        assert_eq!(settings.push.android.msg.body, "$content");
        assert_eq!(settings.devices.backend, "memory");
    }
}

mod settings;

pub use settings::{
    ApiConfig, DeviceStoreConfig, PushConfig, RedisConfig, ServerConfig, Settings,
    DEFAULT_QUEUE_CAPACITY,
};

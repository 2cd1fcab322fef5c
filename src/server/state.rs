use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::push::{DeviceStore, PushHandler};
use crate::redis::RedisPool;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub push: Arc<PushHandler>,
    pub devices: Arc<dyn DeviceStore>,
    pub redis_pool: Option<Arc<RedisPool>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        push: PushHandler,
        devices: Arc<dyn DeviceStore>,
        redis_pool: Option<Arc<RedisPool>>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            push: Arc::new(push),
            devices,
            redis_pool,
            start_time: Instant::now(),
        }
    }
}

//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::push::PipelineStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub push: PushHealthResponse,
    pub devices: DeviceStoreHealthResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisHealthResponse>,
}

#[derive(Debug, Serialize)]
pub struct PushHealthResponse {
    pub enabled: bool,
    pub ready: bool,
    pub queue_capacity: usize,
    pub queued: usize,
}

#[derive(Debug, Serialize)]
pub struct DeviceStoreHealthResponse {
    pub backend: String,
}

#[derive(Debug, Serialize)]
pub struct RedisHealthResponse {
    pub status: String,
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub intake: IntakeStats,
    pub pipeline: PipelineStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct IntakeStats {
    pub ready: bool,
    pub capacity: usize,
    pub queued: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = state.start_time.elapsed().as_secs();
    let intake = state.push.intake();
    let ready = state.push.is_ready();
    let enabled = state.settings.push.enabled;

    let redis = match &state.redis_pool {
        Some(pool) => {
            let connected = match pool.ping().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "Redis health check failed");
                    false
                }
            };
            Some(RedisHealthResponse {
                status: if connected { "connected" } else { "disconnected" }.to_string(),
                connected,
            })
        }
        None => None,
    };

    let redis_ok = redis.as_ref().map_or(true, |r| r.connected);
    let status = if (enabled && !ready) || !redis_ok {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        push: PushHealthResponse {
            enabled,
            ready,
            queue_capacity: intake.as_ref().map_or(0, |i| i.capacity()),
            queued: intake.as_ref().map_or(0, |i| i.queued()),
        },
        devices: DeviceStoreHealthResponse {
            backend: state.devices.backend_type().to_string(),
        },
        redis,
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let intake = state.push.intake();

    Json(StatsResponse {
        intake: IntakeStats {
            ready: state.push.is_ready(),
            capacity: intake.as_ref().map_or(0, |i| i.capacity()),
            queued: intake.as_ref().map_or(0, |i| i.queued()),
        },
        pipeline: state.push.stats().unwrap_or_default(),
    })
}

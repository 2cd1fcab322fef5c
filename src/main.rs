use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use push_dispatcher::config::Settings;
use push_dispatcher::push::{create_device_store, create_push_handler, DraftyRenderer, DryRunGateway};
use push_dispatcher::redis::RedisPool;
use push_dispatcher::server::{create_app, AppState};
use push_dispatcher::triggers::RedisSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let settings = Settings::new()?;
    tracing::info!("Configuration loaded");

    let redis_pool = if settings.devices.backend == "redis" {
        Some(Arc::new(RedisPool::new(&settings.redis)?))
    } else {
        None
    };
    let devices = create_device_store(&settings.devices, redis_pool.clone());

    let (shutdown_tx, _) = broadcast::channel(1);
    let handler = create_push_handler(
        &settings.push,
        devices.clone(),
        Arc::new(DryRunGateway),
        Arc::new(DraftyRenderer),
        shutdown_tx.clone(),
    )?;

    // Start Redis subscriber in background
    let redis_handle = handler.intake().map(|intake| {
        let subscriber = RedisSubscriber::new(settings.redis.clone(), intake, shutdown_tx.clone());
        tokio::spawn(async move {
            if let Err(e) = subscriber.start().await {
                tracing::error!(error = %e, "Redis subscriber failed");
            }
        })
    });

    let state = AppState::new(settings.clone(), handler, devices, redis_pool);
    let push = state.push.clone();
    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    push.stop();
    if let Some(handle) = redis_handle {
        tracing::info!("Waiting for Redis subscriber to finish...");
        let _ = handle.await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stops the push dispatcher and the Redis subscriber
    let _ = shutdown_tx.send(());
}

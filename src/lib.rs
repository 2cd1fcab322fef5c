// Infrastructure layer (shared components)
pub mod infrastructure;

// Re-export infrastructure modules for shorter paths
pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::metrics;
pub use infrastructure::redis;

// Domain layer
pub mod push;

// Application layer
pub mod api;
pub mod server;
pub mod triggers;

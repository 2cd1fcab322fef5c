//! Redis infrastructure shared by the device store.

pub mod pool;

pub use pool::{PoolError, RedisPool};

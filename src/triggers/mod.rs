mod http;
mod redis;

pub use http::{submit_receipt, SubmitReceiptResponse};
pub use redis::RedisSubscriber;

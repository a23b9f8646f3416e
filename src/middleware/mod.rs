//! HTTP middleware

pub mod rate_limit;
pub mod request_id;

pub use rate_limit::{SlidingWindowLimiter, rate_limit_middleware};
pub use request_id::{RequestId, request_id_middleware};

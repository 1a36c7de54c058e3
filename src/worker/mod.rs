pub mod processor;
pub mod rate_limiter;
pub mod pool;

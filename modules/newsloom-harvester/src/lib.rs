pub mod browser_pool;
pub mod cascade;
pub mod classify;
pub mod extract;
pub mod fetch;
pub mod orchestrator;
pub mod proxy_pool;
pub mod rate_limiter;
pub mod report;
pub mod seed_loader;

pub use cascade::{CascadeConfig, CascadeOutcome, ExtractorCascade};
pub use orchestrator::Orchestrator;
pub use rate_limiter::RateLimiter;

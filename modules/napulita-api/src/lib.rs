//! HTTP-facing layer: parameter normalization, bounded retries, and the axum
//! routes that front the lifecycle engine.

pub mod gateway;
pub mod rest;
pub mod retry;

pub use gateway::{QueryGateway, ReportQuery, ReportView};
pub use rest::{router, AppState};
pub use retry::{with_retry, RetryConfig};

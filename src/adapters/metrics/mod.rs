//! Metrics and Monitoring Adapters
//!
//! Prometheus registry fed by controller cycle outcomes, and an axum
//! 0.7 server exposing probes, status and the metrics scrape endpoint.

pub mod health;
pub mod prometheus;

pub use health::HealthServer;
pub use prometheus::MetricsRegistry;

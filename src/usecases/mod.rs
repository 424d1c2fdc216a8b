//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement
//! the oracle's workflows.
//!
//! Use cases:
//! - `OracleController`: Cycle pipeline, lifecycle, circuit breaker, health
//! - `Scheduler`: Single cancelable recurring timer
//! - `SourceFanOut`: Concurrent fetch across all sources and pairs

pub mod controller;
pub mod fetcher;
pub mod lifecycle;
pub mod scheduler;

pub use controller::{ControllerState, OracleController, OracleStatus, default_pipeline};
pub use fetcher::SourceFanOut;
pub use lifecycle::LifecycleState;
pub use scheduler::Scheduler;

//! Domain layer - Core oracle logic and models.
//!
//! Pure logic for the price oracle: observation screening, multi-source
//! aggregation, the update gate, retry backoff and health rules.
//! No I/O here (hexagonal architecture inner ring).

pub mod aggregation;
pub mod backoff;
pub mod gate;
pub mod health;
pub mod observation;
pub mod validation;

// Re-export core types for convenience
pub use aggregation::{AggregationReport, PairAggregate, PriceAggregator};
pub use gate::GateReference;
pub use health::{HealthReport, HealthStatus};
pub use observation::{
    AggregatedObservation, AggregationMethod, CycleResult, Observation, PairOutcome, SkipReason,
    TradingPair, ValidationOutcome,
};
pub use validation::ObservationValidator;

//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the domain/usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `PriceSource`: External price APIs (one adapter per API)
//! - `LedgerClient`: On-chain price commits
//! - `Pipeline`: Fetch / validate / aggregate / commit strategies
//! - `OracleRepository`: State snapshots and cycle journal (JSON/JSONL)
//! - `CycleObserver`: Cycle outcome notifications (metrics)

pub mod ledger;
pub mod observer;
pub mod pipeline;
pub mod price_source;
pub mod repository;

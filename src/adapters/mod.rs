//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, blockchain RPC, file I/O).
//! Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `chain`: EVM price feed ledger via alloy-rs, plus a dry-run ledger
//! - `metrics`: Prometheus metrics, health probes and status endpoint
//! - `persistence`: JSON state snapshots and the JSONL cycle journal
//! - `sources`: REST price sources (Binance, Coinbase, CoinGecko)

pub mod chain;
pub mod metrics;
pub mod persistence;
pub mod sources;

//! Chain Adapters - EVM Ledger Interaction Layer
//!
//! Provides on-chain access via alloy-rs 0.9 for:
//! - RPC provider management (signing wallet, chain and contract checks)
//! - Price commits to the feed contract (`updatePrice`)
//! - A dry-run ledger for running without a chain

pub mod dry_run;
pub mod ledger;
pub mod provider;

pub use dry_run::DryRunLedger;
pub use ledger::ChainLedger;
pub use provider::LedgerProvider;

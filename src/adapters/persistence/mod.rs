//! Persistence Adapters - File-based Oracle Storage
//!
//! Implements the repository port with an atomic JSON snapshot of
//! the price tables and an append-only JSONL cycle journal.
//! No database dependency.

pub mod journal;
pub mod repository_impl;
pub mod state;

pub use journal::CycleJournal;
pub use repository_impl::FileRepository;
pub use state::StateStore;

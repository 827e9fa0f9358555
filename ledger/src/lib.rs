//! Ledger handles and state projections.
//!
//! A ledger is an append-only transaction log with a cryptographic
//! accumulator; a state projection is the key-value mapping built by
//! deterministic replay of that log. The node core consumes both through
//! narrow traits; this crate ships in-memory implementations used by tests
//! and single-process deployments.

pub mod error;
pub mod ledger;
pub mod projection;

pub use error::LedgerError;
pub use ledger::{Ledger, MemoryLedger};
pub use projection::{MemoryProjection, StateProjection};

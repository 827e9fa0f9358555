//! Fundamental types for the Plinth node.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: ledger identifiers, synchronization states, transaction types,
//! versions, timestamps, identifiers, and digest types.

pub mod error;
pub mod hash;
pub mod ident;
pub mod ledger_id;
pub mod time;
pub mod txn_type;
pub mod version;

pub use error::TypeError;
pub use hash::{AttrHash, LedgerRoot, StateRoot};
pub use ident::{Identifier, NodeId};
pub use ledger_id::{LedgerId, LedgerSyncState};
pub use time::Timestamp;
pub use txn_type::TxnType;
pub use version::Version;

/// Sequence number of a transaction within a ledger (1-based).
pub type SeqNo = u64;

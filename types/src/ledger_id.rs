//! Ledger identifiers and per-ledger synchronization state.
//!
//! A Plinth participant maintains three dependent ledgers. The sync order is
//! fixed: Pool before Config before Domain. Config carries the governance and
//! upgrade state needed to interpret Domain write permissions, so Domain
//! transactions are never treated as authoritative before Config has caught up.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one of the three ledgers a node maintains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LedgerId {
    /// Network membership: node records and their verification keys.
    Pool,
    /// Governance: upgrade schedules and pool configuration.
    Config,
    /// Application data: identities and attributes.
    Domain,
}

impl LedgerId {
    /// All ledgers, in catch-up dependency order.
    pub const ALL: [LedgerId; 3] = [LedgerId::Pool, LedgerId::Config, LedgerId::Domain];

    /// The ledger that must be synced before this one, if any.
    pub fn sync_dependency(&self) -> Option<LedgerId> {
        match self {
            LedgerId::Pool => None,
            LedgerId::Config => Some(LedgerId::Pool),
            LedgerId::Domain => Some(LedgerId::Config),
        }
    }

    /// The ledger whose sync starts once this one completes, if any.
    pub fn next_in_sync_order(&self) -> Option<LedgerId> {
        match self {
            LedgerId::Pool => Some(LedgerId::Config),
            LedgerId::Config => Some(LedgerId::Domain),
            LedgerId::Domain => None,
        }
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerId::Pool => write!(f, "pool"),
            LedgerId::Config => write!(f, "config"),
            LedgerId::Domain => write!(f, "domain"),
        }
    }
}

/// Catch-up state of one ledger. Transitions are owned by the catch-up
/// sequencer and are monotonic within a catch-up round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerSyncState {
    NotSynced,
    Syncing,
    Synced,
}

impl fmt::Display for LedgerSyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerSyncState::NotSynced => write!(f, "not_synced"),
            LedgerSyncState::Syncing => write!(f, "syncing"),
            LedgerSyncState::Synced => write!(f, "synced"),
        }
    }
}

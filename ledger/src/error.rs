use plinth_types::{LedgerId, LedgerRoot, StateRoot};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The projection root after applying a batch does not match the root
    /// consensus agreed on. Fatal for the affected ledger: the projection's
    /// correctness cannot be guaranteed past this point.
    #[error("{ledger} state root mismatch: expected {expected}, computed {actual}")]
    DigestMismatch {
        ledger: LedgerId,
        expected: StateRoot,
        actual: StateRoot,
    },

    /// The accumulator root after appending a committed batch does not match
    /// the root consensus agreed on. The transaction log itself has diverged
    /// from the pool.
    #[error("{ledger} ledger root diverged after commit: expected {expected}, computed {actual}")]
    RootDivergence {
        ledger: LedgerId,
        expected: LedgerRoot,
        actual: LedgerRoot,
    },

    #[error("malformed transaction: {0}")]
    MalformedTxn(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

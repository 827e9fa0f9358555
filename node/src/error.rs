use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] plinth_ledger::LedgerError),

    #[error("store error: {0}")]
    Store(#[from] plinth_store::StoreError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("catch-up ordering violation: {0}")]
    CatchupOrder(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("outbound channel closed: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// Infrastructure errors after which the affected ledger's projection can
    /// no longer be trusted. These abort startup for that ledger rather than
    /// degrade silently.
    pub fn is_fatal(&self) -> bool {
        match self {
            NodeError::Ledger(
                plinth_ledger::LedgerError::DigestMismatch { .. }
                | plinth_ledger::LedgerError::RootDivergence { .. },
            ) => true,
            NodeError::Store(e) => !e.is_not_found(),
            NodeError::Io(_) => true,
            _ => false,
        }
    }
}

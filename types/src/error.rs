use thiserror::Error;

/// Errors arising from parsing or constructing the fundamental types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown transaction type: {0}")]
    UnknownTxnType(String),

    #[error("invalid digest hex: {0}")]
    InvalidDigest(String),
}

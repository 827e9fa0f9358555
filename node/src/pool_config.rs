//! Pool write-mode and the request admission gate.
//!
//! `POOL_CONFIG` transactions on the Config ledger flip the pool between
//! writable and read-only. The gate sits in front of consensus submission:
//! reads always pass, Config-ledger governance writes always pass (they are
//! the only way out of read-only mode), everything else is refused with a
//! retry hint while the pool is read-only.

use std::sync::{Arc, RwLock};

use plinth_ledger::Ledger;
use plinth_messages::{keys, Request, Txn};
use plinth_types::TxnType;

/// Pool-level behavior switches derived from the Config ledger.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    writable: bool,
}

impl PoolConfig {
    /// Pools start writable; only an explicit POOL_CONFIG flips that.
    pub fn new() -> Self {
        Self { writable: true }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Fold one committed Config transaction into the switches.
    pub fn process_txn(&mut self, txn: &Txn) {
        if txn.txn_type != TxnType::PoolConfig {
            return;
        }
        if let Some(writes) = txn.get_bool(keys::WRITES) {
            if writes != self.writable {
                tracing::info!(writable = writes, "pool write mode changed");
            }
            self.writable = writes;
        }
    }

    /// Rebuild by replaying the whole Config ledger. The last POOL_CONFIG
    /// wins.
    pub fn process_ledger(&mut self, ledger: &dyn Ledger) {
        for txn in ledger.get_all_txns() {
            self.process_txn(&txn);
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Admission decision for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admit {
    Accept,
    Reject {
        reason: String,
        retry_after_secs: u64,
    },
}

/// Gate in front of consensus submission.
pub struct WriteGate {
    pool_cfg: Arc<RwLock<PoolConfig>>,
    retry_after_secs: u64,
}

impl WriteGate {
    pub fn new(pool_cfg: Arc<RwLock<PoolConfig>>, retry_after_secs: u64) -> Self {
        Self {
            pool_cfg,
            retry_after_secs,
        }
    }

    pub fn admit(&self, request: &Request) -> Admit {
        // Reads never mutate state.
        if request.is_query() {
            return Admit::Accept;
        }
        // Config-ledger governance writes pass even in read-only mode, so
        // the pool can always be upgraded or switched back to writable.
        if request.operation.txn_type.is_config_write() {
            return Admit::Accept;
        }
        let writable = self
            .pool_cfg
            .read()
            .map(|cfg| cfg.is_writable())
            .unwrap_or(false);
        if writable {
            Admit::Accept
        } else {
            Admit::Reject {
                reason: format!(
                    "Pool is in readonly mode, try again in {} seconds",
                    self.retry_after_secs
                ),
                retry_after_secs: self.retry_after_secs,
            }
        }
    }
}

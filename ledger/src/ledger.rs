//! The append-only ledger handle.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use plinth_messages::Txn;
use plinth_types::{LedgerId, LedgerRoot, SeqNo};

use crate::LedgerError;

type Blake2b256 = Blake2b<U32>;

/// An append-only sequence of transactions with a running cryptographic
/// accumulator. Derived state lives in a [`StateProjection`], not here.
///
/// [`StateProjection`]: crate::StateProjection
pub trait Ledger: Send + Sync {
    fn ledger_id(&self) -> LedgerId;

    /// Append a committed transaction, assigning its sequence number.
    fn append(&mut self, txn: Txn) -> Result<SeqNo, LedgerError>;

    /// Full replay view, in sequence order.
    fn get_all_txns(&self) -> Vec<Txn>;

    /// Transactions at or after `seq_no` (1-based), in sequence order.
    fn txns_from(&self, seq_no: SeqNo) -> Vec<Txn>;

    /// Current accumulator root.
    fn root(&self) -> LedgerRoot;

    fn size(&self) -> usize;
}

/// In-memory ledger with a chained Blake2b accumulator:
/// `root' = H(root || H(txn))`.
pub struct MemoryLedger {
    id: LedgerId,
    txns: Vec<Txn>,
    root: LedgerRoot,
}

impl MemoryLedger {
    pub fn new(id: LedgerId) -> Self {
        Self {
            id,
            txns: Vec::new(),
            root: LedgerRoot::ZERO,
        }
    }

    /// Build a ledger pre-populated with genesis transactions, numbering
    /// them from 1.
    pub fn with_genesis(id: LedgerId, genesis: Vec<Txn>) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(id);
        for txn in genesis {
            ledger.append(txn)?;
        }
        Ok(ledger)
    }

    fn txn_digest(txn: &Txn) -> Result<[u8; 32], LedgerError> {
        let bytes = serde_json::to_vec(txn).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let mut hasher = Blake2b256::new();
        hasher.update(&bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        Ok(out)
    }
}

impl Ledger for MemoryLedger {
    fn ledger_id(&self) -> LedgerId {
        self.id
    }

    fn append(&mut self, mut txn: Txn) -> Result<SeqNo, LedgerError> {
        let seq_no = (self.txns.len() + 1) as SeqNo;
        txn.seq_no = Some(seq_no);

        let digest = Self::txn_digest(&txn)?;
        let mut hasher = Blake2b256::new();
        hasher.update(self.root.as_bytes());
        hasher.update(digest);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        self.root = LedgerRoot::new(out);

        self.txns.push(txn);
        Ok(seq_no)
    }

    fn get_all_txns(&self) -> Vec<Txn> {
        self.txns.clone()
    }

    fn txns_from(&self, seq_no: SeqNo) -> Vec<Txn> {
        let start = seq_no.saturating_sub(1) as usize;
        self.txns.get(start..).unwrap_or(&[]).to_vec()
    }

    fn root(&self) -> LedgerRoot {
        self.root
    }

    fn size(&self) -> usize {
        self.txns.len()
    }
}

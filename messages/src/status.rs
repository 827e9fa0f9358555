//! Ledger status exchanged between peers during catch-up.

use serde::{Deserialize, Serialize};

use plinth_types::{LedgerId, LedgerRoot};

/// A node's view of one of its ledgers, shared with peers so they can decide
/// whether they are behind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStatus {
    #[serde(rename = "ledgerId")]
    pub ledger_id: LedgerId,
    #[serde(rename = "txnSeqNo")]
    pub size: u64,
    #[serde(rename = "merkleRoot")]
    pub root: LedgerRoot,
}

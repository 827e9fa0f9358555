//! Transaction type tags.
//!
//! The write-mode gate, the control-message router, and the request handlers
//! all branch on the transaction type, so the full set is a closed enum
//! rather than free-form strings.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TypeError;

/// Every transaction type a Plinth node understands, across all ledgers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnType {
    // Pool ledger
    #[serde(rename = "NODE")]
    Node,

    // Domain ledger writes
    #[serde(rename = "NYM")]
    Nym,
    #[serde(rename = "ATTRIB")]
    Attrib,

    // Domain ledger queries
    #[serde(rename = "GET_NYM")]
    GetNym,
    #[serde(rename = "GET_ATTR")]
    GetAttr,
    #[serde(rename = "GET_TXNS")]
    GetTxns,

    // Config ledger (governance)
    #[serde(rename = "POOL_UPGRADE")]
    PoolUpgrade,
    #[serde(rename = "POOL_CONFIG")]
    PoolConfig,

    // Peer control messages (never written to any ledger by clients)
    #[serde(rename = "NODE_UPGRADE")]
    NodeUpgrade,
}

impl TxnType {
    /// Read-only query operations are never gated by pool write mode.
    pub fn is_query(&self) -> bool {
        matches!(self, TxnType::GetNym | TxnType::GetAttr | TxnType::GetTxns)
    }

    /// Governance transaction types that must reach the Config request
    /// handler even when the pool is read-only, so governance can re-open
    /// writes.
    pub fn is_config_write(&self) -> bool {
        matches!(self, TxnType::PoolUpgrade | TxnType::PoolConfig)
    }

    /// The ledger this write type belongs to, if it is a ledger write.
    pub fn target_ledger(&self) -> Option<crate::LedgerId> {
        match self {
            TxnType::Node => Some(crate::LedgerId::Pool),
            TxnType::Nym | TxnType::Attrib => Some(crate::LedgerId::Domain),
            TxnType::PoolUpgrade | TxnType::PoolConfig => Some(crate::LedgerId::Config),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxnType::Node => "NODE",
            TxnType::Nym => "NYM",
            TxnType::Attrib => "ATTRIB",
            TxnType::GetNym => "GET_NYM",
            TxnType::GetAttr => "GET_ATTR",
            TxnType::GetTxns => "GET_TXNS",
            TxnType::PoolUpgrade => "POOL_UPGRADE",
            TxnType::PoolConfig => "POOL_CONFIG",
            TxnType::NodeUpgrade => "NODE_UPGRADE",
        }
    }
}

impl fmt::Display for TxnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TxnType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NODE" => Ok(TxnType::Node),
            "NYM" => Ok(TxnType::Nym),
            "ATTRIB" => Ok(TxnType::Attrib),
            "GET_NYM" => Ok(TxnType::GetNym),
            "GET_ATTR" => Ok(TxnType::GetAttr),
            "GET_TXNS" => Ok(TxnType::GetTxns),
            "POOL_UPGRADE" => Ok(TxnType::PoolUpgrade),
            "POOL_CONFIG" => Ok(TxnType::PoolConfig),
            "NODE_UPGRADE" => Ok(TxnType::NodeUpgrade),
            other => Err(TypeError::UnknownTxnType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_are_not_config_writes() {
        for t in [TxnType::GetNym, TxnType::GetAttr, TxnType::GetTxns] {
            assert!(t.is_query());
            assert!(!t.is_config_write());
        }
    }

    #[test]
    fn governance_types_bypass_the_gate() {
        assert!(TxnType::PoolUpgrade.is_config_write());
        assert!(TxnType::PoolConfig.is_config_write());
        assert!(!TxnType::Nym.is_config_write());
        assert!(!TxnType::NodeUpgrade.is_config_write());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&TxnType::NodeUpgrade).unwrap();
        assert_eq!(json, "\"NODE_UPGRADE\"");
        let back: TxnType = serde_json::from_str("\"POOL_CONFIG\"").unwrap();
        assert_eq!(back, TxnType::PoolConfig);
    }

    #[test]
    fn from_str_round_trips_every_variant() {
        for t in [
            TxnType::Node,
            TxnType::Nym,
            TxnType::Attrib,
            TxnType::GetNym,
            TxnType::GetAttr,
            TxnType::GetTxns,
            TxnType::PoolUpgrade,
            TxnType::PoolConfig,
            TxnType::NodeUpgrade,
        ] {
            assert_eq!(t.as_str().parse::<TxnType>().unwrap(), t);
        }
    }
}

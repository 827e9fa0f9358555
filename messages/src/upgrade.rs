//! The `NODE_UPGRADE` peer control message.
//!
//! Nodes self-report upgrade lifecycle events to peers through these
//! messages, signed with the node's own identity key. There is no central
//! coordinator: a peer learns that another node started, completed, or
//! failed an upgrade only from these announcements.

use serde::{Deserialize, Serialize};
use serde_json::json;

use plinth_types::{Identifier, TxnType, Version};

use crate::keys;
use crate::request::{Operation, Request};

/// Upgrade lifecycle actions announced to peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpgradeAction {
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETE")]
    Complete,
    #[serde(rename = "FAIL")]
    Fail,
}

impl std::fmt::Display for UpgradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpgradeAction::InProgress => "IN_PROGRESS",
            UpgradeAction::Complete => "COMPLETE",
            UpgradeAction::Fail => "FAIL",
        };
        f.write_str(s)
    }
}

/// Payload of a `NODE_UPGRADE` control message. This is the part the node
/// signature covers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUpgradeData {
    pub action: UpgradeAction,
    pub version: Version,
}

impl NodeUpgradeData {
    pub fn new(action: UpgradeAction, version: Version) -> Self {
        Self { action, version }
    }

    /// Canonical bytes the node identity signature is computed over.
    pub fn signable_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("NodeUpgradeData is always serializable")
    }

    /// Wrap the payload into a request envelope.
    ///
    /// `protocol_version` is left absent on purpose: mid-upgrade, peers may
    /// not yet agree on a protocol version, and this message must remain
    /// parseable by all of them.
    pub fn into_request(self, identifier: Identifier, req_id: u64, signature_hex: String) -> Request {
        let data = serde_json::to_value(&self).expect("NodeUpgradeData is always serializable");
        Request {
            operation: Operation::new(TxnType::NodeUpgrade).with_field("data", data),
            identifier,
            req_id,
            protocol_version: None,
            signature: Some(signature_hex),
        }
    }

    /// Extract the payload back out of a request envelope.
    pub fn from_request(req: &Request) -> Option<Self> {
        if req.operation.txn_type != TxnType::NodeUpgrade {
            return None;
        }
        req.operation
            .data
            .get("data")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Convenience for building the wire-level operation JSON used in tests and
/// peer-facing logs.
pub fn node_upgrade_operation_json(action: UpgradeAction, version: &Version) -> serde_json::Value {
    json!({
        "type": TxnType::NodeUpgrade.as_str(),
        "data": { keys::ACTION: action.to_string(), keys::VERSION: version.as_str() },
    })
}

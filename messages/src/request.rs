//! Client and peer request envelopes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use plinth_types::{Identifier, TxnType};

use crate::keys;

/// The operation part of a request: a transaction type tag plus the
/// type-specific payload fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub txn_type: TxnType,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Operation {
    pub fn new(txn_type: TxnType) -> Self {
        Self {
            txn_type,
            data: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(Value::as_u64)
    }
}

/// Uniquely identifies a request: the author plus the author-chosen `reqId`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
    pub identifier: Identifier,
    pub req_id: u64,
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.identifier, self.req_id)
    }
}

/// A request as received from a client or a peer node.
///
/// `protocol_version` is optional on the wire: peer upgrade acknowledgements
/// deliberately omit it so they stay parseable mid-upgrade, before every node
/// agrees on a protocol version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub operation: Operation,
    pub identifier: Identifier,
    #[serde(rename = "reqId")]
    pub req_id: u64,
    #[serde(
        rename = "protocolVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub protocol_version: Option<u16>,
    /// Hex-encoded Ed25519 signature over the operation payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Request {
    pub fn key(&self) -> RequestKey {
        RequestKey {
            identifier: self.identifier.clone(),
            req_id: self.req_id,
        }
    }

    /// Read-only query requests bypass the write-mode gate.
    pub fn is_query(&self) -> bool {
        self.operation.txn_type.is_query()
    }

    /// A forced governance request is applied immediately, outside normal
    /// consensus batching.
    pub fn is_forced(&self) -> bool {
        self.operation.get_bool(keys::FORCE).unwrap_or(false)
    }
}

/// Whether a raw peer message has the authenticated control-message shape:
/// `{operation, identifier, reqId}` with `operation.type == NODE_UPGRADE`.
///
/// Anything else falls through to the standard client validation path.
pub fn is_node_upgrade_shape(msg: &Value) -> bool {
    let Some(obj) = msg.as_object() else {
        return false;
    };
    if !["operation", "identifier", "reqId"]
        .iter()
        .all(|k| obj.contains_key(*k))
    {
        return false;
    }
    msg.pointer("/operation/type").and_then(Value::as_str) == Some(TxnType::NodeUpgrade.as_str())
}

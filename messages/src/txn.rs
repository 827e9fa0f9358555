//! Committed transaction representation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use plinth_types::{Identifier, SeqNo, Timestamp, TxnType};

use crate::request::Request;

/// A transaction as recorded on a ledger (and as returned to callers in
/// replies). `seq_no` and `txn_time` are assigned at commit time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Txn {
    #[serde(rename = "type")]
    pub txn_type: TxnType,
    pub identifier: Identifier,
    #[serde(rename = "reqId")]
    pub req_id: u64,
    #[serde(rename = "seqNo", default, skip_serializing_if = "Option::is_none")]
    pub seq_no: Option<SeqNo>,
    #[serde(rename = "txnTime", default, skip_serializing_if = "Option::is_none")]
    pub txn_time: Option<Timestamp>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Txn {
    /// Build the ledger-side transaction for a validated request. Payload
    /// fields are carried over verbatim; externalized fields (raw/enc
    /// attribute values) are replaced by their digests before this point.
    pub fn from_request(req: &Request) -> Self {
        Self {
            txn_type: req.operation.txn_type,
            identifier: req.identifier.clone(),
            req_id: req.req_id,
            seq_no: None,
            txn_time: None,
            data: req.operation.data.clone(),
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }

    pub fn set_field(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }
}

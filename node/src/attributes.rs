//! Rehydration of externalized attribute payloads.
//!
//! `ATTRIB` transactions on the Domain ledger carry only the Blake2b digest
//! of the attribute value; the value itself lives in the secondary
//! [`AttributeStore`]. Before a committed transaction is handed back to a
//! caller, the digest is swapped back for the stored value. A missing value
//! is a hard error: a ledger digest without its payload means data loss,
//! and silently returning the digest would corrupt the reply.

use serde_json::json;

use plinth_messages::{keys, Txn};
use plinth_store::AttributeStore;
use plinth_types::{AttrHash, TxnType};

use crate::NodeError;

/// Replace attribute digests in `txn` with the stored values.
pub fn update_txn_with_extra_data(
    txn: &mut Txn,
    attr_store: &AttributeStore,
) -> Result<(), NodeError> {
    if txn.txn_type != TxnType::Attrib {
        return Ok(());
    }
    for kind in [keys::RAW, keys::ENC] {
        let Some(digest_hex) = txn.get_str(kind).map(str::to_string) else {
            continue;
        };
        let digest = AttrHash::from_hex(&digest_hex)
            .map_err(|e| NodeError::InvalidRequest(format!("bad attribute digest: {e}")))?;
        let value = self::lookup(attr_store, &digest)?;
        txn.set_field(kind, json!(value));
    }
    Ok(())
}

fn lookup(attr_store: &AttributeStore, digest: &AttrHash) -> Result<String, NodeError> {
    attr_store.get(digest).map_err(|e| {
        tracing::error!(digest = %digest, error = %e, "attribute rehydration failed");
        NodeError::Store(e)
    })
}

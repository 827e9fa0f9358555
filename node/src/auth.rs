//! Request authentication and the node's own signing identity.
//!
//! Two authenticators exist on purpose. Peer control messages (upgrade
//! acknowledgements) are authenticated against keys derived from Pool
//! ledger membership — node identities, not client identities. Ordinary
//! client requests are authenticated against verification keys registered
//! on the Domain ledger. Authentication is a value, not an exception:
//! callers branch on [`AuthOutcome`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use plinth_ledger::Ledger;
use plinth_messages::{keys, NodeUpgradeData, Request, Txn};
use plinth_types::{Identifier, Timestamp, TxnType};

/// Result of an authentication check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated,
    Rejected(String),
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated)
    }
}

fn decode_verifying_key(hex_key: &str) -> Option<VerifyingKey> {
    let bytes = hex::decode(hex_key).ok()?;
    let bytes: [u8; 32] = bytes.try_into().ok()?;
    VerifyingKey::from_bytes(&bytes).ok()
}

fn verify(key: &VerifyingKey, payload: &[u8], signature_hex: &str) -> AuthOutcome {
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return AuthOutcome::Rejected("signature is not valid hex".to_string());
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(sig_bytes) else {
        return AuthOutcome::Rejected("signature has wrong length".to_string());
    };
    let signature = Signature::from_bytes(&sig_bytes);
    match key.verify_strict(payload, &signature) {
        Ok(()) => AuthOutcome::Authenticated,
        Err(_) => AuthOutcome::Rejected("signature verification failed".to_string()),
    }
}

// ── Node authenticator ─────────────────────────────────────────────────

/// Authenticates peer-originated control messages against Pool membership.
pub struct NodeAuthenticator {
    node_keys: HashMap<Identifier, VerifyingKey>,
}

impl NodeAuthenticator {
    pub fn empty() -> Self {
        Self {
            node_keys: HashMap::new(),
        }
    }

    /// Rebuild the key registry by replaying Pool `NODE` transactions.
    /// A later record for the same alias replaces the earlier key.
    pub fn from_pool_ledger(ledger: &dyn Ledger) -> Self {
        let mut node_keys = HashMap::new();
        for txn in ledger.get_all_txns() {
            if txn.txn_type != TxnType::Node {
                continue;
            }
            let (Some(alias), Some(verkey)) =
                (txn.get_str(keys::ALIAS), txn.get_str(keys::VERKEY))
            else {
                tracing::warn!(seq_no = ?txn.seq_no, "pool NODE record missing alias or verkey");
                continue;
            };
            match decode_verifying_key(verkey) {
                Some(key) => {
                    node_keys.insert(Identifier::new(alias), key);
                }
                None => {
                    tracing::warn!(alias, "pool NODE record carries an undecodable verkey");
                }
            }
        }
        tracing::debug!(nodes = node_keys.len(), "node authenticator rebuilt from pool ledger");
        Self { node_keys }
    }

    pub fn known_nodes(&self) -> usize {
        self.node_keys.len()
    }

    /// Authenticate a `NODE_UPGRADE` control request: the signature must be
    /// a valid node-identity signature over the upgrade payload.
    pub fn authenticate(&self, request: &Request) -> AuthOutcome {
        let Some(payload) = NodeUpgradeData::from_request(request) else {
            return AuthOutcome::Rejected("missing or malformed upgrade payload".to_string());
        };
        let Some(signature) = &request.signature else {
            return AuthOutcome::Rejected("control message is unsigned".to_string());
        };
        let Some(key) = self.node_keys.get(&request.identifier) else {
            return AuthOutcome::Rejected(format!(
                "identifier {} is not a pool member",
                request.identifier
            ));
        };
        verify(key, &payload.signable_bytes(), signature)
    }
}

// ── Client authenticator ───────────────────────────────────────────────

/// Authenticates client requests against verification keys registered by
/// Domain `NYM` transactions.
pub struct ClientAuthenticator {
    verkeys: HashMap<Identifier, VerifyingKey>,
}

impl ClientAuthenticator {
    pub fn empty() -> Self {
        Self {
            verkeys: HashMap::new(),
        }
    }

    /// Rebuild from Domain ledger replay.
    pub fn from_domain_ledger(ledger: &dyn Ledger) -> Self {
        let mut verkeys = HashMap::new();
        for txn in ledger.get_all_txns() {
            if txn.txn_type != TxnType::Nym {
                continue;
            }
            if let (Some(dest), Some(verkey)) = (txn.get_str(keys::DEST), txn.get_str(keys::VERKEY))
            {
                if let Some(key) = decode_verifying_key(verkey) {
                    verkeys.insert(Identifier::new(dest), key);
                }
            }
        }
        Self { verkeys }
    }

    /// Apply a newly committed NYM without a full replay.
    pub fn observe_txn(&mut self, txn: &Txn) {
        if txn.txn_type != TxnType::Nym {
            return;
        }
        if let (Some(dest), Some(verkey)) = (txn.get_str(keys::DEST), txn.get_str(keys::VERKEY)) {
            if let Some(key) = decode_verifying_key(verkey) {
                self.verkeys.insert(Identifier::new(dest), key);
            }
        }
    }

    pub fn authenticate(&self, request: &Request) -> AuthOutcome {
        let Some(signature) = &request.signature else {
            // Unsigned client requests are admitted here; signature policy
            // for client traffic is enforced by the request handlers'
            // domain rules, not the transport.
            return AuthOutcome::Authenticated;
        };
        let Some(key) = self.verkeys.get(&request.identifier) else {
            return AuthOutcome::Rejected(format!("unknown identifier {}", request.identifier));
        };
        let payload = serde_json::to_vec(&request.operation)
            .expect("Operation is always serializable");
        verify(key, &payload, signature)
    }
}

// ── Node signer ────────────────────────────────────────────────────────

/// This node's own signing identity, used for peer control messages.
pub struct NodeSigner {
    identifier: Identifier,
    signing_key: SigningKey,
    req_id: AtomicU64,
}

impl NodeSigner {
    pub fn new(identifier: Identifier, signing_key: SigningKey) -> Self {
        // Request ids only need to be unique per author; seed from wall
        // clock so they stay unique across restarts.
        let base = Timestamp::now().as_secs() * 1_000;
        Self {
            identifier,
            signing_key,
            req_id: AtomicU64::new(base),
        }
    }

    pub fn from_seed(identifier: Identifier, seed: &[u8; 32]) -> Self {
        Self::new(identifier, SigningKey::from_bytes(seed))
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Hex-encoded verification key, as registered on the Pool ledger.
    pub fn verkey_hex(&self) -> String {
        hex::encode(self.verifying_key().to_bytes())
    }

    fn next_req_id(&self) -> u64 {
        self.req_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Build a signed `NODE_UPGRADE` control request. The signature covers
    /// the upgrade payload and is made with this node's identity key, not a
    /// client key.
    pub fn sign_upgrade(&self, payload: NodeUpgradeData) -> Request {
        let signature = self.signing_key.sign(&payload.signable_bytes());
        payload.into_request(
            self.identifier.clone(),
            self.next_req_id(),
            hex::encode(signature.to_bytes()),
        )
    }
}

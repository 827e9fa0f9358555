//! Separation of peer control messages from client traffic.
//!
//! Raw inbound messages are shape-tested first: a `NODE_UPGRADE` envelope is
//! a peer control message and must carry a valid node-identity signature.
//! Authentication failure drops the message with a warning; it never
//! propagates as an error, since a malicious peer must not be able to
//! disturb the node by sending garbage.

use serde_json::Value;

use plinth_ledger::Ledger;
use plinth_messages::{is_node_upgrade_shape, Request};

use crate::auth::{AuthOutcome, NodeAuthenticator};

/// Where an inbound raw message goes.
#[derive(Debug)]
pub enum Routed {
    /// Authenticated peer control message.
    PeerControl(Request),
    /// Ordinary client request, to be validated and gated.
    Client(Request),
    /// Dropped; `control` says whether it had the control-message shape.
    Dropped { control: bool, reason: String },
}

/// Routes raw peer messages by shape and authenticates the control ones.
pub struct ControlMessageRouter {
    node_authnr: NodeAuthenticator,
}

impl ControlMessageRouter {
    pub fn new(node_authnr: NodeAuthenticator) -> Self {
        Self { node_authnr }
    }

    /// Refresh node keys after Pool ledger changes.
    pub fn rebuild_node_keys(&mut self, pool_ledger: &dyn Ledger) {
        self.node_authnr = NodeAuthenticator::from_pool_ledger(pool_ledger);
    }

    pub fn route(&self, raw: &Value, frm: &str) -> Routed {
        if is_node_upgrade_shape(raw) {
            let request: Request = match serde_json::from_value(raw.clone()) {
                Ok(req) => req,
                Err(e) => {
                    tracing::warn!(frm, error = %e, "malformed control message dropped");
                    return Routed::Dropped {
                        control: true,
                        reason: e.to_string(),
                    };
                }
            };
            return match self.node_authnr.authenticate(&request) {
                AuthOutcome::Authenticated => Routed::PeerControl(request),
                AuthOutcome::Rejected(reason) => {
                    tracing::warn!(
                        frm,
                        identifier = %request.identifier,
                        reason,
                        "control message failed node authentication, dropped"
                    );
                    Routed::Dropped {
                        control: true,
                        reason,
                    }
                }
            };
        }

        match serde_json::from_value::<Request>(raw.clone()) {
            Ok(req) => Routed::Client(req),
            Err(e) => {
                tracing::warn!(frm, error = %e, "unparseable peer message dropped");
                Routed::Dropped {
                    control: false,
                    reason: e.to_string(),
                }
            }
        }
    }
}

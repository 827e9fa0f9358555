//! Outbound peer traffic seam.
//!
//! The node never talks to the wire directly; it hands outbound control
//! messages and ledger statuses to a [`PeerLink`] and the transport layer
//! (an external collaborator) does the rest.

use tokio::sync::mpsc;

use plinth_messages::{LedgerStatus, Request};
use plinth_types::NodeId;

use crate::NodeError;

/// Messages leaving this node.
#[derive(Clone, Debug)]
pub enum OutboundMessage {
    /// Flood a signed control request to every connected peer.
    Broadcast(Request),
    /// Send a ledger status to one peer.
    Status { to: NodeId, status: LedgerStatus },
}

/// Narrow interface to the peer transport.
pub trait PeerLink: Send + Sync {
    /// Broadcast a control request to all peers.
    fn broadcast(&self, request: &Request) -> Result<(), NodeError>;

    /// Send a ledger status to a single peer.
    fn send_status(&self, to: &NodeId, status: &LedgerStatus) -> Result<(), NodeError>;
}

/// Channel-backed [`PeerLink`]: outbound messages are queued for the
/// transport task.
pub struct ChannelPeerLink {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelPeerLink {
    pub fn new(tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { tx }
    }
}

impl PeerLink for ChannelPeerLink {
    fn broadcast(&self, request: &Request) -> Result<(), NodeError> {
        self.tx
            .send(OutboundMessage::Broadcast(request.clone()))
            .map_err(|e| NodeError::Channel(e.to_string()))
    }

    fn send_status(&self, to: &NodeId, status: &LedgerStatus) -> Result<(), NodeError> {
        self.tx
            .send(OutboundMessage::Status {
                to: to.clone(),
                status: status.clone(),
            })
            .map_err(|e| NodeError::Channel(e.to_string()))
    }
}

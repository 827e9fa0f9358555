//! Events dispatched into the node's cooperative event loop.
//!
//! External I/O — timer fires, peer sync milestones, raw peer messages —
//! arrives as discrete events. Each is handled run-to-completion; the
//! components themselves never block.

use serde_json::Value;

use plinth_types::{LedgerId, NodeId, Version};

/// One unit of work for [`PlinthNode::handle_event`].
///
/// [`PlinthNode::handle_event`]: crate::PlinthNode::handle_event
#[derive(Clone, Debug)]
pub enum NodeEvent {
    /// The armed upgrade timer fired for `version`.
    UpgradeTimerFired { version: Version },
    /// A raw message arrived from a peer.
    PeerMessage { raw: Value, frm: String },
    /// The external sync subsystem finished replaying a ledger.
    LedgerSynced(LedgerId),
    /// A peer asked for our status of a ledger.
    LedgerStatusQuery { ledger_id: LedgerId, peer: NodeId },
    /// A previously unseen peer connected.
    PeerConnected(NodeId),
}

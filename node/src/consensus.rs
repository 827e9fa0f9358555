//! Submission seam into the external consensus core.
//!
//! The node validates and gates requests, then hands accepted writes to the
//! consensus core for ordering. Ordering outcomes come back through the
//! [`BatchConsumer`] capability.
//!
//! [`BatchConsumer`]: crate::node::BatchConsumer

use tokio::sync::mpsc;

use plinth_messages::Request;

use crate::NodeError;

/// Accepts requests for consensus ordering.
pub trait ConsensusSubmitter: Send + Sync {
    fn submit(&self, request: Request) -> Result<(), NodeError>;
}

/// Channel-backed submitter feeding the consensus core's intake queue.
pub struct ChannelConsensus {
    tx: mpsc::UnboundedSender<Request>,
}

impl ChannelConsensus {
    pub fn new(tx: mpsc::UnboundedSender<Request>) -> Self {
        Self { tx }
    }
}

impl ConsensusSubmitter for ChannelConsensus {
    fn submit(&self, request: Request) -> Result<(), NodeError> {
        self.tx
            .send(request)
            .map_err(|e| NodeError::Channel(e.to_string()))
    }
}

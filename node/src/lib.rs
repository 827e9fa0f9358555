//! Plinth node — orchestration around an external BFT consensus core.
//!
//! The node is the coordinator that:
//! - Sequences catch-up across the three dependent ledgers (Pool → Config → Domain)
//! - Coordinates network-wide software upgrades without a central coordinator
//! - Gates write traffic on governance-driven pool state
//! - Dispatches consensus-ordered batches to the owning request handler
//! - Routes authenticated peer control messages apart from client requests

pub mod attributes;
pub mod auth;
pub mod catchup;
pub mod config;
pub mod consensus;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod nullables;
pub mod peer_link;
pub mod pool_config;
pub mod req_handler;
pub mod router;
pub mod shutdown;
pub mod upgrader;

pub use attributes::update_txn_with_extra_data;
pub use auth::{AuthOutcome, ClientAuthenticator, NodeAuthenticator, NodeSigner};
pub use catchup::CatchupSequencer;
pub use config::NodeConfig;
pub use consensus::{ChannelConsensus, ConsensusSubmitter};
pub use dispatcher::BatchDispatcher;
pub use error::NodeError;
pub use events::NodeEvent;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::{
    BatchConsumer, LedgerProvider, NodeDeps, PlinthNode, RequestOutcome, RequestValidator,
    SharedLedger,
};
pub use peer_link::{ChannelPeerLink, OutboundMessage, PeerLink};
pub use pool_config::{Admit, PoolConfig, WriteGate};
pub use req_handler::{
    shared_ledger, ConfigReqHandler, DomainReqHandler, PoolReqHandler, RequestHandler,
};
pub use router::{ControlMessageRouter, Routed};
pub use shutdown::ShutdownController;
pub use upgrader::{
    TokioUpgradeTimer, UpgradeExecutor, UpgradeSchedule, UpgradeState, UpgradeTimer, Upgrader,
};

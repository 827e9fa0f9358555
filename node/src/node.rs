//! The node orchestrator.
//!
//! [`PlinthNode`] composes the catch-up sequencer, the upgrade coordinator,
//! the write-mode gate, the batch dispatcher, and the control-message router
//! around shared ledger handles. It exposes narrow capability traits
//! ([`LedgerProvider`], [`BatchConsumer`], [`RequestValidator`]) so the
//! consensus core and the sync subsystem depend on exactly what they use,
//! not on the whole node.
//!
//! All event handling is run-to-completion on the node's event loop; the
//! node never blocks inside a handler.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::mpsc;

use plinth_ledger::{Ledger, MemoryLedger, MemoryProjection};
use plinth_messages::{LedgerStatus, Request, RequestKey, Txn};
use plinth_store::{
    AttributeStore, KeyValueStore, MemoryKv, MemoryOutcomeStore, UpgradeOutcomeStore,
};
use plinth_types::{LedgerId, LedgerRoot, LedgerSyncState, NodeId, StateRoot, Timestamp};

use crate::auth::{AuthOutcome, ClientAuthenticator, NodeAuthenticator, NodeSigner};
use crate::catchup::CatchupSequencer;
use crate::config::NodeConfig;
use crate::consensus::ConsensusSubmitter;
use crate::dispatcher::BatchDispatcher;
use crate::events::NodeEvent;
use crate::metrics::NodeMetrics;
use crate::nullables::{NullConsensus, NullTimer, RecordingPeerLink, ScriptedUpgradeExecutor};
use crate::peer_link::PeerLink;
use crate::pool_config::{Admit, PoolConfig, WriteGate};
use crate::req_handler::{
    read_ledger, shared_ledger, ConfigReqHandler, DomainReqHandler, PoolReqHandler, RequestHandler,
};
use crate::router::{ControlMessageRouter, Routed};
use crate::shutdown::ShutdownController;
use crate::upgrader::{UpgradeExecutor, UpgradeState, UpgradeTimer, Upgrader};
use crate::NodeError;

pub use crate::req_handler::SharedLedger;

/// Read access to ledger roots, sizes, and sync states.
pub trait LedgerProvider {
    fn ledger_root(&self, id: LedgerId) -> Result<LedgerRoot, NodeError>;
    fn ledger_size(&self, id: LedgerId) -> Result<usize, NodeError>;
    fn sync_state(&self, id: LedgerId) -> LedgerSyncState;
}

/// Consumes consensus-ordered batches.
pub trait BatchConsumer {
    /// Consensus proposed a batch of `requests` for `ledger`. The requests
    /// are remembered so a later rejection can release their in-flight keys.
    fn on_batch_created(&mut self, ledger: LedgerId, state_root: StateRoot, requests: &[Request]);
    fn on_batch_rejected(&mut self, ledger: LedgerId);
    fn execute_batch(
        &mut self,
        ledger: LedgerId,
        batch_time: Timestamp,
        requests: &[Request],
        state_root: &StateRoot,
        txn_root: Option<&LedgerRoot>,
    ) -> Result<Vec<Txn>, NodeError>;
}

/// Static request validation, as the consensus core sees it.
pub trait RequestValidator {
    fn validate(&self, req: &Request) -> Result<(), NodeError>;
}

/// What happened to a submitted request.
#[derive(Debug)]
pub enum RequestOutcome {
    /// A query, answered locally.
    Query(Value),
    /// Accepted and handed to consensus (and, for forced governance
    /// requests, already applied locally).
    Forwarded { forced: bool },
    /// Refused before consensus.
    Rejected {
        reason: String,
        retry_after_secs: Option<u64>,
    },
}

/// External collaborators handed to the node at construction. Every shared
/// resource is built explicitly by the caller and closed explicitly through
/// [`PlinthNode::close_stores`].
pub struct NodeDeps {
    pub pool_ledger: SharedLedger,
    pub config_ledger: SharedLedger,
    pub domain_ledger: SharedLedger,
    pub attr_kv: Arc<dyn KeyValueStore>,
    pub outcome_store: Arc<dyn UpgradeOutcomeStore>,
    pub peer_link: Arc<dyn PeerLink>,
    pub consensus: Arc<dyn ConsensusSubmitter>,
    pub timer: Box<dyn UpgradeTimer>,
    pub executor: Box<dyn UpgradeExecutor>,
    /// Seed for this node's Ed25519 identity key.
    pub signing_seed: [u8; 32],
}

impl NodeDeps {
    /// Fully in-memory dependencies with recording collaborators. Intended
    /// for tests and local experiments.
    pub fn in_memory() -> Self {
        Self {
            pool_ledger: shared_ledger(MemoryLedger::new(LedgerId::Pool)),
            config_ledger: shared_ledger(MemoryLedger::new(LedgerId::Config)),
            domain_ledger: shared_ledger(MemoryLedger::new(LedgerId::Domain)),
            attr_kv: Arc::new(MemoryKv::new()),
            outcome_store: Arc::new(MemoryOutcomeStore::new()),
            peer_link: Arc::new(RecordingPeerLink::new()),
            consensus: Arc::new(NullConsensus::new()),
            timer: Box::new(NullTimer::new()),
            executor: Box::new(ScriptedUpgradeExecutor::succeeding()),
            signing_seed: [0u8; 32],
        }
    }
}

/// The node: validation, gating, upgrade coordination, batch execution, and
/// catch-up sequencing around an external consensus core.
pub struct PlinthNode {
    config: NodeConfig,
    node_id: NodeId,

    pool_ledger: SharedLedger,
    config_ledger: SharedLedger,
    domain_ledger: SharedLedger,

    catchup: CatchupSequencer,
    pool_cfg: Arc<RwLock<PoolConfig>>,
    gate: WriteGate,
    upgrader: Upgrader,
    dispatcher: BatchDispatcher,
    router: ControlMessageRouter,
    client_authnr: ClientAuthenticator,

    attr_store: Arc<AttributeStore>,
    peer_link: Arc<dyn PeerLink>,
    consensus: Arc<dyn ConsensusSubmitter>,

    metrics: NodeMetrics,
    processing: HashSet<RequestKey>,
    pending_batches: HashMap<LedgerId, Vec<RequestKey>>,
    shutdown: Arc<ShutdownController>,
}

impl PlinthNode {
    pub fn new(config: NodeConfig, deps: NodeDeps) -> Result<Self, NodeError> {
        let node_id = config.node_id();
        let signer = Arc::new(NodeSigner::from_seed(
            node_id.as_identifier(),
            &deps.signing_seed,
        ));
        let attr_store = Arc::new(AttributeStore::new(deps.attr_kv));

        let mut pool_handler = PoolReqHandler::new(
            deps.pool_ledger.clone(),
            Box::new(MemoryProjection::new()),
        );
        let mut config_handler = ConfigReqHandler::new(
            deps.config_ledger.clone(),
            Box::new(MemoryProjection::new()),
        );
        let mut domain_handler = DomainReqHandler::new(
            deps.domain_ledger.clone(),
            Box::new(MemoryProjection::new()),
            attr_store.clone(),
        );
        pool_handler.init_from_ledger()?;
        config_handler.init_from_ledger()?;
        domain_handler.init_from_ledger()?;

        let dispatcher = BatchDispatcher::new(
            Box::new(pool_handler),
            Box::new(config_handler),
            Box::new(domain_handler),
            attr_store.clone(),
        );

        let pool_cfg = Arc::new(RwLock::new(PoolConfig::new()));
        let gate = WriteGate::new(pool_cfg.clone(), config.readonly_retry_secs);

        let upgrader = Upgrader::new(
            config.running_version(),
            deps.timer,
            deps.executor,
            deps.outcome_store,
            deps.peer_link.clone(),
            signer,
        );

        let router = {
            let guard = read_ledger(&deps.pool_ledger)?;
            ControlMessageRouter::new(NodeAuthenticator::from_pool_ledger(&**guard))
        };
        let client_authnr = {
            let guard = read_ledger(&deps.domain_ledger)?;
            ClientAuthenticator::from_domain_ledger(&**guard)
        };

        let mut node = Self {
            config,
            node_id,
            pool_ledger: deps.pool_ledger,
            config_ledger: deps.config_ledger,
            domain_ledger: deps.domain_ledger,
            catchup: CatchupSequencer::new(),
            pool_cfg,
            gate,
            upgrader,
            dispatcher,
            router,
            client_authnr,
            attr_store,
            peer_link: deps.peer_link,
            consensus: deps.consensus,
            metrics: NodeMetrics::new(),
            processing: HashSet::new(),
            pending_batches: HashMap::new(),
            shutdown: Arc::new(ShutdownController::new()),
        };
        // Fold any genesis governance content so the gate starts correct.
        node.refresh_config_derived_state()?;
        Ok(node)
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }

    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        self.shutdown.clone()
    }

    pub fn upgrade_state(&self) -> &UpgradeState {
        self.upgrader.state()
    }

    pub fn is_writable(&self) -> bool {
        self.pool_cfg
            .read()
            .map(|cfg| cfg.is_writable())
            .unwrap_or(false)
    }

    pub fn fully_synced(&self) -> bool {
        self.catchup.fully_synced()
    }

    fn ledger_handle(&self, id: LedgerId) -> &SharedLedger {
        match id {
            LedgerId::Pool => &self.pool_ledger,
            LedgerId::Config => &self.config_ledger,
            LedgerId::Domain => &self.domain_ledger,
        }
    }

    fn status_of(&self, id: LedgerId) -> Result<LedgerStatus, NodeError> {
        let guard = read_ledger(self.ledger_handle(id))?;
        Ok(LedgerStatus {
            ledger_id: id,
            size: guard.size() as u64,
            root: guard.root(),
        })
    }

    /// Re-derive everything that follows from the Config ledger: write
    /// mode and the upgrade schedule. Called after Config catch-up and
    /// after every committed Config batch, so a superseding `POOL_UPGRADE`
    /// re-arms or cancels the timer in the same step that commits it.
    fn refresh_config_derived_state(&mut self) -> Result<(), NodeError> {
        let guard = read_ledger(&self.config_ledger)?;
        let ledger: &dyn Ledger = &**guard;
        {
            let mut cfg = self
                .pool_cfg
                .write()
                .map_err(|_| NodeError::Config("pool config lock poisoned".to_string()))?;
            *cfg = PoolConfig::new();
            cfg.process_ledger(ledger);
        }
        self.upgrader.process_ledger(ledger)?;
        Ok(())
    }

    fn rebuild_node_keys(&mut self) -> Result<(), NodeError> {
        let guard = read_ledger(&self.pool_ledger)?;
        self.router.rebuild_node_keys(&**guard);
        Ok(())
    }

    // ── Request intake ─────────────────────────────────────────────────

    /// Process one client request end to end: authenticate, answer queries
    /// locally, validate writes, gate them, and hand accepted writes to
    /// consensus. Forced governance requests are additionally applied
    /// immediately.
    pub fn process_request(&mut self, req: Request) -> Result<RequestOutcome, NodeError> {
        self.metrics.requests_processed.inc();

        if let AuthOutcome::Rejected(reason) = self.client_authnr.authenticate(&req) {
            return Ok(RequestOutcome::Rejected {
                reason,
                retry_after_secs: None,
            });
        }

        if req.is_query() {
            let reply = self.dispatcher.query(&req)?;
            return Ok(RequestOutcome::Query(reply));
        }

        match self.dispatcher.validate(&req) {
            Ok(()) => {}
            Err(NodeError::InvalidRequest(reason)) => {
                return Ok(RequestOutcome::Rejected {
                    reason,
                    retry_after_secs: None,
                });
            }
            Err(e) => return Err(e),
        }

        // Forced governance requests take the fast path regardless of the
        // pool's write mode: they are the mechanism that repairs the pool.
        if req.is_forced() && req.operation.txn_type.is_config_write() {
            self.dispatcher.apply_forced(&req, Timestamp::now())?;
            self.refresh_config_derived_state()?;
            self.consensus.submit(req)?;
            return Ok(RequestOutcome::Forwarded { forced: true });
        }

        match self.gate.admit(&req) {
            Admit::Accept => {
                if !self.processing.insert(req.key()) {
                    return Ok(RequestOutcome::Rejected {
                        reason: format!("request {} is already being processed", req.key()),
                        retry_after_secs: None,
                    });
                }
                self.consensus.submit(req)?;
                Ok(RequestOutcome::Forwarded { forced: false })
            }
            Admit::Reject {
                reason,
                retry_after_secs,
            } => {
                self.metrics.readonly_rejections.inc();
                tracing::info!(
                    txn_type = %req.operation.txn_type,
                    identifier = %req.identifier,
                    "write rejected, pool is read-only"
                );
                Ok(RequestOutcome::Rejected {
                    reason,
                    retry_after_secs: Some(retry_after_secs),
                })
            }
        }
    }

    /// Handle one raw message from a peer: control messages are
    /// authenticated and submitted for ordering, client traffic goes
    /// through the standard intake, garbage is dropped.
    pub fn process_peer_message(&mut self, raw: &Value, frm: &str) -> Result<(), NodeError> {
        match self.router.route(raw, frm) {
            Routed::PeerControl(req) => {
                // Control requests never flow through a ledger batch, so they
                // are not tracked as in-flight; duplicates are harmless facts.
                self.consensus.submit(req)?;
                Ok(())
            }
            Routed::Client(req) => {
                self.process_request(req)?;
                Ok(())
            }
            Routed::Dropped { control, .. } => {
                if control {
                    self.metrics.control_auth_failures.inc();
                }
                Ok(())
            }
        }
    }

    // ── Catch-up ───────────────────────────────────────────────────────

    /// Begin catch-up from the start of the dependency chain.
    pub fn start_catchup(&mut self) -> Result<(), NodeError> {
        self.start_sync(LedgerId::Pool)
    }

    fn start_sync(&mut self, id: LedgerId) -> Result<(), NodeError> {
        let stashed = self.catchup.start_sync(id)?;
        for peer in stashed {
            let status = self.status_of(id)?;
            self.peer_link.send_status(&peer, &status)?;
        }
        Ok(())
    }

    /// The sync subsystem finished replaying `id`. Runs the post-sync hooks
    /// for that ledger and starts the next one in the chain.
    pub fn on_ledger_synced(&mut self, id: LedgerId) -> Result<(), NodeError> {
        let next = self.catchup.on_ledger_synced(id)?;
        self.dispatcher.init_handler(id)?;

        match id {
            LedgerId::Pool => {
                // Only now does the node know which Pool record is its own.
                self.upgrader.set_node_id(self.node_id.clone());
                self.rebuild_node_keys()?;
            }
            LedgerId::Config => {
                self.refresh_config_derived_state()?;
                self.upgrader.check_upgrade_result()?;
                if self.upgrader.acknowledge_upgrade()? {
                    self.metrics.upgrade_notices_sent.inc();
                }
            }
            LedgerId::Domain => {
                let guard = read_ledger(&self.domain_ledger)?;
                self.client_authnr = ClientAuthenticator::from_domain_ledger(&**guard);
                drop(guard);
                tracing::info!(node = %self.node_id, "all ledgers synced, node is caught up");
            }
        }

        let synced = LedgerId::ALL
            .iter()
            .filter(|l| self.catchup.state(**l) == LedgerSyncState::Synced)
            .count();
        self.metrics.ledgers_synced.set(synced as i64);

        if let Some(next) = next {
            self.start_sync(next)?;
        }
        Ok(())
    }

    /// A peer asked for our status of `id`. Answered immediately when that
    /// ledger is synced, stashed until then otherwise.
    pub fn handle_peer_status_query(&mut self, id: LedgerId, peer: NodeId) -> Result<(), NodeError> {
        if self.catchup.state(id) == LedgerSyncState::Synced {
            let status = self.status_of(id)?;
            self.peer_link.send_status(&peer, &status)?;
        } else {
            self.catchup.stash_status_query(id, peer);
        }
        Ok(())
    }

    /// A new peer connected: offer it our view of every synced ledger.
    /// Config status is withheld until Domain is synced too, so a freshly
    /// connecting peer never catches up Config against a node that has not
    /// finished interpreting it.
    pub fn on_peer_connected(&mut self, peer: NodeId) -> Result<(), NodeError> {
        for id in LedgerId::ALL {
            if self.catchup.state(id) != LedgerSyncState::Synced {
                continue;
            }
            if id == LedgerId::Config && self.catchup.state(LedgerId::Domain) != LedgerSyncState::Synced
            {
                continue;
            }
            let status = self.status_of(id)?;
            self.peer_link.send_status(&peer, &status)?;
        }
        Ok(())
    }

    // ── Events and the run loop ────────────────────────────────────────

    pub fn handle_event(&mut self, event: NodeEvent) -> Result<(), NodeError> {
        match event {
            NodeEvent::UpgradeTimerFired { version } => {
                let was_scheduled = matches!(self.upgrader.state(), UpgradeState::Scheduled(_));
                self.upgrader.on_timer_fired(&version)?;
                if was_scheduled && !matches!(self.upgrader.state(), UpgradeState::Scheduled(_)) {
                    self.metrics.upgrade_notices_sent.inc();
                }
                Ok(())
            }
            NodeEvent::PeerMessage { raw, frm } => self.process_peer_message(&raw, &frm),
            NodeEvent::LedgerSynced(id) => self.on_ledger_synced(id),
            NodeEvent::LedgerStatusQuery { ledger_id, peer } => {
                self.handle_peer_status_query(ledger_id, peer)
            }
            NodeEvent::PeerConnected(peer) => self.on_peer_connected(peer),
        }
    }

    /// Drive the node until shutdown: events are handled run-to-completion,
    /// the upgrader is polled once a second for past-due schedules, and
    /// fatal errors trigger shutdown instead of limping on.
    pub async fn run(
        &mut self,
        mut events: mpsc::UnboundedReceiver<NodeEvent>,
    ) -> Result<(), NodeError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut service_tick = tokio::time::interval(std::time::Duration::from_secs(1));

        if self.catchup.state(LedgerId::Pool) == LedgerSyncState::NotSynced {
            self.start_catchup()?;
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!(node = %self.node_id, "shutdown requested");
                    break;
                }
                _ = service_tick.tick() => {
                    if let Err(e) = self.upgrader.service(Timestamp::now()) {
                        self.handle_error(e);
                    }
                }
                maybe_event = events.recv() => {
                    match maybe_event {
                        Some(event) => {
                            if let Err(e) = self.handle_event(event) {
                                self.handle_error(e);
                            }
                        }
                        None => {
                            tracing::info!("event source closed, shutting down");
                            break;
                        }
                    }
                }
            }
            if self.shutdown.is_triggered() {
                break;
            }
        }

        self.close_stores()
    }

    fn handle_error(&self, e: NodeError) {
        if e.is_fatal() {
            tracing::error!(error = %e, "fatal error, triggering shutdown");
            self.shutdown.trigger();
        } else {
            tracing::warn!(error = %e, "event handling failed");
        }
    }

    /// Close every store the node owns. Explicit, so shutdown ordering is
    /// visible at the call site rather than buried in drop glue.
    pub fn close_stores(&self) -> Result<(), NodeError> {
        self.attr_store.close()?;
        tracing::info!(node = %self.node_id, "stores closed");
        Ok(())
    }
}

impl LedgerProvider for PlinthNode {
    fn ledger_root(&self, id: LedgerId) -> Result<LedgerRoot, NodeError> {
        Ok(read_ledger(self.ledger_handle(id))?.root())
    }

    fn ledger_size(&self, id: LedgerId) -> Result<usize, NodeError> {
        Ok(read_ledger(self.ledger_handle(id))?.size())
    }

    fn sync_state(&self, id: LedgerId) -> LedgerSyncState {
        self.catchup.state(id)
    }
}

impl RequestValidator for PlinthNode {
    fn validate(&self, req: &Request) -> Result<(), NodeError> {
        self.dispatcher.validate(req)
    }
}

impl BatchConsumer for PlinthNode {
    fn on_batch_created(&mut self, ledger: LedgerId, state_root: StateRoot, requests: &[Request]) {
        self.pending_batches
            .insert(ledger, requests.iter().map(Request::key).collect());
        self.dispatcher.on_batch_created(ledger, state_root);
    }

    fn on_batch_rejected(&mut self, ledger: LedgerId) {
        self.metrics.batches_rejected.inc();
        // Release the in-flight keys, otherwise a legitimate client retry
        // of the same request would be refused forever.
        if let Some(keys) = self.pending_batches.remove(&ledger) {
            for key in keys {
                self.processing.remove(&key);
            }
        }
        self.dispatcher.on_batch_rejected(ledger);
    }

    fn execute_batch(
        &mut self,
        ledger: LedgerId,
        batch_time: Timestamp,
        requests: &[Request],
        state_root: &StateRoot,
        txn_root: Option<&LedgerRoot>,
    ) -> Result<Vec<Txn>, NodeError> {
        let committed = self
            .dispatcher
            .execute(ledger, batch_time, requests, state_root, txn_root)?;
        for req in requests {
            self.processing.remove(&req.key());
        }
        self.pending_batches.remove(&ledger);
        if committed.is_empty() {
            return Ok(committed);
        }
        self.metrics.batches_committed.inc();

        // Post-commit hooks: committed content can change how the node
        // authenticates and gates everything that follows.
        match ledger {
            LedgerId::Pool => self.rebuild_node_keys()?,
            LedgerId::Config => self.refresh_config_derived_state()?,
            LedgerId::Domain => {
                for txn in &committed {
                    self.client_authnr.observe_txn(txn);
                }
            }
        }
        Ok(committed)
    }
}

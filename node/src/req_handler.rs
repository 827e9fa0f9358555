//! Per-ledger request handlers.
//!
//! Each ledger has exactly one handler owning its append-only ledger handle
//! and its derived state projection. Writes stage into the projection's
//! uncommitted overlay; `commit` folds the overlay and appends the staged
//! transactions only after the locally computed state root matches the root
//! consensus agreed on. A mismatch reverts everything and surfaces as a
//! fatal [`LedgerError::DigestMismatch`].

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{json, Value};

use plinth_ledger::{Ledger, LedgerError, StateProjection};
use plinth_messages::{keys, Request, Txn};
use plinth_store::{AttributeStore, StoreError};
use plinth_types::{AttrHash, LedgerId, LedgerRoot, StateRoot, Timestamp, TxnType};

use crate::NodeError;

/// Shared handle to a ledger: the owning handler appends, the node reads
/// roots and sizes for peer status messages.
pub type SharedLedger = Arc<RwLock<Box<dyn Ledger>>>;

/// Wrap a ledger for shared ownership.
pub fn shared_ledger(ledger: impl Ledger + 'static) -> SharedLedger {
    Arc::new(RwLock::new(Box::new(ledger)))
}

pub(crate) fn read_ledger(
    ledger: &SharedLedger,
) -> Result<RwLockReadGuard<'_, Box<dyn Ledger>>, NodeError> {
    ledger
        .read()
        .map_err(|_| NodeError::Config("ledger lock poisoned".to_string()))
}

fn write_ledger(ledger: &SharedLedger) -> Result<RwLockWriteGuard<'_, Box<dyn Ledger>>, NodeError> {
    ledger
        .write()
        .map_err(|_| NodeError::Config("ledger lock poisoned".to_string()))
}

/// Validation, batch application, and queries for one ledger.
pub trait RequestHandler: Send {
    fn ledger_id(&self) -> LedgerId;

    /// Static validation; no state is touched.
    fn validate(&self, req: &Request) -> Result<(), NodeError>;

    /// Rebuild the derived projection by replaying the owned ledger. Called
    /// after catch-up, when the sync subsystem has appended transactions
    /// behind the handler's back.
    fn init_from_ledger(&mut self) -> Result<(), NodeError>;

    /// Stage one validated request into the uncommitted overlay.
    fn apply(&mut self, req: &Request, txn_time: Timestamp) -> Result<(), NodeError>;

    /// Consensus ordered a batch containing the staged writes.
    fn on_batch_created(&mut self, state_root: StateRoot);

    /// Consensus rejected the in-flight batch; discard all staged work.
    fn on_batch_rejected(&mut self);

    /// Fold the overlay and append staged transactions, provided the local
    /// uncommitted root equals `state_root`. Returns the committed
    /// transactions with sequence numbers assigned.
    fn commit(&mut self, state_root: &StateRoot) -> Result<Vec<Txn>, NodeError>;

    /// Root of the committed projection.
    fn committed_root(&self) -> StateRoot;

    /// Root the projection would have if the staged writes were committed
    /// now. This is what a primary proposes to consensus for the batch.
    fn uncommitted_root(&self) -> StateRoot;

    /// Accumulator root of the owned ledger.
    fn ledger_root(&self) -> Result<LedgerRoot, NodeError>;

    /// Number of committed transactions on the owned ledger.
    fn ledger_size(&self) -> Result<usize, NodeError>;

    /// Whether any writes are currently staged.
    fn has_staged(&self) -> bool;

    /// Whether this exact batch already sits at the tail of the owned
    /// ledger. Used to recognize consensus re-delivery: a batch is
    /// identified by its request keys, not by the state root it lands on,
    /// since a fresh batch of state no-ops shares the root but was never
    /// appended.
    fn batch_is_appended(&self, requests: &[Request]) -> Result<bool, NodeError>;

    /// Answer a read-only query.
    fn query(&self, req: &Request) -> Result<Value, NodeError>;

    /// Apply a forced governance request immediately, outside consensus
    /// batching. Only the Config handler supports this.
    fn apply_forced(&mut self, _req: &Request, _now: Timestamp) -> Result<Vec<Txn>, NodeError> {
        Err(NodeError::InvalidRequest(format!(
            "forced application is not supported on the {} ledger",
            self.ledger_id()
        )))
    }
}

/// State shared by all three concrete handlers: the ledger handle, the
/// projection, and the staged transactions of the in-flight batch.
struct HandlerCore {
    ledger: SharedLedger,
    state: Box<dyn StateProjection>,
    staged: Vec<Txn>,
    pending_root: Option<StateRoot>,
}

impl HandlerCore {
    fn new(ledger: SharedLedger, state: Box<dyn StateProjection>) -> Self {
        Self {
            ledger,
            state,
            staged: Vec::new(),
            pending_root: None,
        }
    }

    fn stage(&mut self, mut txn: Txn, txn_time: Timestamp) {
        txn.txn_time = Some(txn_time);
        self.staged.push(txn);
    }

    fn on_batch_created(&mut self, state_root: StateRoot) {
        self.pending_root = Some(state_root);
    }

    fn reject(&mut self, ledger_id: LedgerId) {
        tracing::debug!(ledger = %ledger_id, staged = self.staged.len(), "batch rejected, reverting");
        self.state.revert_uncommitted();
        self.staged.clear();
        self.pending_root = None;
    }

    fn commit(&mut self, ledger_id: LedgerId, state_root: &StateRoot) -> Result<Vec<Txn>, NodeError> {
        let actual = self.state.uncommitted_root();
        if actual != *state_root {
            self.state.revert_uncommitted();
            self.staged.clear();
            self.pending_root = None;
            return Err(NodeError::Ledger(LedgerError::DigestMismatch {
                ledger: ledger_id,
                expected: *state_root,
                actual,
            }));
        }
        self.state.commit();
        self.pending_root = None;

        let staged = std::mem::take(&mut self.staged);
        let mut committed = Vec::with_capacity(staged.len());
        let mut ledger = write_ledger(&self.ledger)?;
        for mut txn in staged {
            let seq_no = ledger.append(txn.clone()).map_err(NodeError::Ledger)?;
            txn.seq_no = Some(seq_no);
            committed.push(txn);
        }
        tracing::debug!(ledger = %ledger_id, txns = committed.len(), "batch committed");
        Ok(committed)
    }

    /// Replay the full ledger into a fresh projection, committing as one
    /// unit. Used after catch-up to rebuild derived state.
    fn replay<F>(&mut self, mut project: F) -> Result<(), NodeError>
    where
        F: FnMut(&mut dyn StateProjection, &Txn) -> Result<(), NodeError>,
    {
        let txns = read_ledger(&self.ledger)?.get_all_txns();
        for txn in &txns {
            project(self.state.as_mut(), txn)?;
        }
        self.state.commit();
        Ok(())
    }

    fn batch_is_appended(&self, requests: &[Request]) -> Result<bool, NodeError> {
        if requests.is_empty() {
            return Ok(false);
        }
        let ledger = read_ledger(&self.ledger)?;
        let size = ledger.size();
        if size < requests.len() {
            return Ok(false);
        }
        let tail = ledger.txns_from((size - requests.len() + 1) as u64);
        Ok(tail.len() == requests.len()
            && tail
                .iter()
                .zip(requests)
                .all(|(txn, req)| txn.identifier == req.identifier && txn.req_id == req.req_id))
    }

    fn query_txns_from(&self, req: &Request) -> Result<Value, NodeError> {
        let from = req.operation.get_u64("seqNo").unwrap_or(1);
        let txns = read_ledger(&self.ledger)?.txns_from(from);
        serde_json::to_value(txns).map_err(|e| NodeError::InvalidRequest(e.to_string()))
    }
}

fn require_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, NodeError> {
    req.operation.get_str(key).ok_or_else(|| {
        NodeError::InvalidRequest(format!(
            "{} request is missing field '{key}'",
            req.operation.txn_type
        ))
    })
}

// ── Pool ───────────────────────────────────────────────────────────────

/// Handles Pool ledger writes: `NODE` membership records.
pub struct PoolReqHandler {
    core: HandlerCore,
}

impl PoolReqHandler {
    pub fn new(ledger: SharedLedger, state: Box<dyn StateProjection>) -> Self {
        Self {
            core: HandlerCore::new(ledger, state),
        }
    }

    fn project(state: &mut dyn StateProjection, txn: &Txn) {
        if txn.txn_type != TxnType::Node {
            return;
        }
        if let (Some(alias), Some(verkey)) = (txn.get_str(keys::ALIAS), txn.get_str(keys::VERKEY)) {
            state.set(format!("node:{alias}").as_bytes(), verkey.as_bytes());
        }
    }
}

impl RequestHandler for PoolReqHandler {
    fn ledger_id(&self) -> LedgerId {
        LedgerId::Pool
    }

    fn init_from_ledger(&mut self) -> Result<(), NodeError> {
        self.core.replay(|state, txn| {
            Self::project(state, txn);
            Ok(())
        })
    }

    fn validate(&self, req: &Request) -> Result<(), NodeError> {
        if req.operation.txn_type != TxnType::Node {
            return Err(NodeError::InvalidRequest(format!(
                "{} does not belong on the pool ledger",
                req.operation.txn_type
            )));
        }
        require_str(req, keys::ALIAS)?;
        require_str(req, keys::VERKEY)?;
        Ok(())
    }

    fn apply(&mut self, req: &Request, txn_time: Timestamp) -> Result<(), NodeError> {
        self.validate(req)?;
        let txn = Txn::from_request(req);
        Self::project(self.core.state.as_mut(), &txn);
        self.core.stage(txn, txn_time);
        Ok(())
    }

    fn on_batch_created(&mut self, state_root: StateRoot) {
        self.core.on_batch_created(state_root);
    }

    fn on_batch_rejected(&mut self) {
        self.core.reject(LedgerId::Pool);
    }

    fn commit(&mut self, state_root: &StateRoot) -> Result<Vec<Txn>, NodeError> {
        self.core.commit(LedgerId::Pool, state_root)
    }

    fn committed_root(&self) -> StateRoot {
        self.core.state.committed_root()
    }

    fn uncommitted_root(&self) -> StateRoot {
        self.core.state.uncommitted_root()
    }

    fn ledger_root(&self) -> Result<LedgerRoot, NodeError> {
        Ok(read_ledger(&self.core.ledger)?.root())
    }

    fn ledger_size(&self) -> Result<usize, NodeError> {
        Ok(read_ledger(&self.core.ledger)?.size())
    }

    fn has_staged(&self) -> bool {
        !self.core.staged.is_empty() || self.core.state.has_uncommitted()
    }

    fn batch_is_appended(&self, requests: &[Request]) -> Result<bool, NodeError> {
        self.core.batch_is_appended(requests)
    }

    fn query(&self, req: &Request) -> Result<Value, NodeError> {
        match req.operation.txn_type {
            TxnType::GetTxns => self.core.query_txns_from(req),
            other => Err(NodeError::InvalidRequest(format!(
                "{other} is not a pool ledger query"
            ))),
        }
    }
}

// ── Config ─────────────────────────────────────────────────────────────

/// Handles Config ledger governance writes: `POOL_UPGRADE`, `POOL_CONFIG`.
pub struct ConfigReqHandler {
    core: HandlerCore,
}

impl ConfigReqHandler {
    pub fn new(ledger: SharedLedger, state: Box<dyn StateProjection>) -> Self {
        Self {
            core: HandlerCore::new(ledger, state),
        }
    }

    fn project(state: &mut dyn StateProjection, txn: &Txn) {
        match txn.txn_type {
            TxnType::PoolConfig => {
                if let Some(writes) = txn.data.get(keys::WRITES).and_then(Value::as_bool) {
                    state.set(b"config:writes", if writes { b"1" } else { b"0" });
                }
            }
            TxnType::PoolUpgrade => {
                if let (Some(action), Some(version)) =
                    (txn.get_str(keys::ACTION), txn.get_str(keys::VERSION))
                {
                    state.set(format!("upgrade:{version}").as_bytes(), action.as_bytes());
                }
            }
            _ => {}
        }
    }

    fn validate_op(req: &Request) -> Result<(), NodeError> {
        match req.operation.txn_type {
            TxnType::PoolConfig => {
                req.operation.get_bool(keys::WRITES).ok_or_else(|| {
                    NodeError::InvalidRequest("POOL_CONFIG requires a boolean 'writes'".to_string())
                })?;
                Ok(())
            }
            TxnType::PoolUpgrade => {
                let action = require_str(req, keys::ACTION)?;
                require_str(req, keys::VERSION)?;
                match action {
                    keys::START => {
                        if !req
                            .operation
                            .data
                            .get(keys::SCHEDULE)
                            .is_some_and(Value::is_object)
                        {
                            return Err(NodeError::InvalidRequest(
                                "POOL_UPGRADE start requires a schedule object".to_string(),
                            ));
                        }
                        Ok(())
                    }
                    keys::CANCEL => Ok(()),
                    other => Err(NodeError::InvalidRequest(format!(
                        "unknown POOL_UPGRADE action '{other}'"
                    ))),
                }
            }
            other => Err(NodeError::InvalidRequest(format!(
                "{other} does not belong on the config ledger"
            ))),
        }
    }
}

impl RequestHandler for ConfigReqHandler {
    fn ledger_id(&self) -> LedgerId {
        LedgerId::Config
    }

    fn init_from_ledger(&mut self) -> Result<(), NodeError> {
        self.core.replay(|state, txn| {
            Self::project(state, txn);
            Ok(())
        })
    }

    fn validate(&self, req: &Request) -> Result<(), NodeError> {
        Self::validate_op(req)
    }

    fn apply(&mut self, req: &Request, txn_time: Timestamp) -> Result<(), NodeError> {
        self.validate(req)?;
        let txn = Txn::from_request(req);
        Self::project(self.core.state.as_mut(), &txn);
        self.core.stage(txn, txn_time);
        Ok(())
    }

    fn on_batch_created(&mut self, state_root: StateRoot) {
        self.core.on_batch_created(state_root);
    }

    fn on_batch_rejected(&mut self) {
        self.core.reject(LedgerId::Config);
    }

    fn commit(&mut self, state_root: &StateRoot) -> Result<Vec<Txn>, NodeError> {
        self.core.commit(LedgerId::Config, state_root)
    }

    fn committed_root(&self) -> StateRoot {
        self.core.state.committed_root()
    }

    fn uncommitted_root(&self) -> StateRoot {
        self.core.state.uncommitted_root()
    }

    fn ledger_root(&self) -> Result<LedgerRoot, NodeError> {
        Ok(read_ledger(&self.core.ledger)?.root())
    }

    fn ledger_size(&self) -> Result<usize, NodeError> {
        Ok(read_ledger(&self.core.ledger)?.size())
    }

    fn has_staged(&self) -> bool {
        !self.core.staged.is_empty() || self.core.state.has_uncommitted()
    }

    fn batch_is_appended(&self, requests: &[Request]) -> Result<bool, NodeError> {
        self.core.batch_is_appended(requests)
    }

    fn query(&self, req: &Request) -> Result<Value, NodeError> {
        match req.operation.txn_type {
            TxnType::GetTxns => self.core.query_txns_from(req),
            other => Err(NodeError::InvalidRequest(format!(
                "{other} is not a config ledger query"
            ))),
        }
    }

    /// Forced governance requests skip consensus batching entirely: validate,
    /// apply, commit as a single-transaction unit against our own computed
    /// root.
    fn apply_forced(&mut self, req: &Request, now: Timestamp) -> Result<Vec<Txn>, NodeError> {
        if !req.is_forced() {
            return Err(NodeError::InvalidRequest(
                "request is not marked as forced".to_string(),
            ));
        }
        self.apply(req, now)?;
        let root = self.core.state.uncommitted_root();
        let committed = self.core.commit(LedgerId::Config, &root)?;
        tracing::info!(
            txn_type = %req.operation.txn_type,
            "forced governance request applied outside consensus batching"
        );
        Ok(committed)
    }
}

// ── Domain ─────────────────────────────────────────────────────────────

/// Handles Domain ledger writes (`NYM`, `ATTRIB`) and queries. Attribute
/// payloads are externalized into the [`AttributeStore`]; the ledger carries
/// only the digest.
pub struct DomainReqHandler {
    core: HandlerCore,
    attr_store: Arc<AttributeStore>,
}

impl DomainReqHandler {
    pub fn new(
        ledger: SharedLedger,
        state: Box<dyn StateProjection>,
        attr_store: Arc<AttributeStore>,
    ) -> Self {
        Self {
            core: HandlerCore::new(ledger, state),
            attr_store,
        }
    }

    fn project(state: &mut dyn StateProjection, txn: &Txn) {
        match txn.txn_type {
            TxnType::Nym => {
                if let Some(dest) = txn.get_str(keys::DEST) {
                    let verkey = txn.get_str(keys::VERKEY).unwrap_or_default();
                    state.set(format!("nym:{dest}").as_bytes(), verkey.as_bytes());
                }
            }
            TxnType::Attrib => {
                // By this point raw/enc carry the digest, not the value.
                if let Some(dest) = txn.get_str(keys::DEST) {
                    for kind in [keys::RAW, keys::ENC] {
                        if let Some(digest_hex) = txn.get_str(kind) {
                            state.set(
                                format!("attr:{dest}:{kind}").as_bytes(),
                                digest_hex.as_bytes(),
                            );
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Move the attribute value out of the transaction and into the
    /// secondary store, leaving the digest behind.
    fn externalize_attr(&self, txn: &mut Txn) -> Result<(), NodeError> {
        for kind in [keys::RAW, keys::ENC] {
            let Some(value) = txn.get_str(kind).map(str::to_string) else {
                continue;
            };
            let digest = self.attr_store.put(&value)?;
            txn.set_field(kind, json!(digest.to_hex()));
            tracing::debug!(digest = %digest, kind, "attribute value externalized");
        }
        Ok(())
    }
}

impl RequestHandler for DomainReqHandler {
    fn ledger_id(&self) -> LedgerId {
        LedgerId::Domain
    }

    fn init_from_ledger(&mut self) -> Result<(), NodeError> {
        self.core.replay(|state, txn| {
            Self::project(state, txn);
            Ok(())
        })
    }

    fn validate(&self, req: &Request) -> Result<(), NodeError> {
        match req.operation.txn_type {
            TxnType::Nym => {
                require_str(req, keys::DEST)?;
                Ok(())
            }
            TxnType::Attrib => {
                require_str(req, keys::DEST)?;
                let has_raw = req.operation.get_str(keys::RAW).is_some();
                let has_enc = req.operation.get_str(keys::ENC).is_some();
                if has_raw == has_enc {
                    return Err(NodeError::InvalidRequest(
                        "ATTRIB requires exactly one of 'raw' or 'enc'".to_string(),
                    ));
                }
                Ok(())
            }
            other => Err(NodeError::InvalidRequest(format!(
                "{other} does not belong on the domain ledger"
            ))),
        }
    }

    fn apply(&mut self, req: &Request, txn_time: Timestamp) -> Result<(), NodeError> {
        self.validate(req)?;
        let mut txn = Txn::from_request(req);
        if txn.txn_type == TxnType::Attrib {
            self.externalize_attr(&mut txn)?;
        }
        Self::project(self.core.state.as_mut(), &txn);
        self.core.stage(txn, txn_time);
        Ok(())
    }

    fn on_batch_created(&mut self, state_root: StateRoot) {
        self.core.on_batch_created(state_root);
    }

    fn on_batch_rejected(&mut self) {
        self.core.reject(LedgerId::Domain);
    }

    fn commit(&mut self, state_root: &StateRoot) -> Result<Vec<Txn>, NodeError> {
        self.core.commit(LedgerId::Domain, state_root)
    }

    fn committed_root(&self) -> StateRoot {
        self.core.state.committed_root()
    }

    fn uncommitted_root(&self) -> StateRoot {
        self.core.state.uncommitted_root()
    }

    fn ledger_root(&self) -> Result<LedgerRoot, NodeError> {
        Ok(read_ledger(&self.core.ledger)?.root())
    }

    fn ledger_size(&self) -> Result<usize, NodeError> {
        Ok(read_ledger(&self.core.ledger)?.size())
    }

    fn has_staged(&self) -> bool {
        !self.core.staged.is_empty() || self.core.state.has_uncommitted()
    }

    fn batch_is_appended(&self, requests: &[Request]) -> Result<bool, NodeError> {
        self.core.batch_is_appended(requests)
    }

    fn query(&self, req: &Request) -> Result<Value, NodeError> {
        match req.operation.txn_type {
            TxnType::GetNym => {
                let dest = require_str(req, keys::DEST)?;
                let verkey = self
                    .core
                    .state
                    .get(format!("nym:{dest}").as_bytes())
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
                Ok(json!({ keys::DEST: dest, keys::VERKEY: verkey }))
            }
            TxnType::GetAttr => {
                let dest = require_str(req, keys::DEST)?;
                let kind = if req.operation.get_str(keys::ENC).is_some() {
                    keys::ENC
                } else {
                    keys::RAW
                };
                let Some(digest_hex) = self
                    .core
                    .state
                    .get(format!("attr:{dest}:{kind}").as_bytes())
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                else {
                    return Ok(json!({ keys::DEST: dest, kind: Value::Null }));
                };
                // The ledger knows this digest; a store miss here is real
                // data loss and must not be papered over.
                let digest = AttrHash::from_hex(&digest_hex)
                    .map_err(|e| NodeError::InvalidRequest(e.to_string()))?;
                let value = self.attr_store.get(&digest).map_err(|e| match e {
                    StoreError::NotFound(hex) => {
                        tracing::error!(digest = %hex, dest, "attribute value missing from store");
                        NodeError::Store(StoreError::NotFound(hex))
                    }
                    other => NodeError::Store(other),
                })?;
                Ok(json!({ keys::DEST: dest, kind: value }))
            }
            TxnType::GetTxns => self.core.query_txns_from(req),
            other => Err(NodeError::InvalidRequest(format!(
                "{other} is not a domain ledger query"
            ))),
        }
    }
}

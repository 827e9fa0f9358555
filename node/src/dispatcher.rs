//! Routing of consensus-ordered batches to the owning request handler.
//!
//! A batch targets exactly one ledger; the dispatcher applies its requests
//! in order through that ledger's handler and commits against the roots
//! consensus agreed on. Re-delivery of an already-committed batch is
//! recognized by its request keys sitting at the ledger tail and skipped,
//! so the view-change replay path cannot double-apply.

use std::sync::Arc;

use serde_json::Value;

use plinth_messages::{Request, Txn};
use plinth_store::AttributeStore;
use plinth_types::{LedgerId, LedgerRoot, StateRoot, Timestamp, TxnType};

use crate::attributes::update_txn_with_extra_data;
use crate::req_handler::RequestHandler;
use crate::NodeError;

/// Owns the three ledger handlers and routes batches, queries, and forced
/// governance requests to them. One handler per ledger, fixed at
/// construction, so routing can never miss.
pub struct BatchDispatcher {
    pool: Box<dyn RequestHandler>,
    config: Box<dyn RequestHandler>,
    domain: Box<dyn RequestHandler>,
    attr_store: Arc<AttributeStore>,
}

impl BatchDispatcher {
    pub fn new(
        pool: Box<dyn RequestHandler>,
        config: Box<dyn RequestHandler>,
        domain: Box<dyn RequestHandler>,
        attr_store: Arc<AttributeStore>,
    ) -> Self {
        Self {
            pool,
            config,
            domain,
            attr_store,
        }
    }

    pub fn handler(&self, id: LedgerId) -> &dyn RequestHandler {
        match id {
            LedgerId::Pool => self.pool.as_ref(),
            LedgerId::Config => self.config.as_ref(),
            LedgerId::Domain => self.domain.as_ref(),
        }
    }

    fn handler_mut(&mut self, id: LedgerId) -> &mut dyn RequestHandler {
        match id {
            LedgerId::Pool => self.pool.as_mut(),
            LedgerId::Config => self.config.as_mut(),
            LedgerId::Domain => self.domain.as_mut(),
        }
    }

    /// Static validation, routed to the ledger the request targets.
    pub fn validate(&self, req: &Request) -> Result<(), NodeError> {
        if req.is_query() {
            return Ok(());
        }
        let Some(ledger) = req.operation.txn_type.target_ledger() else {
            return Err(NodeError::InvalidRequest(format!(
                "{} is not a ledger write",
                req.operation.txn_type
            )));
        };
        self.handler(ledger).validate(req)
    }

    /// Rebuild one ledger's projection after catch-up.
    pub fn init_handler(&mut self, ledger: LedgerId) -> Result<(), NodeError> {
        self.handler_mut(ledger).init_from_ledger()
    }

    pub fn on_batch_created(&mut self, ledger: LedgerId, state_root: StateRoot) {
        self.handler_mut(ledger).on_batch_created(state_root);
    }

    pub fn on_batch_rejected(&mut self, ledger: LedgerId) {
        self.handler_mut(ledger).on_batch_rejected();
    }

    /// Apply and commit one ordered batch.
    ///
    /// `state_root` is the post-batch projection root consensus agreed on;
    /// `txn_root`, when present, is the expected post-batch ledger root and
    /// is verified after the append. Requests are applied strictly in batch
    /// order. Returns the committed transactions with attribute payloads
    /// rehydrated for replies.
    pub fn execute(
        &mut self,
        ledger: LedgerId,
        batch_time: Timestamp,
        requests: &[Request],
        state_root: &StateRoot,
        txn_root: Option<&LedgerRoot>,
    ) -> Result<Vec<Txn>, NodeError> {
        let attr_store = self.attr_store.clone();
        let handler = self.handler_mut(ledger);

        // Re-delivered batch: the committed root matches the target AND this
        // exact batch (by request keys) is already the ledger tail. Root
        // equality alone is not enough: a fresh batch whose writes are state
        // no-ops lands on the committed root but still has to be appended.
        if handler.committed_root() == *state_root
            && !handler.has_staged()
            && handler.batch_is_appended(requests)?
        {
            tracing::debug!(ledger = %ledger, root = %state_root, "batch already applied, skipping");
            return Ok(Vec::new());
        }

        for req in requests {
            handler.apply(req, batch_time)?;
        }
        let mut committed = handler.commit(state_root)?;

        if let Some(expected) = txn_root {
            let actual = handler.ledger_root()?;
            if actual != *expected {
                // The append already happened; the ledger itself diverged
                // from the pool. Nothing local can repair this.
                return Err(NodeError::Ledger(
                    plinth_ledger::LedgerError::RootDivergence {
                        ledger,
                        expected: *expected,
                        actual,
                    },
                ));
            }
        }

        for txn in &mut committed {
            update_txn_with_extra_data(txn, &attr_store)?;
        }
        Ok(committed)
    }

    /// Forced governance requests go straight to the Config handler.
    pub fn apply_forced(&mut self, req: &Request, now: Timestamp) -> Result<Vec<Txn>, NodeError> {
        let mut committed = self.config.apply_forced(req, now)?;
        for txn in &mut committed {
            update_txn_with_extra_data(txn, &self.attr_store)?;
        }
        Ok(committed)
    }

    /// Answer a read-only query, routed by query type (and for `GET_TXNS`,
    /// by the `ledgerId` field).
    pub fn query(&self, req: &Request) -> Result<Value, NodeError> {
        match req.operation.txn_type {
            TxnType::GetNym | TxnType::GetAttr => self.domain.query(req),
            TxnType::GetTxns => {
                let ledger = match req.operation.get_str("ledgerId") {
                    None | Some("domain") => LedgerId::Domain,
                    Some("pool") => LedgerId::Pool,
                    Some("config") => LedgerId::Config,
                    Some(other) => {
                        return Err(NodeError::InvalidRequest(format!(
                            "unknown ledgerId '{other}'"
                        )))
                    }
                };
                self.handler(ledger).query(req)
            }
            other => Err(NodeError::InvalidRequest(format!("{other} is not a query"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::req_handler::{
        shared_ledger, ConfigReqHandler, DomainReqHandler, PoolReqHandler, SharedLedger,
    };
    use plinth_ledger::{Ledger, MemoryLedger, MemoryProjection};
    use plinth_messages::{keys, Operation};
    use plinth_store::MemoryKv;
    use plinth_types::Identifier;
    use serde_json::json;

    struct Fixture {
        dispatcher: BatchDispatcher,
        domain_ledger: SharedLedger,
    }

    fn fixture() -> Fixture {
        let attr_store = Arc::new(AttributeStore::new(Arc::new(MemoryKv::new())));
        let pool_ledger = shared_ledger(MemoryLedger::new(LedgerId::Pool));
        let config_ledger = shared_ledger(MemoryLedger::new(LedgerId::Config));
        let domain_ledger = shared_ledger(MemoryLedger::new(LedgerId::Domain));
        let dispatcher = BatchDispatcher::new(
            Box::new(PoolReqHandler::new(
                pool_ledger,
                Box::new(MemoryProjection::new()),
            )),
            Box::new(ConfigReqHandler::new(
                config_ledger,
                Box::new(MemoryProjection::new()),
            )),
            Box::new(DomainReqHandler::new(
                domain_ledger.clone(),
                Box::new(MemoryProjection::new()),
                attr_store.clone(),
            )),
            attr_store,
        );
        Fixture {
            dispatcher,
            domain_ledger,
        }
    }

    fn nym(req_id: u64, dest: &str) -> Request {
        Request {
            operation: Operation::new(TxnType::Nym)
                .with_field(keys::DEST, json!(dest))
                .with_field(keys::VERKEY, json!(format!("vk-{dest}"))),
            identifier: Identifier::new("did:sample:author"),
            req_id,
            protocol_version: Some(2),
            signature: None,
        }
    }

    /// Compute the state root the batch should land on by dry-running it on
    /// an identical handler.
    fn expected_root(requests: &[Request]) -> StateRoot {
        let mut shadow = DomainReqHandler::new(
            shared_ledger(MemoryLedger::new(LedgerId::Domain)),
            Box::new(MemoryProjection::new()),
            Arc::new(AttributeStore::new(Arc::new(MemoryKv::new()))),
        );
        for req in requests {
            shadow.apply(req, Timestamp::new(1000)).unwrap();
        }
        shadow.uncommitted_root()
    }

    #[test]
    fn batch_applies_in_order_and_commits() {
        let mut fx = fixture();
        let batch = vec![nym(1, "did:sample:a"), nym(2, "did:sample:b")];
        let root = expected_root(&batch);

        let committed = fx
            .dispatcher
            .execute(LedgerId::Domain, Timestamp::new(1000), &batch, &root, None)
            .unwrap();
        assert_eq!(committed.len(), 2);
        assert_eq!(committed[0].seq_no, Some(1));
        assert_eq!(committed[1].seq_no, Some(2));
        assert_eq!(fx.domain_ledger.read().unwrap().size(), 2);
    }

    #[test]
    fn redelivered_batch_is_skipped() {
        let mut fx = fixture();
        let batch = vec![nym(1, "did:sample:a")];
        let root = expected_root(&batch);

        let first = fx
            .dispatcher
            .execute(LedgerId::Domain, Timestamp::new(1000), &batch, &root, None)
            .unwrap();
        assert_eq!(first.len(), 1);

        let second = fx
            .dispatcher
            .execute(LedgerId::Domain, Timestamp::new(1000), &batch, &root, None)
            .unwrap();
        assert!(second.is_empty());
        assert_eq!(fx.domain_ledger.read().unwrap().size(), 1);
    }

    #[test]
    fn noop_write_batch_is_still_appended() {
        let mut fx = fixture();
        let first = vec![nym(1, "did:sample:a")];
        let root = expected_root(&first);
        fx.dispatcher
            .execute(LedgerId::Domain, Timestamp::new(1000), &first, &root, None)
            .unwrap();

        // A new request re-asserting the same dest and verkey: its post-batch
        // state root equals the committed root, but it was never ordered
        // before, so it must append and produce a reply.
        let reassert = vec![nym(2, "did:sample:a")];
        let committed = fx
            .dispatcher
            .execute(LedgerId::Domain, Timestamp::new(1001), &reassert, &root, None)
            .unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].seq_no, Some(2));
        assert_eq!(fx.domain_ledger.read().unwrap().size(), 2);
    }

    #[test]
    fn redelivery_after_restart_is_skipped() {
        let mut fx = fixture();
        let batch = vec![nym(1, "did:sample:a")];
        let root = expected_root(&batch);
        fx.dispatcher
            .execute(LedgerId::Domain, Timestamp::new(1000), &batch, &root, None)
            .unwrap();

        // A fresh handler over the same ledger, as after a process restart.
        let attr_store = Arc::new(AttributeStore::new(Arc::new(MemoryKv::new())));
        let mut restarted = DomainReqHandler::new(
            fx.domain_ledger.clone(),
            Box::new(MemoryProjection::new()),
            attr_store.clone(),
        );
        restarted.init_from_ledger().unwrap();
        let mut dispatcher = BatchDispatcher::new(
            Box::new(PoolReqHandler::new(
                shared_ledger(MemoryLedger::new(LedgerId::Pool)),
                Box::new(MemoryProjection::new()),
            )),
            Box::new(ConfigReqHandler::new(
                shared_ledger(MemoryLedger::new(LedgerId::Config)),
                Box::new(MemoryProjection::new()),
            )),
            Box::new(restarted),
            attr_store,
        );

        let replayed = dispatcher
            .execute(LedgerId::Domain, Timestamp::new(1000), &batch, &root, None)
            .unwrap();
        assert!(replayed.is_empty());
        assert_eq!(fx.domain_ledger.read().unwrap().size(), 1);
    }

    #[test]
    fn txn_root_divergence_is_a_distinct_fatal_error() {
        let mut fx = fixture();
        let batch = vec![nym(1, "did:sample:a")];
        let root = expected_root(&batch);
        let bogus_txn_root = LedgerRoot::ZERO;

        let err = fx
            .dispatcher
            .execute(
                LedgerId::Domain,
                Timestamp::new(1000),
                &batch,
                &root,
                Some(&bogus_txn_root),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            NodeError::Ledger(plinth_ledger::LedgerError::RootDivergence {
                ledger: LedgerId::Domain,
                ..
            })
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn rejected_batch_leaves_no_trace() {
        let mut fx = fixture();
        let batch = vec![nym(1, "did:sample:a")];
        let bogus = StateRoot::ZERO;

        let err = fx
            .dispatcher
            .execute(LedgerId::Domain, Timestamp::new(1000), &batch, &bogus, None)
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(fx.domain_ledger.read().unwrap().size(), 0);

        // The handler is clean: the correct batch can still go through.
        let root = expected_root(&batch);
        fx.dispatcher
            .execute(LedgerId::Domain, Timestamp::new(1000), &batch, &root, None)
            .unwrap();
    }

    #[test]
    fn query_routes_get_txns_by_ledger_id() {
        let mut fx = fixture();
        let batch = vec![nym(1, "did:sample:a")];
        let root = expected_root(&batch);
        fx.dispatcher
            .execute(LedgerId::Domain, Timestamp::new(1000), &batch, &root, None)
            .unwrap();

        let req = Request {
            operation: Operation::new(TxnType::GetTxns)
                .with_field("ledgerId", json!("domain"))
                .with_field("seqNo", json!(1)),
            identifier: Identifier::new("did:sample:reader"),
            req_id: 50,
            protocol_version: Some(2),
            signature: None,
        };
        let reply = fx.dispatcher.query(&req).unwrap();
        assert_eq!(reply.as_array().unwrap().len(), 1);

        let empty = Request {
            operation: Operation::new(TxnType::GetTxns).with_field("ledgerId", json!("pool")),
            ..req
        };
        assert!(fx.dispatcher.query(&empty).unwrap().as_array().unwrap().is_empty());
    }

    #[test]
    fn validate_routes_to_target_ledger() {
        let fx = fixture();
        assert!(fx.dispatcher.validate(&nym(1, "did:sample:a")).is_ok());

        let bad = Request {
            operation: Operation::new(TxnType::Attrib).with_field(keys::DEST, json!("x")),
            identifier: Identifier::new("did:sample:author"),
            req_id: 2,
            protocol_version: Some(2),
            signature: None,
        };
        // ATTRIB without raw or enc fails domain validation.
        assert!(fx.dispatcher.validate(&bad).is_err());
    }
}

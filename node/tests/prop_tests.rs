use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use plinth_ledger::{Ledger, MemoryLedger, MemoryProjection};
use plinth_messages::{keys, Operation, Request};
use plinth_node::{
    shared_ledger, BatchDispatcher, ConfigReqHandler, DomainReqHandler, PoolReqHandler,
    RequestHandler, SharedLedger,
};
use plinth_store::{AttributeStore, MemoryKv};
use plinth_types::{Identifier, LedgerId, StateRoot, Timestamp, TxnType};

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

fn domain_dispatcher() -> (BatchDispatcher, SharedLedger) {
    let attr_store = Arc::new(AttributeStore::new(Arc::new(MemoryKv::new())));
    let domain_ledger = shared_ledger(MemoryLedger::new(LedgerId::Domain));
    let dispatcher = BatchDispatcher::new(
        Box::new(PoolReqHandler::new(
            shared_ledger(MemoryLedger::new(LedgerId::Pool)),
            Box::new(MemoryProjection::new()),
        )),
        Box::new(ConfigReqHandler::new(
            shared_ledger(MemoryLedger::new(LedgerId::Config)),
            Box::new(MemoryProjection::new()),
        )),
        Box::new(DomainReqHandler::new(
            domain_ledger.clone(),
            Box::new(MemoryProjection::new()),
            attr_store.clone(),
        )),
        attr_store,
    );
    (dispatcher, domain_ledger)
}

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

proptest! {
    /// Re-delivering a committed batch is a no-op: ledger size and root are
    /// unchanged and no replies are produced.
    #[test]
    fn redelivery_is_idempotent(dests in prop::collection::vec("[a-z]{1,8}", 1..5)) {
        let (mut dispatcher, ledger) = domain_dispatcher();
        let batch: Vec<Request> = dests
            .iter()
            .enumerate()
            .map(|(i, d)| nym(i as u64 + 1, &format!("did:sample:{d}")))
            .collect();
        let root = expected_root(&batch);
        dispatcher
            .execute(LedgerId::Domain, Timestamp::new(1000), &batch, &root, None)
            .unwrap();
        let size = ledger.read().unwrap().size();
        let ledger_root = ledger.read().unwrap().root();

        let replayed = dispatcher
            .execute(LedgerId::Domain, Timestamp::new(1000), &batch, &root, None)
            .unwrap();
        prop_assert!(replayed.is_empty());
        prop_assert_eq!(ledger.read().unwrap().size(), size);
        prop_assert_eq!(ledger.read().unwrap().root(), ledger_root);
    }

    /// A fresh batch re-asserting already-committed state leaves the
    /// projection root unchanged but still appends to the ledger.
    #[test]
    fn reasserted_writes_always_append(suffix in "[a-z]{1,8}") {
        let (mut dispatcher, ledger) = domain_dispatcher();
        let dest = format!("did:sample:{suffix}");
        let first = vec![nym(1, &dest)];
        let root = expected_root(&first);
        dispatcher
            .execute(LedgerId::Domain, Timestamp::new(1000), &first, &root, None)
            .unwrap();

        let reassert = vec![nym(2, &dest)];
        let committed = dispatcher
            .execute(LedgerId::Domain, Timestamp::new(1001), &reassert, &root, None)
            .unwrap();
        prop_assert_eq!(committed.len(), 1);
        prop_assert_eq!(ledger.read().unwrap().size(), 2);
    }
}

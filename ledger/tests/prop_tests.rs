use proptest::prelude::*;
use serde_json::Map;

use plinth_ledger::{Ledger, MemoryLedger, MemoryProjection, StateProjection};
use plinth_messages::Txn;
use plinth_types::{Identifier, LedgerId, TxnType};

fn txn(req_id: u64) -> Txn {
    Txn {
        txn_type: TxnType::Nym,
        identifier: Identifier::new("did:sample:author"),
        req_id,
        seq_no: None,
        txn_time: None,
        data: Map::new(),
    }
}

proptest! {
    /// Ledger roots are a pure function of history: two ledgers fed the same
    /// transaction sequence always agree.
    #[test]
    fn ledger_root_is_deterministic(ids in prop::collection::vec(0u64..1000, 0..20)) {
        let mut a = MemoryLedger::new(LedgerId::Domain);
        let mut b = MemoryLedger::new(LedgerId::Domain);
        for id in &ids {
            a.append(txn(*id)).unwrap();
            b.append(txn(*id)).unwrap();
        }
        prop_assert_eq!(a.root(), b.root());
        prop_assert_eq!(a.size(), ids.len());
    }

    /// Diverging histories diverge in root.
    #[test]
    fn ledger_root_reflects_divergence(shared in 0u64..1000, a_only in 0u64..1000, b_only in 0u64..1000) {
        prop_assume!(a_only != b_only);
        let mut a = MemoryLedger::new(LedgerId::Config);
        let mut b = MemoryLedger::new(LedgerId::Config);
        a.append(txn(shared)).unwrap();
        b.append(txn(shared)).unwrap();
        a.append(txn(a_only)).unwrap();
        b.append(txn(b_only)).unwrap();
        prop_assert_ne!(a.root(), b.root());
    }

    /// Projection commit/revert: revert restores the committed root; commit
    /// realises the uncommitted root.
    #[test]
    fn projection_commit_revert_roots(
        committed in prop::collection::btree_map(".{1,8}", ".{0,8}", 0..8),
        staged in prop::collection::btree_map(".{1,8}", ".{0,8}", 1..8),
    ) {
        let mut state = MemoryProjection::new();
        for (k, v) in &committed {
            state.set(k.as_bytes(), v.as_bytes());
        }
        state.commit();
        let base = state.committed_root();

        for (k, v) in &staged {
            state.set(k.as_bytes(), v.as_bytes());
        }
        let pending = state.uncommitted_root();
        state.revert_uncommitted();
        prop_assert_eq!(state.committed_root(), base);

        for (k, v) in &staged {
            state.set(k.as_bytes(), v.as_bytes());
        }
        prop_assert_eq!(state.uncommitted_root(), pending);
        state.commit();
        prop_assert_eq!(state.committed_root(), pending);
    }
}

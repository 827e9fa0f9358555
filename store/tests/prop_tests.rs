use std::sync::Arc;

use proptest::prelude::*;

use plinth_store::attribute::attr_digest;
use plinth_store::{AttributeStore, MemoryKv};

proptest! {
    /// For any attribute value v, get(digest(v)) after put(v) returns v
    /// exactly.
    #[test]
    fn attribute_round_trip_is_exact(value in ".{0,256}") {
        let store = AttributeStore::new(Arc::new(MemoryKv::new()));
        let hash = store.put(&value).unwrap();
        prop_assert_eq!(hash, attr_digest(&value));
        prop_assert_eq!(store.get(&hash).unwrap(), value);
    }

    /// An unknown digest signals a distinguishable miss, never a default
    /// value.
    #[test]
    fn unknown_digest_never_yields_a_value(stored in ".{1,64}", probed in ".{1,64}") {
        prop_assume!(stored != probed);
        let store = AttributeStore::new(Arc::new(MemoryKv::new()));
        store.put(&stored).unwrap();
        let err = store.get(&attr_digest(&probed)).unwrap_err();
        prop_assert!(err.is_not_found());
    }
}

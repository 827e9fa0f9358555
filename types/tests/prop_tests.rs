use proptest::prelude::*;

use plinth_types::{AttrHash, LedgerRoot, StateRoot, Timestamp};

proptest! {
    /// AttrHash hex round trip: new -> to_hex -> from_hex is identity.
    #[test]
    fn attr_hash_hex_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let h = AttrHash::new(bytes);
        prop_assert_eq!(AttrHash::from_hex(&h.to_hex()).unwrap(), h);
    }

    /// LedgerRoot::is_zero is true only for all-zero bytes.
    #[test]
    fn ledger_root_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        prop_assert_eq!(LedgerRoot::new(bytes).is_zero(), bytes == [0u8; 32]);
    }

    /// StateRoot equality follows byte equality.
    #[test]
    fn state_root_eq_follows_bytes(a in prop::array::uniform32(0u8..), b in prop::array::uniform32(0u8..)) {
        prop_assert_eq!(StateRoot::new(a) == StateRoot::new(b), a == b);
    }

    /// secs_until and is_due agree: secs_until == 0 iff is_due.
    #[test]
    fn timestamp_due_agrees_with_secs_until(at in 0u64..1_000_000, now in 0u64..1_000_000) {
        let t = Timestamp::new(at);
        let n = Timestamp::new(now);
        prop_assert_eq!(t.secs_until(n) == 0, t.is_due(n));
    }
}

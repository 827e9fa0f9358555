use proptest::prelude::*;
use serde_json::json;

use plinth_messages::{
    is_node_upgrade_shape, keys, NodeUpgradeData, Operation, Request, UpgradeAction,
};
use plinth_types::{Identifier, TxnType, Version};

proptest! {
    /// Request envelopes survive a JSON round trip exactly, whatever the
    /// payload fields carry.
    #[test]
    fn request_json_round_trips(
        dest in ".{0,32}",
        req_id in any::<u64>(),
        protocol_version in proptest::option::of(any::<u16>()),
    ) {
        let req = Request {
            operation: Operation::new(TxnType::Nym).with_field(keys::DEST, json!(dest)),
            identifier: Identifier::new("did:sample:author"),
            req_id,
            protocol_version,
            signature: None,
        };
        let value = serde_json::to_value(&req).unwrap();
        let back: Request = serde_json::from_value(value).unwrap();
        prop_assert_eq!(back, req);
    }

    /// The request key is determined by author and reqId alone; the payload
    /// never changes it.
    #[test]
    fn request_key_ignores_the_payload(
        author in "[a-zA-Z0-9:]{1,24}",
        req_id in any::<u64>(),
        dest_a in ".{0,16}",
        dest_b in ".{0,16}",
    ) {
        let make = |dest: &str| Request {
            operation: Operation::new(TxnType::Nym).with_field(keys::DEST, json!(dest)),
            identifier: Identifier::new(author.as_str()),
            req_id,
            protocol_version: Some(2),
            signature: None,
        };
        prop_assert_eq!(make(&dest_a).key(), make(&dest_b).key());
    }

    /// Only NODE_UPGRADE envelopes match the control-message shape; client
    /// traffic never does, whatever identifier and reqId it carries.
    #[test]
    fn control_shape_matches_only_upgrade_envelopes(
        author in "[a-zA-Z0-9]{1,16}",
        req_id in any::<u64>(),
        version in "[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}",
    ) {
        let notice = NodeUpgradeData::new(UpgradeAction::Complete, Version::new(version.as_str()))
            .into_request(Identifier::new(author.as_str()), req_id, "00".repeat(64));
        prop_assert!(is_node_upgrade_shape(&serde_json::to_value(&notice).unwrap()));

        let client = Request {
            operation: Operation::new(TxnType::Nym).with_field(keys::DEST, json!("did:sample:a")),
            identifier: Identifier::new(author.as_str()),
            req_id,
            protocol_version: Some(2),
            signature: None,
        };
        prop_assert!(!is_node_upgrade_shape(&serde_json::to_value(&client).unwrap()));
    }
}

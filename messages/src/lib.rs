//! Wire shapes for Plinth node-to-node and client-to-node traffic.
//!
//! Requests are JSON-shaped: an `operation` object carrying the transaction
//! type plus free-form payload fields, an author `identifier`, and a `reqId`
//! that together form the request key. Peer upgrade acknowledgements reuse
//! the same envelope with a `NODE_UPGRADE` operation.

pub mod keys;
pub mod request;
pub mod status;
pub mod txn;
pub mod upgrade;

pub use request::{is_node_upgrade_shape, Operation, Request, RequestKey};
pub use status::LedgerStatus;
pub use txn::Txn;
pub use upgrade::{NodeUpgradeData, UpgradeAction};

//! Abstract storage for the Plinth node.
//!
//! Every storage backend implements [`KeyValueStore`]; the rest of the
//! codebase depends only on the trait. The crate also provides the two
//! node-owned stores built on top of it: the secondary [`AttributeStore`]
//! (externalized attribute payloads keyed by their on-ledger digest) and the
//! durable [`UpgradeOutcomeStore`] (upgrade attempt facts that must survive
//! process restart).

pub mod attribute;
pub mod error;
pub mod kv;
pub mod outcome;

pub use attribute::{attr_digest, AttributeStore};
pub use error::StoreError;
pub use kv::{KeyValueStore, MemoryKv};
pub use outcome::{FileOutcomeStore, MemoryOutcomeStore, UpgradeOutcomeRecord, UpgradeOutcomeStore};

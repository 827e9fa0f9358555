//! Well-known field names inside operation and transaction payloads.

/// Upgrade action inside a `NODE_UPGRADE` or `POOL_UPGRADE` payload.
pub const ACTION: &str = "action";
/// Target software version.
pub const VERSION: &str = "version";
/// Per-node schedule map (`node id -> unix seconds`) in `POOL_UPGRADE`.
pub const SCHEDULE: &str = "schedule";
/// Write-mode flag in `POOL_CONFIG`.
pub const WRITES: &str = "writes";
/// Forced-application flag on governance operations.
pub const FORCE: &str = "force";

/// Raw attribute payload (externalized; ledger keeps only the digest).
pub const RAW: &str = "raw";
/// Encrypted attribute payload (externalized; ledger keeps only the digest).
pub const ENC: &str = "enc";

/// Subject identifier of a `NYM` or `ATTRIB` operation.
pub const DEST: &str = "dest";
/// Verification key registered by a `NYM` operation.
pub const VERKEY: &str = "verkey";
/// Human-readable alias in a Pool `NODE` record.
pub const ALIAS: &str = "alias";

/// `POOL_UPGRADE` action value: schedule the upgrade.
pub const START: &str = "start";
/// `POOL_UPGRADE` action value: cancel a previously scheduled upgrade.
pub const CANCEL: &str = "cancel";

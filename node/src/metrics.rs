//! Prometheus metrics for the Plinth node.
//!
//! The [`NodeMetrics`] struct owns a dedicated [`Registry`] that an operator
//! endpoint can encode into the Prometheus text exposition format.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Opts, Registry,
};

/// Central collection of node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    /// Total client requests that entered the processing pipeline.
    pub requests_processed: IntCounter,
    /// Total write requests rejected because the pool was read-only.
    pub readonly_rejections: IntCounter,
    /// Total peer control messages dropped for failed authentication.
    pub control_auth_failures: IntCounter,
    /// Total consensus batches committed across all ledgers.
    pub batches_committed: IntCounter,
    /// Total consensus batches rejected (reverted) across all ledgers.
    pub batches_rejected: IntCounter,
    /// Total NODE_UPGRADE announcements broadcast to peers.
    pub upgrade_notices_sent: IntCounter,

    /// Number of ledgers currently in the Synced state.
    pub ledgers_synced: IntGauge,
}

impl NodeMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_processed = register_int_counter_with_registry!(
            Opts::new("plinth_requests_processed_total", "Client requests processed"),
            registry
        )
        .expect("failed to register requests_processed counter");

        let readonly_rejections = register_int_counter_with_registry!(
            Opts::new(
                "plinth_readonly_rejections_total",
                "Writes rejected while the pool was read-only"
            ),
            registry
        )
        .expect("failed to register readonly_rejections counter");

        let control_auth_failures = register_int_counter_with_registry!(
            Opts::new(
                "plinth_control_auth_failures_total",
                "Peer control messages dropped for failed authentication"
            ),
            registry
        )
        .expect("failed to register control_auth_failures counter");

        let batches_committed = register_int_counter_with_registry!(
            Opts::new("plinth_batches_committed_total", "Consensus batches committed"),
            registry
        )
        .expect("failed to register batches_committed counter");

        let batches_rejected = register_int_counter_with_registry!(
            Opts::new("plinth_batches_rejected_total", "Consensus batches rejected"),
            registry
        )
        .expect("failed to register batches_rejected counter");

        let upgrade_notices_sent = register_int_counter_with_registry!(
            Opts::new(
                "plinth_upgrade_notices_sent_total",
                "NODE_UPGRADE announcements broadcast to peers"
            ),
            registry
        )
        .expect("failed to register upgrade_notices_sent counter");

        let ledgers_synced = register_int_gauge_with_registry!(
            Opts::new("plinth_ledgers_synced", "Ledgers currently fully synced"),
            registry
        )
        .expect("failed to register ledgers_synced gauge");

        Self {
            registry,
            requests_processed,
            readonly_rejections,
            control_auth_failures,
            batches_committed,
            batches_rejected,
            upgrade_notices_sent,
            ledgers_synced,
        }
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

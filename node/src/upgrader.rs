//! Pool-wide software upgrade coordination.
//!
//! `POOL_UPGRADE` transactions on the Config ledger carry a per-node
//! schedule. Each node watches the ledger for its own entry, arms a local
//! timer, announces `IN_PROGRESS` to peers, and hands off to an external
//! executor that replaces the binary. After restart the node compares its
//! running version against the durable [`UpgradeOutcomeRecord`] and
//! announces `COMPLETE` or `FAIL` exactly once per pool-visible effect;
//! duplicate announcements are tolerated, silence is not, so the broadcast
//! happens before the notified flag is persisted.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use plinth_ledger::Ledger;
use plinth_messages::{keys, NodeUpgradeData, UpgradeAction};
use plinth_store::{UpgradeOutcomeRecord, UpgradeOutcomeStore};
use plinth_types::{NodeId, Timestamp, TxnType, Version};

use crate::auth::NodeSigner;
use crate::events::NodeEvent;
use crate::peer_link::PeerLink;
use crate::NodeError;

/// This node's entry in a `POOL_UPGRADE` schedule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradeSchedule {
    pub version: Version,
    pub at: Timestamp,
}

/// Upgrade lifecycle as seen by this node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpgradeState {
    /// No upgrade scheduled or in flight.
    Idle,
    /// A timer is armed for the scheduled moment.
    Scheduled(UpgradeSchedule),
    /// The executor has been started; the process is expected to restart.
    InProgress(Version),
    /// A past attempt finished; outcome known.
    Completed { version: Version, success: bool },
}

/// One-shot timer that delivers an [`NodeEvent::UpgradeTimerFired`] event.
pub trait UpgradeTimer: Send {
    fn arm(&mut self, at: Timestamp, version: Version);
    fn cancel(&mut self);
    fn armed(&self) -> Option<(Timestamp, Version)>;
}

/// Starts the actual software replacement (package manager, control script).
pub trait UpgradeExecutor: Send {
    fn start_upgrade(&mut self, version: &Version) -> Result<(), NodeError>;
}

/// Tokio-backed [`UpgradeTimer`]: arming spawns a sleep task that posts the
/// fire event into the node's event queue.
pub struct TokioUpgradeTimer {
    events: mpsc::UnboundedSender<NodeEvent>,
    armed: Option<(Timestamp, Version)>,
    handle: Option<JoinHandle<()>>,
}

impl TokioUpgradeTimer {
    pub fn new(events: mpsc::UnboundedSender<NodeEvent>) -> Self {
        Self {
            events,
            armed: None,
            handle: None,
        }
    }
}

impl UpgradeTimer for TokioUpgradeTimer {
    fn arm(&mut self, at: Timestamp, version: Version) {
        self.cancel();
        let delay_secs = at.secs_until(Timestamp::now());
        let events = self.events.clone();
        let fired_version = version.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(delay_secs)).await;
            let _ = events.send(NodeEvent::UpgradeTimerFired {
                version: fired_version,
            });
        }));
        self.armed = Some((at, version));
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.armed = None;
    }

    fn armed(&self) -> Option<(Timestamp, Version)> {
        self.armed.clone()
    }
}

impl Drop for TokioUpgradeTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Coordinates this node's part in pool-wide upgrades.
pub struct Upgrader {
    node_id: Option<NodeId>,
    running_version: Version,
    state: UpgradeState,
    timer: Box<dyn UpgradeTimer>,
    executor: Box<dyn UpgradeExecutor>,
    outcome_store: Arc<dyn UpgradeOutcomeStore>,
    peer_link: Arc<dyn PeerLink>,
    signer: Arc<NodeSigner>,
}

impl Upgrader {
    pub fn new(
        running_version: Version,
        timer: Box<dyn UpgradeTimer>,
        executor: Box<dyn UpgradeExecutor>,
        outcome_store: Arc<dyn UpgradeOutcomeStore>,
        peer_link: Arc<dyn PeerLink>,
        signer: Arc<NodeSigner>,
    ) -> Self {
        Self {
            node_id: None,
            running_version,
            state: UpgradeState::Idle,
            timer,
            executor,
            outcome_store,
            peer_link,
            signer,
        }
    }

    /// The node learns its own Pool identity only after Pool catch-up.
    pub fn set_node_id(&mut self, node_id: NodeId) {
        self.node_id = Some(node_id);
    }

    pub fn state(&self) -> &UpgradeState {
        &self.state
    }

    pub fn scheduled(&self) -> Option<&UpgradeSchedule> {
        match &self.state {
            UpgradeState::Scheduled(s) => Some(s),
            _ => None,
        }
    }

    /// Re-derive this node's pending schedule from the Config ledger and
    /// reconcile the timer. A later `cancel` for the same version clears an
    /// earlier `start`; the last surviving `start` wins.
    pub fn process_ledger(&mut self, ledger: &dyn Ledger) -> Result<(), NodeError> {
        let Some(node_id) = self.node_id.clone() else {
            // Before Pool catch-up we do not yet know which schedule entry
            // is ours.
            return Ok(());
        };

        let mut pending: Option<UpgradeSchedule> = None;
        for txn in ledger.get_all_txns() {
            if txn.txn_type != TxnType::PoolUpgrade {
                continue;
            }
            let (Some(action), Some(version)) =
                (txn.get_str(keys::ACTION), txn.get_str(keys::VERSION))
            else {
                tracing::warn!(seq_no = ?txn.seq_no, "POOL_UPGRADE missing action or version");
                continue;
            };
            match action {
                keys::START => {
                    let at = txn
                        .data
                        .get(keys::SCHEDULE)
                        .and_then(|s| s.get(node_id.as_str()))
                        .and_then(|v| v.as_u64())
                        .map(Timestamp::new);
                    match at {
                        Some(at) => {
                            pending = Some(UpgradeSchedule {
                                version: Version::new(version),
                                at,
                            });
                        }
                        None => {
                            tracing::debug!(
                                version,
                                node = %node_id,
                                "POOL_UPGRADE schedule has no entry for this node"
                            );
                        }
                    }
                }
                keys::CANCEL => {
                    if pending
                        .as_ref()
                        .is_some_and(|p| p.version.as_str() == version)
                    {
                        pending = None;
                    }
                }
                other => {
                    tracing::warn!(action = other, "unknown POOL_UPGRADE action");
                }
            }
        }

        // A schedule for the version we already run is a no-op.
        if pending
            .as_ref()
            .is_some_and(|p| p.version == self.running_version)
        {
            pending = None;
        }

        let current = self.scheduled().cloned();
        match (current, pending) {
            (Some(cur), Some(next)) if cur == next => {}
            (_, Some(next)) => {
                if matches!(self.state, UpgradeState::InProgress(_)) {
                    // An in-flight attempt is never superseded mid-run.
                    return Ok(());
                }
                tracing::info!(
                    version = %next.version,
                    at = %next.at,
                    "upgrade scheduled, arming timer"
                );
                self.timer.arm(next.at, next.version.clone());
                self.state = UpgradeState::Scheduled(next);
            }
            (Some(cur), None) => {
                tracing::info!(version = %cur.version, "scheduled upgrade cancelled");
                self.timer.cancel();
                self.state = UpgradeState::Idle;
            }
            (None, None) => {}
        }
        Ok(())
    }

    /// The armed timer fired. Persist the attempt record, tell peers, start
    /// the executor. The record goes down before anything else so a crash at
    /// any later point is recoverable.
    pub fn on_timer_fired(&mut self, version: &Version) -> Result<(), NodeError> {
        match &self.state {
            UpgradeState::Scheduled(s) if s.version == *version => {}
            _ => {
                tracing::debug!(version = %version, "stale upgrade timer fire ignored");
                return Ok(());
            }
        }
        tracing::info!(version = %version, "starting scheduled upgrade");
        self.state = UpgradeState::InProgress(version.clone());
        self.timer.cancel();

        self.outcome_store.save(&UpgradeOutcomeRecord {
            last_attempted_version: version.clone(),
            succeeded: false,
            notified_peers: false,
        })?;

        let notice = self
            .signer
            .sign_upgrade(NodeUpgradeData::new(UpgradeAction::InProgress, version.clone()));
        self.peer_link.broadcast(&notice)?;

        if let Err(e) = self.executor.start_upgrade(version) {
            tracing::error!(version = %version, error = %e, "upgrade executor failed to start");
            self.state = UpgradeState::Completed {
                version: version.clone(),
                success: false,
            };
            self.acknowledge_upgrade()?;
        }
        Ok(())
    }

    /// Startup reconciliation: decide whether the last recorded attempt
    /// succeeded by comparing against the version we are actually running.
    pub fn check_upgrade_result(&mut self) -> Result<(), NodeError> {
        let Some(mut record) = self.outcome_store.load()? else {
            return Ok(());
        };
        let succeeded = record.last_attempted_version == self.running_version;
        if record.succeeded != succeeded {
            record.succeeded = succeeded;
            // The outcome changed (or is being decided for the first time);
            // peers have not heard about this outcome yet.
            record.notified_peers = false;
            self.outcome_store.save(&record)?;
        }
        if succeeded {
            tracing::info!(version = %record.last_attempted_version, "upgrade succeeded");
        } else {
            tracing::warn!(
                attempted = %record.last_attempted_version,
                running = %self.running_version,
                "upgrade did not take effect"
            );
        }
        self.state = UpgradeState::Completed {
            version: record.last_attempted_version,
            success: succeeded,
        };
        Ok(())
    }

    /// Whether peers still need to hear about the last attempt's outcome.
    pub fn should_notify_about_upgrade_result(&self) -> Result<bool, NodeError> {
        Ok(self
            .outcome_store
            .load()?
            .is_some_and(|r| !r.notified_peers))
    }

    /// Broadcast the `COMPLETE`/`FAIL` announcement for the last attempt and
    /// mark it delivered. Send-then-persist: a crash in between re-sends on
    /// the next start, which peers de-duplicate; persist-then-send could lose
    /// the announcement forever.
    ///
    /// Returns whether an announcement went out.
    pub fn acknowledge_upgrade(&mut self) -> Result<bool, NodeError> {
        let Some(mut record) = self.outcome_store.load()? else {
            return Ok(false);
        };
        if record.notified_peers {
            return Ok(false);
        }
        let action = if record.succeeded {
            UpgradeAction::Complete
        } else {
            UpgradeAction::Fail
        };
        let notice = self.signer.sign_upgrade(NodeUpgradeData::new(
            action,
            record.last_attempted_version.clone(),
        ));
        self.peer_link.broadcast(&notice)?;
        tracing::info!(
            version = %record.last_attempted_version,
            action = %action,
            "upgrade outcome announced to peers"
        );
        record.notified_peers = true;
        self.outcome_store.save(&record)?;
        Ok(true)
    }

    /// Poll hook: catches a schedule whose moment passed while the timer
    /// machinery was down (restart between arming and firing).
    pub fn service(&mut self, now: Timestamp) -> Result<(), NodeError> {
        let due = match &self.state {
            UpgradeState::Scheduled(s) if s.at.is_due(now) => Some(s.version.clone()),
            _ => None,
        };
        if let Some(version) = due {
            self.on_timer_fired(&version)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nullables::{NullTimer, RecordingPeerLink, ScriptedUpgradeExecutor};
    use plinth_ledger::MemoryLedger;
    use plinth_messages::Txn;
    use plinth_store::MemoryOutcomeStore;
    use plinth_types::{Identifier, LedgerId};
    use serde_json::json;

    fn upgrade_txn(action: &str, version: &str, schedule: serde_json::Value) -> Txn {
        let mut txn = Txn {
            txn_type: TxnType::PoolUpgrade,
            identifier: Identifier::new("trustee"),
            req_id: 1,
            seq_no: None,
            txn_time: None,
            data: serde_json::Map::new(),
        };
        txn.set_field(keys::ACTION, json!(action));
        txn.set_field(keys::VERSION, json!(version));
        txn.set_field(keys::SCHEDULE, schedule);
        txn
    }

    struct Fixture {
        upgrader: Upgrader,
        peer_link: Arc<RecordingPeerLink>,
        outcome_store: Arc<MemoryOutcomeStore>,
    }

    fn fixture(running: &str, executor: ScriptedUpgradeExecutor) -> Fixture {
        let peer_link = Arc::new(RecordingPeerLink::new());
        let outcome_store = Arc::new(MemoryOutcomeStore::new());
        let signer = Arc::new(NodeSigner::from_seed(Identifier::new("NodeA"), &[1u8; 32]));
        let mut upgrader = Upgrader::new(
            Version::new(running),
            Box::new(NullTimer::new()),
            Box::new(executor),
            outcome_store.clone(),
            peer_link.clone(),
            signer,
        );
        upgrader.set_node_id(NodeId::new("NodeA"));
        Fixture {
            upgrader,
            peer_link,
            outcome_store,
        }
    }

    fn config_ledger(txns: Vec<Txn>) -> MemoryLedger {
        let mut ledger = MemoryLedger::new(LedgerId::Config);
        for txn in txns {
            ledger.append(txn).unwrap();
        }
        ledger
    }

    #[test]
    fn start_arms_timer_for_this_nodes_slot() {
        let mut fx = fixture("1.1.0", ScriptedUpgradeExecutor::succeeding());
        let ledger = config_ledger(vec![upgrade_txn(
            keys::START,
            "1.2.0",
            json!({"NodeA": 5000, "NodeB": 5300}),
        )]);
        fx.upgrader.process_ledger(&ledger).unwrap();
        assert_eq!(
            fx.upgrader.scheduled(),
            Some(&UpgradeSchedule {
                version: Version::new("1.2.0"),
                at: Timestamp::new(5000),
            })
        );
    }

    #[test]
    fn cancel_clears_the_schedule() {
        let mut fx = fixture("1.1.0", ScriptedUpgradeExecutor::succeeding());
        let ledger = config_ledger(vec![
            upgrade_txn(keys::START, "1.2.0", json!({"NodeA": 5000})),
            upgrade_txn(keys::CANCEL, "1.2.0", json!({})),
        ]);
        fx.upgrader.process_ledger(&ledger).unwrap();
        assert_eq!(fx.upgrader.state(), &UpgradeState::Idle);
    }

    #[test]
    fn later_start_supersedes_earlier_schedule() {
        let mut fx = fixture("1.1.0", ScriptedUpgradeExecutor::succeeding());
        let ledger = config_ledger(vec![upgrade_txn(
            keys::START,
            "1.2.0",
            json!({"NodeA": 5000}),
        )]);
        fx.upgrader.process_ledger(&ledger).unwrap();

        let superseded = config_ledger(vec![
            upgrade_txn(keys::START, "1.2.0", json!({"NodeA": 5000})),
            upgrade_txn(keys::START, "1.3.0", json!({"NodeA": 9000})),
        ]);
        fx.upgrader.process_ledger(&superseded).unwrap();
        assert_eq!(
            fx.upgrader.scheduled().map(|s| s.version.clone()),
            Some(Version::new("1.3.0"))
        );
    }

    #[test]
    fn schedule_for_running_version_is_ignored() {
        let mut fx = fixture("1.2.0", ScriptedUpgradeExecutor::succeeding());
        let ledger = config_ledger(vec![upgrade_txn(
            keys::START,
            "1.2.0",
            json!({"NodeA": 5000}),
        )]);
        fx.upgrader.process_ledger(&ledger).unwrap();
        assert_eq!(fx.upgrader.state(), &UpgradeState::Idle);
    }

    #[test]
    fn timer_fire_records_attempt_and_announces_in_progress() {
        let mut fx = fixture("1.1.0", ScriptedUpgradeExecutor::succeeding());
        let ledger = config_ledger(vec![upgrade_txn(
            keys::START,
            "1.2.0",
            json!({"NodeA": 5000}),
        )]);
        fx.upgrader.process_ledger(&ledger).unwrap();
        fx.upgrader.on_timer_fired(&Version::new("1.2.0")).unwrap();

        let record = fx.outcome_store.load().unwrap().unwrap();
        assert_eq!(record.last_attempted_version, Version::new("1.2.0"));
        assert!(!record.succeeded);
        assert!(!record.notified_peers);

        let sent = fx.peer_link.broadcasts();
        assert_eq!(sent.len(), 1);
        let payload = NodeUpgradeData::from_request(&sent[0]).unwrap();
        assert_eq!(payload.action, UpgradeAction::InProgress);
        assert_eq!(payload.version, Version::new("1.2.0"));
        assert_eq!(fx.upgrader.state(), &UpgradeState::InProgress(Version::new("1.2.0")));
    }

    #[test]
    fn stale_timer_fire_is_ignored() {
        let mut fx = fixture("1.1.0", ScriptedUpgradeExecutor::succeeding());
        fx.upgrader.on_timer_fired(&Version::new("1.2.0")).unwrap();
        assert_eq!(fx.upgrader.state(), &UpgradeState::Idle);
        assert!(fx.peer_link.broadcasts().is_empty());
    }

    #[test]
    fn executor_failure_announces_fail_immediately() {
        let mut fx = fixture("1.1.0", ScriptedUpgradeExecutor::failing("disk full"));
        let ledger = config_ledger(vec![upgrade_txn(
            keys::START,
            "1.2.0",
            json!({"NodeA": 5000}),
        )]);
        fx.upgrader.process_ledger(&ledger).unwrap();
        fx.upgrader.on_timer_fired(&Version::new("1.2.0")).unwrap();

        let sent = fx.peer_link.broadcasts();
        assert_eq!(sent.len(), 2);
        let last = NodeUpgradeData::from_request(&sent[1]).unwrap();
        assert_eq!(last.action, UpgradeAction::Fail);
        assert!(fx.outcome_store.load().unwrap().unwrap().notified_peers);
    }

    #[test]
    fn restart_into_new_version_announces_complete_once() {
        // Simulated restart: the record says 1.2.0 was attempted, and the
        // running binary now is 1.2.0.
        let mut fx = fixture("1.2.0", ScriptedUpgradeExecutor::succeeding());
        fx.outcome_store
            .save(&UpgradeOutcomeRecord {
                last_attempted_version: Version::new("1.2.0"),
                succeeded: false,
                notified_peers: false,
            })
            .unwrap();

        fx.upgrader.check_upgrade_result().unwrap();
        assert!(fx.upgrader.should_notify_about_upgrade_result().unwrap());
        assert!(fx.upgrader.acknowledge_upgrade().unwrap());

        let sent = fx.peer_link.broadcasts();
        assert_eq!(sent.len(), 1);
        let payload = NodeUpgradeData::from_request(&sent[0]).unwrap();
        assert_eq!(payload.action, UpgradeAction::Complete);

        // Second pass over the same record sends nothing.
        assert!(!fx.upgrader.acknowledge_upgrade().unwrap());
        assert_eq!(fx.peer_link.broadcasts().len(), 1);
    }

    #[test]
    fn restart_into_old_version_announces_fail() {
        let mut fx = fixture("1.1.0", ScriptedUpgradeExecutor::succeeding());
        fx.outcome_store
            .save(&UpgradeOutcomeRecord {
                last_attempted_version: Version::new("1.2.0"),
                succeeded: false,
                notified_peers: false,
            })
            .unwrap();

        fx.upgrader.check_upgrade_result().unwrap();
        fx.upgrader.acknowledge_upgrade().unwrap();

        let sent = fx.peer_link.broadcasts();
        let payload = NodeUpgradeData::from_request(&sent[0]).unwrap();
        assert_eq!(payload.action, UpgradeAction::Fail);
    }

    #[test]
    fn service_fires_a_past_due_schedule() {
        let mut fx = fixture("1.1.0", ScriptedUpgradeExecutor::succeeding());
        let ledger = config_ledger(vec![upgrade_txn(
            keys::START,
            "1.2.0",
            json!({"NodeA": 5000}),
        )]);
        fx.upgrader.process_ledger(&ledger).unwrap();

        fx.upgrader.service(Timestamp::new(4999)).unwrap();
        assert!(matches!(fx.upgrader.state(), UpgradeState::Scheduled(_)));

        fx.upgrader.service(Timestamp::new(5000)).unwrap();
        assert_eq!(fx.upgrader.state(), &UpgradeState::InProgress(Version::new("1.2.0")));
    }
}

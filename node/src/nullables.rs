//! Nullable collaborators: in-memory stand-ins for the node's external
//! seams (timer, peer transport, upgrade executor, consensus intake) that
//! record what was asked of them. Used by unit and integration tests;
//! compiled unconditionally so downstream harnesses can use them too.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use plinth_messages::{LedgerStatus, Request};
use plinth_types::{NodeId, Timestamp, Version};

use crate::consensus::ConsensusSubmitter;
use crate::peer_link::PeerLink;
use crate::upgrader::{UpgradeExecutor, UpgradeTimer};
use crate::NodeError;

/// Timer that records arming without any real clock behind it.
pub struct NullTimer {
    log: Arc<Mutex<TimerLog>>,
}

#[derive(Default)]
pub struct TimerLog {
    pub armed: Option<(Timestamp, Version)>,
    pub arm_count: usize,
    pub cancel_count: usize,
}

impl NullTimer {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(TimerLog::default())),
        }
    }

    /// Shared handle for inspecting the timer after it is boxed away.
    pub fn log(&self) -> Arc<Mutex<TimerLog>> {
        self.log.clone()
    }
}

impl Default for NullTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl UpgradeTimer for NullTimer {
    fn arm(&mut self, at: Timestamp, version: Version) {
        let mut log = self.log.lock().unwrap();
        log.armed = Some((at, version));
        log.arm_count += 1;
    }

    fn cancel(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.armed = None;
        log.cancel_count += 1;
    }

    fn armed(&self) -> Option<(Timestamp, Version)> {
        self.log.lock().unwrap().armed.clone()
    }
}

/// Peer link that records outbound traffic instead of sending it.
pub struct RecordingPeerLink {
    broadcasts: Mutex<Vec<Request>>,
    statuses: Mutex<Vec<(NodeId, LedgerStatus)>>,
}

impl RecordingPeerLink {
    pub fn new() -> Self {
        Self {
            broadcasts: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
        }
    }

    pub fn broadcasts(&self) -> Vec<Request> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<(NodeId, LedgerStatus)> {
        self.statuses.lock().unwrap().clone()
    }
}

impl Default for RecordingPeerLink {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerLink for RecordingPeerLink {
    fn broadcast(&self, request: &Request) -> Result<(), NodeError> {
        self.broadcasts.lock().unwrap().push(request.clone());
        Ok(())
    }

    fn send_status(&self, to: &NodeId, status: &LedgerStatus) -> Result<(), NodeError> {
        self.statuses
            .lock()
            .unwrap()
            .push((to.clone(), status.clone()));
        Ok(())
    }
}

/// Executor with scripted outcomes. Starts are recorded through a shared
/// handle so tests can inspect them after the executor is boxed.
pub struct ScriptedUpgradeExecutor {
    outcomes: VecDeque<Result<(), String>>,
    started: Arc<Mutex<Vec<Version>>>,
}

impl ScriptedUpgradeExecutor {
    pub fn new(outcomes: Vec<Result<(), String>>) -> Self {
        Self {
            outcomes: outcomes.into(),
            started: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every start succeeds.
    pub fn succeeding() -> Self {
        Self::new(Vec::new())
    }

    /// The first start fails with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self::new(vec![Err(reason.to_string())])
    }

    pub fn started(&self) -> Arc<Mutex<Vec<Version>>> {
        self.started.clone()
    }
}

impl UpgradeExecutor for ScriptedUpgradeExecutor {
    fn start_upgrade(&mut self, version: &Version) -> Result<(), NodeError> {
        self.started.lock().unwrap().push(version.clone());
        match self.outcomes.pop_front() {
            Some(Ok(())) | None => Ok(()),
            Some(Err(reason)) => Err(NodeError::Config(reason)),
        }
    }
}

/// Consensus intake that records submissions.
pub struct NullConsensus {
    submitted: Mutex<Vec<Request>>,
}

impl NullConsensus {
    pub fn new() -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn submitted(&self) -> Vec<Request> {
        self.submitted.lock().unwrap().clone()
    }
}

impl Default for NullConsensus {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsensusSubmitter for NullConsensus {
    fn submit(&self, request: Request) -> Result<(), NodeError> {
        self.submitted.lock().unwrap().push(request);
        Ok(())
    }
}

//! Observable metrics snapshot, published on a `watch` channel so callers can
//! poll the latest state or await a condition without a dedicated RPC.

use crate::outcome::Role;
use crate::types::{LogIndex, MemberId, Term};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::watch;

use crate::shipper::ShipperState;

/// Per-follower figures published only while this node is Leader.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FollowerMetrics {
    pub matched: LogIndex,
    pub shipper_state: ShipperState,
}

/// A snapshot of this node's view of the cluster, published after every
/// `Outcome` application and `LogShipper` transition.
#[derive(Clone, Debug)]
pub struct RaftMetrics {
    pub id: MemberId,
    pub role: Role,
    pub term: Term,
    pub last_log_index: LogIndex,
    pub commit_index: LogIndex,
    pub last_applied: LogIndex,
    pub current_leader: Option<MemberId>,
    pub leader: Option<BTreeMap<MemberId, FollowerMetrics>>,
}

impl RaftMetrics {
    pub fn new_initial(id: MemberId) -> Self {
        Self {
            id,
            role: Role::Follower,
            term: 0,
            last_log_index: -1,
            commit_index: -1,
            last_applied: -1,
            current_leader: None,
            leader: None,
        }
    }
}

/// Creates the publish/subscribe pair used by `RaftInstance`, mirroring the
/// teacher's `watch::channel(RaftMetrics::new(...))` construction.
pub fn channel(id: MemberId) -> (watch::Sender<RaftMetrics>, watch::Receiver<RaftMetrics>) {
    watch::channel(RaftMetrics::new_initial(id))
}

/// Polling helpers over a metrics receiver, mirroring async-raft's
/// `Raft::wait` / `Wait` struct. Intended for tests and embedding
/// applications; the core itself never awaits these.
pub struct Wait {
    pub rx: watch::Receiver<RaftMetrics>,
    pub timeout: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum WaitError {
    #[error("timed out after {0:?} waiting for condition")]
    Timeout(Duration),
    #[error("metrics channel closed")]
    ChannelClosed,
}

impl Wait {
    /// Waits until `current_leader` equals `expect`, or until `self.timeout`
    /// elapses.
    pub async fn current_leader(&mut self, expect: MemberId) -> Result<RaftMetrics, WaitError> {
        self.condition(|m| m.current_leader == Some(expect)).await
    }

    /// Waits until `commit_index >= expect`.
    pub async fn log_at_least(&mut self, expect: LogIndex) -> Result<RaftMetrics, WaitError> {
        self.condition(|m| m.commit_index >= expect).await
    }

    /// Waits until the node reaches `expect`.
    pub async fn state(&mut self, expect: Role) -> Result<RaftMetrics, WaitError> {
        self.condition(|m| m.role == expect).await
    }

    async fn condition<F>(&mut self, mut pred: F) -> Result<RaftMetrics, WaitError>
    where
        F: FnMut(&RaftMetrics) -> bool,
    {
        let fut = async {
            loop {
                let snapshot = self.rx.borrow().clone();
                if pred(&snapshot) {
                    return Ok(snapshot);
                }
                if self.rx.changed().await.is_err() {
                    return Err(WaitError::ChannelClosed);
                }
            }
        };
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or(Err(WaitError::Timeout(self.timeout)))
    }
}

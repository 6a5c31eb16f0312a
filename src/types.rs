//! Core scalar types shared by every module in this crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for a cluster member. Opaque to the core beyond equality
/// and hashing; the transport and storage layers are responsible for mapping
/// it to an address or on-disk directory.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct MemberId(pub u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "member-{}", self.0)
    }
}

/// Logical epoch. Monotonically increasing; `0` is the term a freshly
/// initialized node starts in before its first election.
pub type Term = u64;

/// Position within the replicated log. `-1` denotes "before the first entry".
/// Signed so that "no entry" can be expressed without an `Option` at every
/// call site in the hot path.
pub type LogIndex = i64;

/// Sentinel term returned by [`crate::log::RaftLog::term_at`] for an index
/// that is empty, pruned, or otherwise absent (`-1` and any index before
/// `prev_index()`).
pub const NO_TERM: Term = 0;

/// Sentinel index meaning "before the log" or "nothing sent yet".
pub const NO_INDEX: LogIndex = -1;

/// Opaque identifier of the underlying data store a node is attached to.
///
/// Compared for equality only: it exists to reject a peer that has been
/// reattached to an incompatible store (e.g. restored from a different
/// cluster's backup) from participating in elections or replication.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct StoreId {
    pub creation_time: u64,
    pub random_id: u64,
    pub upgrade_time: u64,
    pub upgrade_id: u64,
}

/// A single entry in the replicated log. The payload is never interpreted by
/// this crate; it is the graph storage engine's operation encoding.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LogEntry<D> {
    pub term: Term,
    pub payload: D,
}

impl<D> LogEntry<D> {
    pub fn new(term: Term, payload: D) -> Self {
        Self { term, payload }
    }
}

/// A proposal accepted by the leader: the index and term the payload was
/// assigned. Committal is not implied; callers observe it via
/// [`crate::metrics::RaftMetrics`] or by polling `commit_index`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Proposal {
    pub term: Term,
    pub index: LogIndex,
}

/// Determines whether `(term_a, index_a)` is at least as up-to-date as
/// `(term_b, index_b)`, per the Raft vote-granting rule.
pub fn is_at_least_as_up_to_date(
    term_a: Term,
    index_a: LogIndex,
    term_b: Term,
    index_b: LogIndex,
) -> bool {
    if term_a != term_b {
        term_a > term_b
    } else {
        index_a >= index_b
    }
}

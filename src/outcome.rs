//! The `Outcome` type: a pure, immutable description of what a role handler
//! wants to happen, applied atomically by `RaftInstance`.
//!
//! This is the fusion point between async-raft's task-dispatch texture and
//! a single-pure-function-per-message style: instead of a handler mutating
//! `self` the way `RaftCore::handle_append_entries_request` does, a handler
//! here returns a value describing the mutation, which the instance then
//! performs in one place (persist, then emit).

use crate::messages::{Directed, RaftMessage};
use crate::types::{LogIndex, MemberId, Term};

/// The role a node occupies. Mirrors async-raft's `State` enum, minus
/// `NonVoter` (no non-voting membership in this crate)
/// and `Shutdown` (modeled as an instance-level condition, not a role).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// A log mutation a handler wants applied. Kept separate from direct
/// `RaftLog` calls so that `Outcome` remains a plain, inspectable value in
/// tests of individual handler properties.
#[derive(Clone, Debug)]
pub enum LogOp<D> {
    Append(Vec<crate::types::LogEntry<D>>),
    /// Remove entries at index `>= from`. The instance enforces the
    /// commit-index safety check before calling `RaftLog::truncate`.
    TruncateFrom(LogIndex),
}

/// Immutable result of one handler invocation.
///
/// Fields default to "no change" so handlers only populate what they
/// actually affect; `RaftInstance::apply` interprets an unset field as "keep
/// current value".
#[derive(Clone, Debug)]
pub struct Outcome<D> {
    pub next_role: Option<Role>,
    pub next_term: Option<Term>,
    pub next_voted_for: Option<Option<MemberId>>,
    pub next_leader: Option<Option<MemberId>>,
    pub log_ops: Vec<LogOp<D>>,
    pub commit_index: Option<LogIndex>,
    pub outgoing: Vec<Directed<RaftMessage<D>>>,
    pub reset_election_timer: bool,
}

// Written by hand rather than derived: `#[derive(Default)]` would require
// `D: Default`, but the payload type has no reason to implement it.
impl<D> Default for Outcome<D> {
    fn default() -> Self {
        Self {
            next_role: None,
            next_term: None,
            next_voted_for: None,
            next_leader: None,
            log_ops: Vec::new(),
            commit_index: None,
            outgoing: Vec::new(),
            reset_election_timer: false,
        }
    }
}

impl<D> Outcome<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.next_role = Some(role);
        self
    }

    pub fn with_term(mut self, term: Term) -> Self {
        self.next_term = Some(term);
        self
    }

    pub fn with_voted_for(mut self, voted_for: Option<MemberId>) -> Self {
        self.next_voted_for = Some(voted_for);
        self
    }

    pub fn with_leader(mut self, leader: Option<MemberId>) -> Self {
        self.next_leader = Some(leader);
        self
    }

    pub fn with_commit_index(mut self, index: LogIndex) -> Self {
        self.commit_index = Some(index);
        self
    }

    pub fn reset_timer(mut self) -> Self {
        self.reset_election_timer = true;
        self
    }

    pub fn send(mut self, to: MemberId, message: RaftMessage<D>) -> Self {
        self.outgoing.push(Directed::new(to, message));
        self
    }

    pub fn append(mut self, entries: Vec<crate::types::LogEntry<D>>) -> Self {
        if !entries.is_empty() {
            self.log_ops.push(LogOp::Append(entries));
        }
        self
    }

    pub fn truncate_from(mut self, index: LogIndex) -> Self {
        self.log_ops.push(LogOp::TruncateFrom(index));
        self
    }
}

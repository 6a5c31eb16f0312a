//! Error types for the Raft core.
//!
//! Mirrors the split the storage/network traits of this crate rely on:
//! transient failures the caller may retry, and fatal safety violations that
//! must halt the instance rather than be swallowed.

use crate::types::{LogIndex, MemberId, Term};
use std::fmt;

/// Errors produced by an implementor of [`crate::storage::PersistentState`]
/// or [`crate::log::RaftLog`]. Always treated as transient by the instance:
/// the caller is expected to retry or escalate.
#[derive(thiserror::Error, Debug)]
#[error("storage error: {0}")]
pub struct StorageError(#[from] pub anyhow::Error);

/// A safety invariant was violated. These are never recoverable locally; the
/// instance that observes one must stop processing and propagate the error
/// to its host rather than attempt to continue.
#[derive(thiserror::Error, Debug, Clone)]
pub enum SafetyViolation {
    #[error("attempted to truncate committed index {index} (commit_index={commit_index})")]
    TruncateCommitted { index: LogIndex, commit_index: LogIndex },

    #[error("attempted to prune past commit index {index} (commit_index={commit_index})")]
    PrunePastCommit { index: LogIndex, commit_index: LogIndex },

    #[error("term moved backward: observed {observed}, current {current}")]
    TermRegression { observed: Term, current: Term },

    #[error("double vote in term {term}: already voted for {existing}, rejected {attempted}")]
    DoubleVote { term: Term, existing: MemberId, attempted: MemberId },

    #[error("leader attempted to truncate its own log at index {index}")]
    LeaderSelfTruncate { index: LogIndex },
}

/// Top-level error type returned from instance-driving entry points.
#[derive(thiserror::Error, Debug)]
pub enum RaftError {
    /// A storage or persistence operation failed. Retryable by the caller;
    /// repeated failure at the same call site is the caller's decision to
    /// escalate to `Fatal`.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A safety invariant was violated. Fatal: the instance must not process
    /// further messages.
    #[error("fatal safety violation: {0}")]
    Fatal(#[from] SafetyViolation),

    /// The instance has been shut down and can no longer accept messages or
    /// client proposals.
    #[error("raft instance is shutting down")]
    ShuttingDown,
}

pub type RaftResult<T> = Result<T, RaftError>;

/// Result of a client write submission.
#[derive(Debug)]
pub enum ProposeError {
    /// This node is not the leader. `leader_hint` carries the last known
    /// leader, if any, so the caller can redirect without a broadcast.
    NotLeader { leader_hint: Option<MemberId> },
    ShuttingDown,
}

impl fmt::Display for ProposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposeError::NotLeader { leader_hint } => {
                write!(f, "not leader (hint: {:?})", leader_hint)
            }
            ProposeError::ShuttingDown => write!(f, "raft instance is shutting down"),
        }
    }
}

impl std::error::Error for ProposeError {}

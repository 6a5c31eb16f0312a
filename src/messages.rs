//! Wire message shapes. Field layout is canonical; the bit-level
//! encoding is left to the transport, mirroring async-raft's `raft.rs`
//! message definitions (`VoteRequest`/`AppendEntriesRequest`/etc.), trimmed
//! of membership-change and snapshot-streaming payloads per this crate's
//! non-goals.

use crate::types::{LogEntry, LogIndex, MemberId, StoreId, Term};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub from: MemberId,
    pub term: Term,
    pub candidate: MemberId,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
    pub store_id: StoreId,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub from: MemberId,
    pub term: Term,
    pub granted: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppendEntriesRequest<D> {
    pub from: MemberId,
    pub term: Term,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry<D>>,
    pub leader_commit: LogIndex,
}

impl<D> AppendEntriesRequest<D> {
    pub fn is_heartbeat(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub from: MemberId,
    pub term: Term,
    pub success: bool,
    /// Highest index known to match on success; meaningless on failure
    /// (the shipper falls back to backtracking from its own bookkeeping).
    pub match_index: LogIndex,
}

/// Emitted by a [`crate::shipper::LogShipper`] when the entries a follower
/// needs are no longer retained locally, i.e. pruning was observed mid read.
/// The follower is expected to trigger a store-copy out of band; this crate
/// does not implement that subsystem.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LogCompactionInfo {
    pub from: MemberId,
    pub term: Term,
    pub prev_index: LogIndex,
}

/// Any message this crate's role handlers or shippers can produce.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RaftMessage<D> {
    VoteRequest(VoteRequest),
    VoteResponse(VoteResponse),
    AppendEntries(AppendEntriesRequest<D>),
    AppendEntriesResponse(AppendEntriesResponse),
    LogCompactionInfo(LogCompactionInfo),
}

/// A message paired with its destination, as produced in an
/// [`crate::outcome::Outcome`] and consumed by the transport.
#[derive(Clone, Debug)]
pub struct Directed<M> {
    pub to: MemberId,
    pub inner: M,
}

impl<M> Directed<M> {
    pub fn new(to: MemberId, inner: M) -> Self {
        Self { to, inner }
    }
}

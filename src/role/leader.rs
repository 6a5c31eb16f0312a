//! Leader-role handlers.

use crate::error::ProposeError;
use crate::log::RaftLog;
use crate::messages::{AppendEntriesRequest, VoteRequest};
use crate::outcome::{Outcome, Role};
use crate::role::follower;
use crate::state::{FollowerProgress, RaftState};
use crate::types::{LogEntry, LogIndex, MemberId, Proposal};
use std::collections::BTreeMap;

/// Built when a Candidate's `VoteTally` reaches quorum. Initializes
/// per-follower progress but does not itself emit
/// the initial AppendEntries to each follower — that is the job of
/// `RaftInstance`, which owns the per-follower `LogShipper`s and calls
/// their `start()` once the role change lands.
pub fn on_election_won<D: Clone, L: RaftLog<D>>(state: &RaftState<D, L>) -> Outcome<D> {
    Outcome::new()
        .with_role(Role::Leader)
        .with_leader(Some(state.myself))
        .reset_timer()
}

/// Builds the initial per-follower progress table for a freshly elected
/// leader: for each follower, nextIndex starts at `log.append_index() + 1`
/// and matchIndex starts at -1.
pub fn initial_follower_progress<D, L: RaftLog<D>>(
    state: &RaftState<D, L>,
) -> BTreeMap<MemberId, FollowerProgress> {
    let next_index = state.last_log_index() + 1;
    state
        .voting_members
        .iter()
        .filter(|&&m| m != state.myself)
        .map(|&m| {
            (
                m,
                FollowerProgress {
                    match_index: -1,
                    next_index,
                    last_sent_index: -1,
                },
            )
        })
        .collect()
}

/// A vote request while Leader defers entirely to the shared rules: a
/// later term steps us down, an equal or earlier term is handled exactly
/// as any other role would.
pub fn handle_vote_request<D: Clone, L: RaftLog<D>>(
    state: &RaftState<D, L>,
    req: &VoteRequest,
) -> Outcome<D> {
    follower::handle_vote_request(state, req)
}

/// AppendEntries from another leader: under the safety invariants this can
/// only happen at a strictly higher term (two leaders in the same term is
/// forbidden by election safety); step down and process as Follower
pub fn handle_append_entries<D: Clone, L: RaftLog<D>>(
    state: &RaftState<D, L>,
    req: &AppendEntriesRequest<D>,
) -> Outcome<D> {
    follower::handle_append_entries(state, req)
}

/// Accepts a client payload: appends it to the local log at the next
/// available index. The caller
/// (`RaftInstance`) is responsible for notifying each `LogShipper` via
/// `onNewEntries` once the append lands.
pub fn propose<D: Clone, L: RaftLog<D>>(
    state: &RaftState<D, L>,
    payload: D,
) -> Result<(Outcome<D>, Proposal), ProposeError> {
    let term = state.votes.term;
    let index = state.last_log_index() + 1;
    let outcome = Outcome::new().append(vec![LogEntry::new(term, payload)]);
    Ok((outcome, Proposal { term, index }))
}

/// Recomputes `commit_index` given an updated set of per-follower match
/// indices. The current-term restriction
/// is load-bearing: entries from an earlier term are never committed by
/// replication count alone.
pub fn recompute_commit_index<D, L: RaftLog<D>>(state: &RaftState<D, L>) -> Option<LogIndex> {
    let mut match_indices: Vec<LogIndex> = state
        .followers
        .values()
        .map(|p| p.match_index)
        .collect();
    match_indices.push(state.last_log_index());
    match_indices.sort_unstable();

    let quorum = state.quorum_size();
    if match_indices.len() < quorum {
        return None;
    }
    // The highest index replicated to at least `quorum` members is the
    // value at position `len - quorum` in the sorted ascending list.
    let candidate = match_indices[match_indices.len() - quorum];
    if candidate > state.commit_index && state.log.term_at(candidate) == state.votes.term {
        Some(candidate)
    } else {
        None
    }
}

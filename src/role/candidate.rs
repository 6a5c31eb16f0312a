//! Candidate-role handlers.

use crate::log::RaftLog;
use crate::messages::{AppendEntriesRequest, VoteRequest, VoteResponse};
use crate::outcome::{Outcome, Role};
use crate::role::{follower, leader};
use crate::state::RaftState;
use crate::types::{MemberId, StoreId};
use std::collections::BTreeSet;

/// A vote request or AppendEntries received while Candidate defers to the
/// shared Follower rules for term handling; only the "concede on same-term
/// AppendEntries" and vote-tallying logic are Candidate-specific.
pub fn handle_vote_request<D: Clone, L: RaftLog<D>>(
    state: &RaftState<D, L>,
    req: &VoteRequest,
) -> Outcome<D> {
    follower::handle_vote_request(state, req)
}

pub fn handle_append_entries<D: Clone, L: RaftLog<D>>(
    state: &RaftState<D, L>,
    req: &AppendEntriesRequest<D>,
) -> Outcome<D> {
    // `follower::handle_append_entries` always sets the role to Follower
    // for any non-stale request, which is exactly "concede" for a
    // Candidate observing a same-or-higher-term leader.
    follower::handle_append_entries(state, req)
}

/// Tracks votes received during this election. Not part of `RaftState`
/// because it is Candidate-local and reset on every election; the instance
/// owns one alongside the current role.
#[derive(Clone, Debug, Default)]
pub struct VoteTally {
    pub granted_by: BTreeSet<MemberId>,
}

impl VoteTally {
    pub fn starting_with_self(myself: MemberId) -> Self {
        let mut granted_by = BTreeSet::new();
        granted_by.insert(myself);
        Self { granted_by }
    }
}

/// Handles a `VoteResponse` while Candidate. Stale-term and denied
/// responses are folded into the tally (or ignored); reaching quorum
/// promotes to Leader.
pub fn handle_vote_response<D: Clone, L: RaftLog<D>>(
    state: &RaftState<D, L>,
    tally: &mut VoteTally,
    resp: &VoteResponse,
) -> Outcome<D> {
    if resp.term > state.votes.term {
        return Outcome::new()
            .with_role(Role::Follower)
            .with_term(resp.term)
            .with_voted_for(None);
    }
    if resp.term < state.votes.term || !resp.granted {
        return Outcome::new();
    }
    tally.granted_by.insert(resp.from);
    if tally.granted_by.len() >= state.quorum_size() {
        return leader::on_election_won(state);
    }
    Outcome::new()
}

/// Starts a fresh election after the previous one timed out without
/// reaching quorum.
pub fn handle_timeout<D: Clone, L: RaftLog<D>>(
    state: &RaftState<D, L>,
    store_id: StoreId,
) -> Outcome<D> {
    crate::election::start_election(state, store_id)
}

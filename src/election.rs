//! Starting a new election.

use crate::log::RaftLog;
use crate::messages::{RaftMessage, VoteRequest};
use crate::outcome::{Outcome, Role};
use crate::state::RaftState;
use crate::types::StoreId;

/// Increments the term, self-votes, and emits a `VoteRequest` to every
/// other voting member. Returns an empty `Outcome` (no role change, no
/// timer reset) if `myself` is not a voting member — an election must not
/// be started by a learner.
pub fn start_election<D: Clone, L: RaftLog<D>>(
    state: &RaftState<D, L>,
    store_id: StoreId,
) -> Outcome<D> {
    if !state.is_voting_member(state.myself) {
        return Outcome::new();
    }

    let next_term = state.votes.term + 1;
    let last_log_index = state.last_log_index();
    let last_log_term = state.last_log_term();

    let mut outcome = Outcome::new()
        .with_role(Role::Candidate)
        .with_term(next_term)
        .with_voted_for(Some(state.myself))
        .reset_timer();

    for &peer in &state.voting_members {
        if peer == state.myself {
            continue;
        }
        outcome = outcome.send(
            peer,
            RaftMessage::VoteRequest(VoteRequest {
                from: state.myself,
                term: next_term,
                candidate: state.myself,
                last_log_index,
                last_log_term,
                store_id,
            }),
        );
    }

    outcome
}

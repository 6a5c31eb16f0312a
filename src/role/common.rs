//! Rules applied before any role-specific handler logic.

use crate::log::RaftLog;
use crate::outcome::{Outcome, Role};
use crate::state::RaftState;
use crate::types::{is_at_least_as_up_to_date, Term};

/// Result of applying the common term rules to an incoming message's term.
pub struct TermCheck<D> {
    /// `true` if the message's term was stale and the caller should reject
    /// the request without further processing.
    pub stale: bool,
    /// Set when the peer's term forced a step-down to Follower; the caller
    /// must fold this into whatever `Outcome` it eventually returns.
    pub stepped_down: Option<Outcome<D>>,
    pub effective_term: Term,
}

/// Rejects messages from a stale term, and steps down to Follower
/// (clearing the vote) on observing a higher term.
pub fn check_term<D, L: RaftLog<D>>(state: &RaftState<D, L>, msg_term: Term) -> TermCheck<D> {
    let current = state.votes.term;
    if msg_term < current {
        return TermCheck {
            stale: true,
            stepped_down: None,
            effective_term: current,
        };
    }
    if msg_term > current {
        let outcome = Outcome::new()
            .with_role(Role::Follower)
            .with_term(msg_term)
            .with_voted_for(None);
        return TermCheck {
            stale: false,
            stepped_down: Some(outcome),
            effective_term: msg_term,
        };
    }
    TermCheck {
        stale: false,
        stepped_down: None,
        effective_term: current,
    }
}

/// Spec §4.4 "vote request handling (all roles)": whether a candidate's log
/// is at least as up to date as ours, combined with the "not yet voted (or
/// already voted for this candidate)" condition.
pub fn should_grant_vote<D, L: RaftLog<D>>(
    state: &RaftState<D, L>,
    already_voted_for: Option<crate::types::MemberId>,
    candidate: crate::types::MemberId,
    candidate_last_log_index: crate::types::LogIndex,
    candidate_last_log_term: Term,
) -> bool {
    let vote_available = match already_voted_for {
        None => true,
        Some(existing) => existing == candidate,
    };
    vote_available
        && is_at_least_as_up_to_date(
            candidate_last_log_term,
            candidate_last_log_index,
            state.last_log_term(),
            state.last_log_index(),
        )
}

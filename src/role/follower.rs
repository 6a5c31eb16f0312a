//! Follower-role handlers.

use crate::log::RaftLog;
use crate::messages::{
    AppendEntriesRequest, AppendEntriesResponse, RaftMessage, VoteRequest, VoteResponse,
};
use crate::outcome::{LogOp, Outcome, Role};
use crate::role::common::{check_term, should_grant_vote};
use crate::state::RaftState;
use crate::types::LogIndex;

pub fn handle_vote_request<D: Clone, L: RaftLog<D>>(
    state: &RaftState<D, L>,
    req: &VoteRequest,
) -> Outcome<D> {
    let check = check_term(state, req.term);
    if check.stale {
        return Outcome::new().send(
            req.from,
            RaftMessage::VoteResponse(VoteResponse {
                from: state.myself,
                term: check.effective_term,
                granted: false,
            }),
        );
    }

    let mut outcome = check.stepped_down.unwrap_or_default();
    let already_voted_for = if outcome.next_voted_for.is_some() {
        None
    } else {
        state.votes.voted_for
    };

    let grant = should_grant_vote(
        state,
        already_voted_for,
        req.candidate,
        req.last_log_index,
        req.last_log_term,
    );

    if grant {
        outcome = outcome.with_voted_for(Some(req.candidate)).reset_timer();
    }

    outcome.send(
        req.from,
        RaftMessage::VoteResponse(VoteResponse {
            from: state.myself,
            term: check.effective_term,
            granted: grant,
        }),
    )
}

pub fn handle_append_entries<D: Clone, L: RaftLog<D>>(
    state: &RaftState<D, L>,
    req: &AppendEntriesRequest<D>,
) -> Outcome<D> {
    let check = check_term(state, req.term);
    if check.stale {
        return Outcome::new().send(
            req.from,
            RaftMessage::AppendEntriesResponse(AppendEntriesResponse {
                from: state.myself,
                term: check.effective_term,
                success: false,
                match_index: -1,
            }),
        );
    }

    let mut outcome = check
        .stepped_down
        .unwrap_or_else(|| Outcome::new().with_role(Role::Follower))
        .with_leader(Some(req.from))
        .reset_timer();

    let consistent = req.prev_log_index == -1
        || state.log.term_at(req.prev_log_index) == req.prev_log_term;

    if !consistent {
        return outcome.send(
            req.from,
            RaftMessage::AppendEntriesResponse(AppendEntriesResponse {
                from: state.myself,
                term: check.effective_term,
                success: false,
                match_index: -1,
            }),
        );
    }

    let mut conflict_from: Option<LogIndex> = None;
    for (offset, entry) in req.entries.iter().enumerate() {
        let index = req.prev_log_index + 1 + offset as LogIndex;
        if index <= state.log.append_index() {
            if state.log.term_at(index) != entry.term {
                conflict_from = Some(index);
                break;
            }
        } else {
            conflict_from = Some(index);
            break;
        }
    }

    let last_new_index = req.prev_log_index + req.entries.len() as LogIndex;

    if let Some(from_index) = conflict_from {
        if from_index <= state.log.append_index() {
            outcome = outcome.truncate_from(from_index);
        }
        let to_append: Vec<_> = req
            .entries
            .iter()
            .skip((from_index - (req.prev_log_index + 1)) as usize)
            .cloned()
            .collect();
        if !to_append.is_empty() {
            outcome.log_ops.push(LogOp::Append(to_append));
        }
    }

    if req.leader_commit > state.commit_index {
        outcome = outcome.with_commit_index(req.leader_commit.min(last_new_index));
    }

    outcome.send(
        req.from,
        RaftMessage::AppendEntriesResponse(AppendEntriesResponse {
            from: state.myself,
            term: check.effective_term,
            success: true,
            match_index: last_new_index,
        }),
    )
}

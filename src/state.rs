//! Persistent vote/term bookkeeping and the aggregate `RaftState` a role
//! handler reads from.

use crate::error::SafetyViolation;
use crate::log::RaftLog;
use crate::types::{LogIndex, MemberId, Term};
use std::collections::BTreeMap;

/// `(term, votedFor)` persisted once per term.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct VoteState {
    pub term: Term,
    pub voted_for: Option<MemberId>,
}

impl VoteState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the vote-update rules:
    /// - a term change resets `voted_for` unconditionally;
    /// - within the same term, a first vote is accepted;
    /// - a second, different vote in the same term is a safety violation.
    ///
    /// Returns `Ok(true)` if persisted state changed.
    pub fn update(
        &mut self,
        new_term: Term,
        new_voted_for: Option<MemberId>,
    ) -> Result<bool, SafetyViolation> {
        if new_term < self.term {
            return Err(SafetyViolation::TermRegression {
                observed: new_term,
                current: self.term,
            });
        }
        if new_term != self.term {
            self.term = new_term;
            self.voted_for = new_voted_for;
            return Ok(true);
        }
        match (self.voted_for, new_voted_for) {
            (None, Some(candidate)) => {
                self.voted_for = Some(candidate);
                Ok(true)
            }
            (None, None) => Ok(false),
            (Some(existing), Some(attempted)) if existing == attempted => Ok(false),
            (Some(existing), Some(attempted)) => Err(SafetyViolation::DoubleVote {
                term: self.term,
                existing,
                attempted,
            }),
            (Some(_), None) => Ok(false),
        }
    }
}

/// Current term alone, persisted independently of `VoteState`: the spec
/// treats the vote record and the term counter as two separate durable
/// files (`StateMarshal<VoteState>`, `StateMarshal<TermState>`), the way a
/// segmented log keeps its own header apart from the vote file. `RaftState`
/// keeps one alongside `votes` and `RaftInstance` persists both through
/// `PersistentState::save_term_state` whenever the term advances.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TermState {
    pub term: Term,
}

impl TermState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts only monotonically non-decreasing terms.
    pub fn update(&mut self, new_term: Term) -> Result<(), SafetyViolation> {
        if new_term < self.term {
            return Err(SafetyViolation::TermRegression {
                observed: new_term,
                current: self.term,
            });
        }
        self.term = new_term;
        Ok(())
    }
}

/// Per-follower replication bookkeeping the leader maintains: matchIndex,
/// nextIndex, and the index last sent to that follower.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FollowerProgress {
    pub match_index: LogIndex,
    pub next_index: LogIndex,
    pub last_sent_index: LogIndex,
}

/// The aggregate state a role handler reads from. Handlers never mutate
/// this directly; they read it and return an
/// [`crate::outcome::Outcome`] which `RaftInstance` applies.
pub struct RaftState<D, L: RaftLog<D>> {
    pub myself: MemberId,
    pub voting_members: Vec<MemberId>,
    pub votes: VoteState,
    pub term_state: TermState,
    pub log: L,
    pub commit_index: LogIndex,
    pub last_applied: LogIndex,
    pub current_leader: Option<MemberId>,
    /// Only populated while this node is Leader.
    pub followers: BTreeMap<MemberId, FollowerProgress>,
    _marker: std::marker::PhantomData<D>,
}

impl<D, L: RaftLog<D>> RaftState<D, L> {
    pub fn new(myself: MemberId, voting_members: Vec<MemberId>, log: L) -> Self {
        Self {
            myself,
            voting_members,
            votes: VoteState::new(),
            term_state: TermState::new(),
            log,
            commit_index: -1,
            last_applied: -1,
            current_leader: None,
            followers: BTreeMap::new(),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn quorum_size(&self) -> usize {
        self.voting_members.len() / 2 + 1
    }

    pub fn is_voting_member(&self, id: MemberId) -> bool {
        self.voting_members.contains(&id)
    }

    pub fn last_log_index(&self) -> LogIndex {
        self.log.append_index()
    }

    pub fn last_log_term(&self) -> Term {
        self.log.term_at(self.log.append_index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_state_accepts_first_vote_in_term() {
        let mut vs = VoteState::new();
        let changed = vs.update(1, Some(MemberId(2))).unwrap();
        assert!(changed);
        assert_eq!(vs.voted_for, Some(MemberId(2)));
    }

    #[test]
    fn vote_state_resets_on_term_change() {
        let mut vs = VoteState::new();
        vs.update(1, Some(MemberId(2))).unwrap();
        vs.update(2, None).unwrap();
        assert_eq!(vs.term, 2);
        assert_eq!(vs.voted_for, None);
    }

    #[test]
    fn vote_state_rejects_double_vote_same_term() {
        let mut vs = VoteState::new();
        vs.update(1, Some(MemberId(2))).unwrap();
        let err = vs.update(1, Some(MemberId(3))).unwrap_err();
        assert!(matches!(err, SafetyViolation::DoubleVote { .. }));
    }

    #[test]
    fn vote_state_idempotent_same_vote() {
        let mut vs = VoteState::new();
        vs.update(1, Some(MemberId(2))).unwrap();
        let changed = vs.update(1, Some(MemberId(2))).unwrap();
        assert!(!changed);
    }

    #[test]
    fn vote_state_rejects_term_regression() {
        let mut vs = VoteState::new();
        vs.update(5, None).unwrap();
        let err = vs.update(4, None).unwrap_err();
        assert!(matches!(err, SafetyViolation::TermRegression { .. }));
    }

    #[test]
    fn term_state_rejects_regression() {
        let mut ts = TermState::new();
        ts.update(3).unwrap();
        assert!(ts.update(2).is_err());
        assert!(ts.update(3).is_ok());
    }
}

//! End-to-end simulation of a 3-node cluster driven directly through the
//! pure role handlers, election, and `RaftState`/`RaftLog` — no
//! `RaftInstance`/tokio involved. This exercises term monotonicity,
//! election safety, at-most-one-vote, and commit monotonicity across a
//! full election + replication + commit cycle, the way async-raft's
//! `tests/fixtures::RaftRouter` harness exercises `RaftCore` end to end,
//! but synchronously since every collaborator here is a pure function over
//! an explicit state value.

use pretty_assertions::assert_eq;
use raft_core::log::{MemoryRaftLog, RaftLog};
use raft_core::messages::{Directed, RaftMessage};
use raft_core::outcome::{LogOp, Outcome, Role};
use raft_core::role::{candidate, follower, leader};
use raft_core::types::LogEntry;
use raft_core::role::candidate::VoteTally;
use raft_core::state::RaftState;
use raft_core::types::{MemberId, StoreId};

type Payload = &'static str;

const N1: MemberId = MemberId(1);
const N2: MemberId = MemberId(2);
const N3: MemberId = MemberId(3);

fn store_id() -> StoreId {
    StoreId {
        creation_time: 0,
        random_id: 0,
        upgrade_time: 0,
        upgrade_id: 0,
    }
}

struct Node {
    state: RaftState<Payload, MemoryRaftLog<Payload>>,
    role: Role,
}

impl Node {
    fn new(id: MemberId, members: Vec<MemberId>) -> Self {
        Self {
            state: RaftState::new(id, members, MemoryRaftLog::new()),
            role: Role::Follower,
        }
    }

    /// A deliberately small re-implementation of `RaftInstance::apply`'s log
    /// and vote bookkeeping, using only the public `VoteState`/`RaftLog`
    /// API — enough to drive the simulation without reaching into
    /// `RaftInstance` internals.
    fn apply(&mut self, outcome: Outcome<Payload>) -> Vec<Directed<RaftMessage<Payload>>> {
        if let Some(term) = outcome.next_term {
            let voted_for = outcome.next_voted_for.flatten();
            self.state.votes.update(term, voted_for).expect("vote update");
        } else if let Some(voted_for) = outcome.next_voted_for {
            let term = self.state.votes.term;
            self.state.votes.update(term, voted_for).expect("vote update");
        }

        for op in outcome.log_ops {
            match op {
                LogOp::Append(entries) => {
                    for entry in entries {
                        self.state.log.append(entry);
                    }
                }
                LogOp::TruncateFrom(index) => {
                    self.state
                        .log
                        .try_truncate(index, self.state.commit_index)
                        .expect("truncate");
                }
            }
        }

        if let Some(leader) = outcome.next_leader {
            self.state.current_leader = leader;
        }
        if let Some(commit_index) = outcome.commit_index {
            if commit_index > self.state.commit_index {
                self.state.commit_index = commit_index;
            }
        }
        if let Some(role) = outcome.next_role {
            self.role = role;
        }

        outcome.outgoing
    }
}

#[test]
fn election_then_replication_then_commit() {
    let members = vec![N1, N2, N3];
    let mut n1 = Node::new(N1, members.clone());
    let mut n2 = Node::new(N2, members.clone());
    let mut n3 = Node::new(N3, members.clone());

    // --- Election ---
    let mut tally = VoteTally::starting_with_self(N1);
    let election_outcome = raft_core::election::start_election(&n1.state, store_id());
    let requests = n1.apply(election_outcome);
    assert_eq!(n1.role, Role::Candidate);
    assert_eq!(n1.state.votes.term, 1);
    assert_eq!(requests.len(), 2, "one VoteRequest per peer");

    for directed in &requests {
        let req = match &directed.inner {
            RaftMessage::VoteRequest(req) => req,
            other => panic!("expected VoteRequest, got {:?}", other),
        };
        let target = match directed.to {
            x if x == N2 => &mut n2,
            x if x == N3 => &mut n3,
            _ => panic!("unexpected recipient"),
        };
        let resp_outcome = follower::handle_vote_request(&target.state, req);
        let outgoing = target.apply(resp_outcome);
        assert_eq!(target.role, Role::Follower);
        assert_eq!(target.state.votes.term, 1);

        let resp = match &outgoing[0].inner {
            RaftMessage::VoteResponse(resp) => resp.clone(),
            other => panic!("expected VoteResponse, got {:?}", other),
        };
        assert!(resp.granted, "empty logs are equally up to date; vote must be granted");

        let tally_outcome = candidate::handle_vote_response(&n1.state, &mut tally, &resp);
        n1.apply(tally_outcome);
    }

    assert_eq!(n1.role, Role::Leader, "majority of 3 reached after 2 grants");
    assert_eq!(n1.state.current_leader, Some(N1));

    // A second candidate in the same term must be denied by anyone who has
    // already voted (at-most-one-vote).
    let rival_request = raft_core::messages::VoteRequest {
        from: N3,
        term: 1,
        candidate: N3,
        last_log_index: -1,
        last_log_term: 0,
        store_id: store_id(),
    };
    let deny_outcome = follower::handle_vote_request(&n2.state, &rival_request);
    let outgoing = n2.apply(deny_outcome);
    match &outgoing[0].inner {
        RaftMessage::VoteResponse(resp) => assert!(!resp.granted),
        other => panic!("expected VoteResponse, got {:?}", other),
    }

    // --- Replication ---
    n1.state.followers = leader::initial_follower_progress(&n1.state);
    let (propose_outcome, proposal) =
        leader::propose(&n1.state, "put x=1").expect("leader accepts proposal");
    n1.apply(propose_outcome);
    assert_eq!(proposal.index, 0);
    assert_eq!(n1.state.last_log_index(), 0);

    let entry = n1.state.log.entry_at(0).cloned().unwrap();
    let append_req = raft_core::messages::AppendEntriesRequest {
        from: N1,
        term: n1.state.votes.term,
        prev_log_index: -1,
        prev_log_term: 0,
        entries: vec![entry],
        leader_commit: n1.state.commit_index,
    };

    for target in [&mut n2, &mut n3] {
        let outcome = follower::handle_append_entries(&target.state, &append_req);
        let outgoing = target.apply(outcome);
        match &outgoing[0].inner {
            RaftMessage::AppendEntriesResponse(resp) => {
                assert!(resp.success);
                assert_eq!(resp.match_index, 0);
                n1.state.followers.get_mut(&target.state.myself).unwrap().match_index = 0;
            }
            other => panic!("expected AppendEntriesResponse, got {:?}", other),
        }
        assert_eq!(target.state.last_log_index(), 0);
    }

    // --- Commit advancement ---
    let new_commit = leader::recompute_commit_index(&n1.state).expect("quorum reached");
    assert_eq!(new_commit, 0);
    n1.state.commit_index = new_commit;
    assert!(n1.state.commit_index >= 0, "commit monotonicity holds");
}

#[test]
fn stale_term_vote_request_is_denied_without_role_change() {
    let members = vec![N1, N2];
    let mut n2 = Node::new(N2, members);
    n2.state.votes.update(5, None).unwrap();
    n2.role = Role::Follower;

    let stale_request = raft_core::messages::VoteRequest {
        from: N1,
        term: 3,
        candidate: N1,
        last_log_index: -1,
        last_log_term: 0,
        store_id: store_id(),
    };
    let outcome = follower::handle_vote_request(&n2.state, &stale_request);
    let outgoing = n2.apply(outcome);
    assert_eq!(n2.role, Role::Follower);
    assert_eq!(n2.state.votes.term, 5, "term must not move backward");
    match &outgoing[0].inner {
        RaftMessage::VoteResponse(resp) => {
            assert!(!resp.granted);
            assert_eq!(resp.term, 5);
        }
        other => panic!("expected VoteResponse, got {:?}", other),
    }
}

#[test]
fn higher_term_append_entries_forces_follower_and_clamps_commit() {
    let members = vec![N1, N2];
    let mut n2 = Node::new(N2, members);
    // n2 is mid-election for term 2 when a legitimate leader of term 3 reaches it.
    n2.state.votes.update(2, Some(N2)).unwrap();
    n2.role = Role::Candidate;

    let append_req = raft_core::messages::AppendEntriesRequest {
        from: N1,
        term: 3,
        prev_log_index: -1,
        prev_log_term: 0,
        entries: vec![LogEntry::new(3, "put y=2")],
        // Leader believes far more has committed than this follower can
        // have: commit must clamp to the last index this message actually
        // introduces, not leader_commit itself.
        leader_commit: 100,
    };

    let outcome = candidate::handle_append_entries(&n2.state, &append_req);
    let outgoing = n2.apply(outcome);

    assert_eq!(n2.role, Role::Follower, "higher-term AppendEntries forces Follower");
    assert_eq!(n2.state.votes.term, 3);
    assert_eq!(n2.state.last_log_index(), 0);
    assert_eq!(
        n2.state.commit_index, 0,
        "commit_index must clamp to min(leader_commit, lastNewIndex)"
    );

    match &outgoing[0].inner {
        RaftMessage::AppendEntriesResponse(resp) => {
            assert!(resp.success);
            assert_eq!(resp.match_index, 0);
            assert_eq!(resp.term, 3);
        }
        other => panic!("expected AppendEntriesResponse, got {:?}", other),
    }
}

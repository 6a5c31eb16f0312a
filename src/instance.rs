//! `RaftInstance`: the top-level dispatcher.
//!
//! Grounded on async-raft's `RaftCore::main()` `tokio::select!` loop
//! (`async-raft/src/core/mod.rs`) and its `State`-driven sub-loops, but
//! collapsed into a single loop with one message queue: every inbound event
//! is routed to a pure role handler, and the `Outcome` it returns is applied
//! atomically by this instance, which async-raft's mutate-`self`-directly
//! `RaftCore` does not itself need to express since it has no `Outcome`
//! type.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::config::Config;
use crate::error::{ProposeError, RaftError, RaftResult, StorageError};
use crate::log::RaftLog;
use crate::messages::{
    AppendEntriesRequest, AppendEntriesResponse, LogCompactionInfo, RaftMessage, VoteRequest,
    VoteResponse,
};
use crate::metrics::{self, RaftMetrics};
use crate::network::RaftNetwork;
use crate::outcome::{LogOp, Outcome, Role};
use crate::role::candidate::VoteTally;
use crate::role::{candidate, follower, leader};
use crate::shipper::{LogShipper, ShipperContext};
use crate::state::RaftState;
use crate::storage::PersistentState;
use crate::types::{MemberId, Proposal, StoreId};

/// Inbound requests a `RaftInstance` accepts from the transport layer or an
/// embedding application.
pub enum RaftMsg<D> {
    AppendEntries {
        rpc: AppendEntriesRequest<D>,
        tx: oneshot::Sender<AppendEntriesResponse>,
    },
    VoteRequest {
        rpc: VoteRequest,
        tx: oneshot::Sender<VoteResponse>,
    },
    LogCompactionInfo(LogCompactionInfo),
    Propose {
        payload: D,
        tx: oneshot::Sender<Result<Proposal, ProposeError>>,
    },
    Shutdown,
}

/// Events fed back from spawned per-follower send tasks, driving the
/// shipper state machines' `on_match`/`on_mismatch` transitions.
enum ReplicationEvent {
    Matched { follower: MemberId, match_index: i64 },
    Mismatched { follower: MemberId, attempted_index: i64 },
    HigherTerm { term: u64 },
    Unreachable { follower: MemberId },
    VoteResult(VoteResponse),
}

/// A handle for submitting requests to a running `RaftInstance::run` loop,
/// mirroring async-raft's `Raft<D,R,N,S>` public handle around
/// `tx_api`/`rx_metrics`.
#[derive(Clone)]
pub struct RaftHandle<D> {
    tx_api: mpsc::UnboundedSender<RaftMsg<D>>,
    rx_metrics: watch::Receiver<RaftMetrics>,
}

impl<D> RaftHandle<D> {
    pub fn metrics(&self) -> watch::Receiver<RaftMetrics> {
        self.rx_metrics.clone()
    }

    pub fn wait(&self, timeout: Duration) -> metrics::Wait {
        metrics::Wait {
            rx: self.rx_metrics.clone(),
            timeout,
        }
    }

    pub async fn append_entries(
        &self,
        rpc: AppendEntriesRequest<D>,
    ) -> RaftResult<AppendEntriesResponse> {
        let (tx, rx) = oneshot::channel();
        self.tx_api
            .send(RaftMsg::AppendEntries { rpc, tx })
            .map_err(|_| RaftError::ShuttingDown)?;
        rx.await.map_err(|_| RaftError::ShuttingDown)
    }

    pub async fn vote_request(&self, rpc: VoteRequest) -> RaftResult<VoteResponse> {
        let (tx, rx) = oneshot::channel();
        self.tx_api
            .send(RaftMsg::VoteRequest { rpc, tx })
            .map_err(|_| RaftError::ShuttingDown)?;
        rx.await.map_err(|_| RaftError::ShuttingDown)
    }

    pub fn log_compaction_info(&self, rpc: LogCompactionInfo) -> RaftResult<()> {
        self.tx_api
            .send(RaftMsg::LogCompactionInfo(rpc))
            .map_err(|_| RaftError::ShuttingDown)
    }

    pub async fn propose(&self, payload: D) -> Result<Proposal, ProposeError> {
        let (tx, rx) = oneshot::channel();
        self.tx_api
            .send(RaftMsg::Propose { payload, tx })
            .map_err(|_| ProposeError::ShuttingDown)?;
        rx.await.map_err(|_| ProposeError::ShuttingDown)?
    }

    pub fn shutdown(&self) {
        let _ = self.tx_api.send(RaftMsg::Shutdown);
    }
}

pub struct RaftInstance<D, L, N, P>
where
    D: Clone + Send + Sync + 'static,
    L: RaftLog<D> + Send,
    N: RaftNetwork<D>,
    P: PersistentState,
{
    state: RaftState<D, L>,
    role: Role,
    config: Config,
    store_id: StoreId,
    network: Arc<N>,
    persistent: Arc<P>,
    candidate_tally: Option<VoteTally>,
    shippers: BTreeMap<MemberId, LogShipper>,
    metrics_tx: watch::Sender<RaftMetrics>,
    rx_api: mpsc::UnboundedReceiver<RaftMsg<D>>,
    tx_repl: mpsc::UnboundedSender<ReplicationEvent>,
    rx_repl: mpsc::UnboundedReceiver<ReplicationEvent>,
    election_deadline: Instant,
}

impl<D, L, N, P> RaftInstance<D, L, N, P>
where
    D: Clone + Send + Sync + 'static,
    L: RaftLog<D> + Send,
    N: RaftNetwork<D>,
    P: PersistentState,
{
    pub fn new(
        myself: MemberId,
        voting_members: Vec<MemberId>,
        log: L,
        config: Config,
        store_id: StoreId,
        network: Arc<N>,
        persistent: Arc<P>,
    ) -> (Self, RaftHandle<D>) {
        let (tx_api, rx_api) = mpsc::unbounded_channel();
        let (tx_repl, rx_repl) = mpsc::unbounded_channel();
        let (metrics_tx, metrics_rx) = metrics::channel(myself);
        let state = RaftState::new(myself, voting_members, log);
        let election_deadline = Instant::now();

        let instance = Self {
            state,
            role: Role::Follower,
            config,
            store_id,
            network,
            persistent,
            candidate_tally: None,
            shippers: BTreeMap::new(),
            metrics_tx,
            rx_api,
            tx_repl,
            rx_repl,
            election_deadline,
        };
        let handle = RaftHandle {
            tx_api,
            rx_metrics: metrics_rx,
        };
        (instance, handle)
    }

    /// Loads persisted vote/term state; call once before `run`.
    pub async fn load_persistent_state(&mut self) -> RaftResult<()> {
        self.state.votes = self
            .persistent
            .load_vote_state()
            .await
            .map_err(|e| RaftError::Storage(StorageError(e)))?;
        self.state.term_state = self
            .persistent
            .load_term_state()
            .await
            .map_err(|e| RaftError::Storage(StorageError(e)))?;
        Ok(())
    }

    fn random_election_timeout(&self) -> Duration {
        let min = self.config.election_timeout_min_ms;
        let max = self.config.election_timeout_max_ms;
        let millis = rand::thread_rng().gen_range(min..=max);
        Duration::from_millis(millis)
    }

    fn arm_election_timer(&mut self) {
        self.election_deadline = Instant::now() + self.random_election_timeout();
    }

    fn publish_metrics(&self) {
        let leader_metrics = if self.role == Role::Leader {
            Some(
                self.shippers
                    .iter()
                    .map(|(id, shipper)| {
                        let matched = self
                            .state
                            .followers
                            .get(id)
                            .map(|p| p.match_index)
                            .unwrap_or(-1);
                        (
                            *id,
                            metrics::FollowerMetrics {
                                matched,
                                shipper_state: shipper.state(),
                            },
                        )
                    })
                    .collect(),
            )
        } else {
            None
        };
        let snapshot = RaftMetrics {
            id: self.state.myself,
            role: self.role,
            term: self.state.votes.term,
            last_log_index: self.state.last_log_index(),
            commit_index: self.state.commit_index,
            last_applied: self.state.last_applied,
            current_leader: self.state.current_leader,
            leader: leader_metrics,
        };
        let _ = self.metrics_tx.send(snapshot);
    }

    /// Applies an `Outcome` atomically: persists any vote/term change, then
    /// the log mutation, then publishes metrics and hands outgoing messages
    /// to the network. Persisting before emitting is load-bearing: a granted
    /// vote or appended entry must survive a crash before anyone is told
    /// about it.
    async fn apply(&mut self, outcome: Outcome<D>) -> RaftResult<()> {
        let role_changed = outcome.next_role.is_some() && outcome.next_role != Some(self.role);
        let became_leader = role_changed && outcome.next_role == Some(Role::Leader);
        let left_leader = role_changed && self.role == Role::Leader && !became_leader;

        if let Some(term) = outcome.next_term {
            self.state.term_state.update(term).map_err(|e| {
                tracing::error!(error = %e, "safety violation applying term state");
                RaftError::Fatal(e)
            })?;
            self.persistent
                .save_term_state(&self.state.term_state)
                .await
                .map_err(|e| RaftError::Storage(StorageError(e)))?;

            let voted_for = outcome.next_voted_for.flatten();
            self.state.votes.update(term, voted_for).map_err(|e| {
                tracing::error!(error = %e, "safety violation applying vote state");
                RaftError::Fatal(e)
            })?;
            self.persistent
                .save_vote_state(&self.state.votes)
                .await
                .map_err(|e| RaftError::Storage(StorageError(e)))?;
        } else if let Some(voted_for) = outcome.next_voted_for {
            let term = self.state.votes.term;
            self.state.votes.update(term, voted_for).map_err(|e| {
                tracing::error!(error = %e, "safety violation applying vote state");
                RaftError::Fatal(e)
            })?;
            self.persistent
                .save_vote_state(&self.state.votes)
                .await
                .map_err(|e| RaftError::Storage(StorageError(e)))?;
        }

        for op in outcome.log_ops {
            match op {
                LogOp::Append(entries) => {
                    for entry in entries {
                        self.state.log.append(entry);
                    }
                }
                LogOp::TruncateFrom(index) => {
                    if self.role == Role::Leader {
                        let violation = crate::error::SafetyViolation::LeaderSelfTruncate { index };
                        tracing::error!(error = %violation, "safety violation: leader asked to truncate its own log");
                        return Err(RaftError::Fatal(violation));
                    }
                    self.state
                        .log
                        .try_truncate(index, self.state.commit_index)
                        .map_err(|e| {
                            tracing::error!(error = %e, "safety violation truncating log");
                            RaftError::Fatal(e)
                        })?;
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
            if role != self.role {
                tracing::info!(
                    id = %self.state.myself,
                    term = self.state.votes.term,
                    from = ?self.role,
                    to = ?role,
                    "role transition"
                );
            }
            self.role = role;
        }

        if outcome.reset_election_timer {
            self.arm_election_timer();
        }

        if became_leader {
            self.enter_leader();
        } else if left_leader {
            self.exit_leader();
        }

        for directed in outcome.outgoing {
            self.dispatch(directed.to, directed.inner);
        }

        self.publish_metrics();
        Ok(())
    }

    fn enter_leader(&mut self) {
        self.state.followers = leader::initial_follower_progress(&self.state);
        self.shippers.clear();
        let followers: Vec<MemberId> = self.state.followers.keys().copied().collect();
        for follower_id in followers {
            let mut shipper = LogShipper::new(follower_id);
            let ctx = self.shipper_ctx();
            let outgoing = shipper.start(&ctx);
            self.shippers.insert(follower_id, shipper);
            for directed in outgoing {
                self.dispatch(directed.to, directed.inner);
            }
        }
    }

    fn exit_leader(&mut self) {
        for shipper in self.shippers.values_mut() {
            shipper.stop();
        }
        self.shippers.clear();
        self.state.followers.clear();
        self.candidate_tally = None;
    }

    fn shipper_ctx(&self) -> ShipperContext<'_, D, L> {
        ShipperContext::new(
            self.state.myself,
            self.state.votes.term,
            &self.state.log,
            self.state.commit_index,
            self.config.catchup_batch_size,
        )
    }

    /// Hands a single outbound message to the network on a spawned task,
    /// feeding the response back through `tx_repl` when it concerns a
    /// `LogShipper`. Outbound emission happens on worker tasks since the
    /// transport is asynchronous and must not block the instance's own
    /// message loop.
    fn dispatch(&self, to: MemberId, message: RaftMessage<D>) {
        let network = self.network.clone();
        let tx_repl = self.tx_repl.clone();
        match message {
            RaftMessage::VoteRequest(rpc) => {
                tokio::spawn(async move {
                    if let Ok(resp) = network.send_vote_request(to, rpc).await {
                        let _ = tx_repl.send(ReplicationEvent::VoteResult(resp));
                    }
                });
            }
            RaftMessage::AppendEntries(rpc) => {
                let my_term = rpc.term;
                let prev_sent = rpc.prev_log_index;
                let entry_count = rpc.entries.len() as i64;
                tokio::spawn(async move {
                    match network.send_append_entries(to, rpc).await {
                        Ok(resp) if resp.term > my_term => {
                            let _ = tx_repl.send(ReplicationEvent::HigherTerm { term: resp.term });
                        }
                        Ok(resp) if resp.success => {
                            let match_index = if resp.match_index >= 0 {
                                resp.match_index
                            } else {
                                prev_sent + entry_count
                            };
                            let _ = tx_repl.send(ReplicationEvent::Matched {
                                follower: to,
                                match_index,
                            });
                        }
                        Ok(_) => {
                            let _ = tx_repl.send(ReplicationEvent::Mismatched {
                                follower: to,
                                attempted_index: prev_sent,
                            });
                        }
                        Err(_) => {
                            let _ = tx_repl.send(ReplicationEvent::Unreachable { follower: to });
                        }
                    }
                });
            }
            RaftMessage::LogCompactionInfo(rpc) => {
                tokio::spawn(async move {
                    let _ = network.send_log_compaction_info(to, rpc).await;
                });
            }
            RaftMessage::AppendEntriesResponse(_) | RaftMessage::VoteResponse(_) => {
                // Produced only by the receiving side's handlers and
                // delivered back to the requester by the transport; never
                // dispatched outbound from here.
            }
        }
    }

    async fn handle_replication_event(&mut self, event: ReplicationEvent) -> RaftResult<()> {
        if let ReplicationEvent::VoteResult(resp) = event {
            if self.role != Role::Candidate {
                return Ok(());
            }
            let mut tally = match self.candidate_tally.take() {
                Some(tally) => tally,
                None => VoteTally::starting_with_self(self.state.myself),
            };
            let outcome = candidate::handle_vote_response(&self.state, &mut tally, &resp);
            self.candidate_tally = Some(tally);
            return self.apply(outcome).await;
        }

        if self.role != Role::Leader {
            return Ok(());
        }
        match event {
            ReplicationEvent::VoteResult(_) => unreachable!("handled above"),
            ReplicationEvent::HigherTerm { term } => {
                let outcome = Outcome::new()
                    .with_role(Role::Follower)
                    .with_term(term)
                    .with_voted_for(None);
                self.apply(outcome).await?;
            }
            ReplicationEvent::Matched { follower, match_index } => {
                if let Some(progress) = self.state.followers.get_mut(&follower) {
                    progress.match_index = progress.match_index.max(match_index);
                }
                let ctx = self.shipper_ctx();
                let outgoing = if let Some(shipper) = self.shippers.get_mut(&follower) {
                    shipper.on_match(&ctx, match_index)
                } else {
                    Vec::new()
                };
                for directed in outgoing {
                    self.dispatch(directed.to, directed.inner);
                }
                if let Some(new_commit) = leader::recompute_commit_index(&self.state) {
                    self.state.commit_index = new_commit;
                }
                self.publish_metrics();
            }
            ReplicationEvent::Mismatched { follower, attempted_index } => {
                let ctx = self.shipper_ctx();
                let outgoing = if let Some(shipper) = self.shippers.get_mut(&follower) {
                    shipper.on_mismatch(&ctx, attempted_index)
                } else {
                    Vec::new()
                };
                for directed in outgoing {
                    self.dispatch(directed.to, directed.inner);
                }
            }
            ReplicationEvent::Unreachable { follower } => {
                tracing::debug!(%follower, "append_entries send failed, will retry on next heartbeat");
            }
        }
        Ok(())
    }

    async fn handle_heartbeat_tick(&mut self) {
        if self.role != Role::Leader {
            return;
        }
        let ctx = self.shipper_ctx();
        let followers: Vec<MemberId> = self.shippers.keys().copied().collect();
        let mut all_outgoing = Vec::new();
        for follower_id in followers {
            if let Some(shipper) = self.shippers.get_mut(&follower_id) {
                all_outgoing.extend(shipper.on_timeout(&ctx));
            }
        }
        for directed in all_outgoing {
            self.dispatch(directed.to, directed.inner);
        }
    }

    async fn handle_election_timeout(&mut self) -> RaftResult<()> {
        let outcome = match self.role {
            Role::Follower | Role::Candidate => {
                self.candidate_tally = Some(VoteTally::starting_with_self(self.state.myself));
                crate::election::start_election(&self.state, self.store_id)
            }
            Role::Leader => return Ok(()),
        };
        self.apply(outcome).await
    }

    async fn handle_api_message(&mut self, msg: RaftMsg<D>) -> RaftResult<bool> {
        match msg {
            RaftMsg::Shutdown => return Ok(false),
            RaftMsg::AppendEntries { rpc, tx } => {
                let outcome = match self.role {
                    Role::Follower => follower::handle_append_entries(&self.state, &rpc),
                    Role::Candidate => candidate::handle_append_entries(&self.state, &rpc),
                    Role::Leader => leader::handle_append_entries(&self.state, &rpc),
                };
                let response = extract_append_response(&outcome, &self.state.myself, &rpc);
                self.apply(outcome).await?;
                let _ = tx.send(response);
            }
            RaftMsg::VoteRequest { rpc, tx } => {
                let outcome = match self.role {
                    Role::Follower => follower::handle_vote_request(&self.state, &rpc),
                    Role::Candidate => candidate::handle_vote_request(&self.state, &rpc),
                    Role::Leader => leader::handle_vote_request(&self.state, &rpc),
                };
                let response = extract_vote_response(&outcome, &self.state.myself, &rpc);
                self.apply(outcome).await?;
                let _ = tx.send(response);
            }
            RaftMsg::LogCompactionInfo(info) => {
                // This node is a follower receiving a signal that the
                // entries it needs are gone; the store-copy reaction is an
                // external collaborator. We only log it here.
                tracing::info!(term = info.term, prev_index = info.prev_index, from = ?info.from, "received log compaction signal");
            }
            RaftMsg::Propose { payload, tx } => {
                if self.role != Role::Leader {
                    let _ = tx.send(Err(ProposeError::NotLeader {
                        leader_hint: self.state.current_leader,
                    }));
                    return Ok(true);
                }
                match leader::propose(&self.state, payload) {
                    Ok((outcome, proposal)) => {
                        self.apply(outcome).await?;
                        self.notify_shippers_of_new_entry(proposal.index);
                        let _ = tx.send(Ok(proposal));
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                    }
                }
            }
        }
        Ok(true)
    }

    fn notify_shippers_of_new_entry(&mut self, index: i64) {
        let ctx = self.shipper_ctx();
        let entry = match self.state.log.entry_at(index).cloned() {
            Some(entry) => entry,
            None => return,
        };
        let followers: Vec<MemberId> = self.shippers.keys().copied().collect();
        let mut all_outgoing = Vec::new();
        for follower_id in followers {
            if let Some(shipper) = self.shippers.get_mut(&follower_id) {
                all_outgoing.extend(shipper.on_new_entries(&ctx, index - 1, vec![entry.clone()]));
            }
        }
        for directed in all_outgoing {
            self.dispatch(directed.to, directed.inner);
        }
    }

    /// Drives the instance until a `Shutdown` message arrives or the API
    /// channel closes. This is the single logical message-processing task
    /// for the instance: every role handler invocation happens here or in
    /// code this loop calls directly.
    pub async fn run(mut self) -> RaftResult<()> {
        self.arm_election_timer();
        self.publish_metrics();
        loop {
            let heartbeat = Duration::from_millis(self.config.heartbeat_interval_ms);
            tokio::select! {
                _ = tokio::time::sleep_until(self.election_deadline) => {
                    self.handle_election_timeout().await?;
                }
                _ = tokio::time::sleep(heartbeat), if self.role == Role::Leader => {
                    self.handle_heartbeat_tick().await;
                }
                event = self.rx_repl.recv() => {
                    match event {
                        Some(event) => self.handle_replication_event(event).await?,
                        None => {}
                    }
                }
                msg = self.rx_api.recv() => {
                    match msg {
                        Some(msg) => {
                            if !self.handle_api_message(msg).await? {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }
}

fn extract_append_response<D>(
    outcome: &Outcome<D>,
    myself: &MemberId,
    rpc: &AppendEntriesRequest<D>,
) -> AppendEntriesResponse {
    outcome
        .outgoing
        .iter()
        .find_map(|d| match &d.inner {
            RaftMessage::AppendEntriesResponse(resp) => Some(resp.clone()),
            _ => None,
        })
        .unwrap_or(AppendEntriesResponse {
            from: *myself,
            term: outcome.next_term.unwrap_or(rpc.term),
            success: false,
            match_index: -1,
        })
}

fn extract_vote_response<D>(
    outcome: &Outcome<D>,
    myself: &MemberId,
    rpc: &VoteRequest,
) -> VoteResponse {
    outcome
        .outgoing
        .iter()
        .find_map(|d| match &d.inner {
            RaftMessage::VoteResponse(resp) => Some(resp.clone()),
            _ => None,
        })
        .unwrap_or(VoteResponse {
            from: *myself,
            term: outcome.next_term.unwrap_or(rpc.term),
            granted: false,
        })
}

//! `LogShipper`: per-follower replication state machine.
//!
//! Grounded on async-raft's `ReplicationCore`
//! (`async-raft/src/replication/mod.rs`, `TargetReplState::{LineRate,
//! Lagging, Snapshotting}`), but reshaped into a plain synchronous struct
//! driven by `RaftInstance`'s single task rather than an independent tokio
//! task with its own channel, so that every transition still goes through
//! the same atomic Outcome-application path as everything else a free-
//! running task would complicate. `Snapshotting` has no counterpart here:
//! instead of streaming a snapshot itself, a shipper that needs data older
//! than the retained prefix emits `LogCompactionInfo` and leaves recovery
//! to the out-of-scope store-copy subsystem.

use crate::log::RaftLog;
use crate::messages::{AppendEntriesRequest, Directed, LogCompactionInfo, RaftMessage};
use crate::types::{LogEntry, LogIndex, MemberId, Term, NO_INDEX};

/// The three exhaustive replication states.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ShipperState {
    Mismatch,
    Pipeline,
    Catchup,
}

/// Everything a shipper needs to decide what to send, borrowed fresh for
/// each call from `RaftInstance`'s current leader-role state.
pub struct ShipperContext<'a, D, L: RaftLog<D>> {
    pub myself: MemberId,
    pub term: Term,
    pub log: &'a L,
    pub leader_commit: LogIndex,
    pub catchup_batch_size: u64,
    _marker: std::marker::PhantomData<D>,
}

impl<'a, D, L: RaftLog<D>> ShipperContext<'a, D, L> {
    pub fn new(
        myself: MemberId,
        term: Term,
        log: &'a L,
        leader_commit: LogIndex,
        catchup_batch_size: u64,
    ) -> Self {
        Self {
            myself,
            term,
            log,
            leader_commit,
            catchup_batch_size,
            _marker: std::marker::PhantomData,
        }
    }
}

/// Tracks replication progress for exactly one follower.
#[derive(Debug)]
pub struct LogShipper {
    follower: MemberId,
    state: ShipperState,
    last_sent_index: LogIndex,
}

impl LogShipper {
    /// A freshly constructed shipper starts in MISMATCH — with no prior
    /// match confirmed, `on_new_entries` must be dropped rather than
    /// streamed — until `start()` moves it to PIPELINE.
    pub fn new(follower: MemberId) -> Self {
        Self {
            follower,
            state: ShipperState::Mismatch,
            last_sent_index: NO_INDEX,
        }
    }

    pub fn state(&self) -> ShipperState {
        self.state
    }

    pub fn last_sent_index(&self) -> LogIndex {
        self.last_sent_index
    }

    fn append_entries<D: Clone, L: RaftLog<D>>(
        &self,
        ctx: &ShipperContext<D, L>,
        prev_log_index: LogIndex,
        entries: Vec<LogEntry<D>>,
    ) -> Directed<RaftMessage<D>> {
        Directed::new(
            self.follower,
            RaftMessage::AppendEntries(AppendEntriesRequest {
                from: ctx.myself,
                term: ctx.term,
                prev_log_index,
                prev_log_term: ctx.log.term_at(prev_log_index),
                entries,
                leader_commit: ctx.leader_commit,
            }),
        )
    }

    fn compaction_info<D, L: RaftLog<D>>(
        &self,
        ctx: &ShipperContext<D, L>,
    ) -> Directed<RaftMessage<D>> {
        Directed::new(
            self.follower,
            RaftMessage::LogCompactionInfo(LogCompactionInfo {
                from: ctx.myself,
                term: ctx.term,
                prev_index: ctx.log.prev_index(),
            }),
        )
    }

    /// Moves to PIPELINE and sends the current last entry.
    pub fn start<D: Clone, L: RaftLog<D>>(
        &mut self,
        ctx: &ShipperContext<D, L>,
    ) -> Vec<Directed<RaftMessage<D>>> {
        self.state = ShipperState::Pipeline;
        let append_index = ctx.log.append_index();
        let prev_log_index = append_index - 1;
        let entries = match ctx.log.entry_at(append_index) {
            Some(entry) => vec![entry.clone()],
            None => Vec::new(),
        };
        self.last_sent_index = append_index;
        vec![self.append_entries(ctx, prev_log_index, entries)]
    }

    pub fn stop(&mut self) {
        self.state = ShipperState::Mismatch;
    }

    /// Backtracking probe. `attempted_index` is the `prevLogIndex` the
    /// follower just rejected.
    pub fn on_mismatch<D: Clone, L: RaftLog<D>>(
        &mut self,
        ctx: &ShipperContext<D, L>,
        attempted_index: LogIndex,
    ) -> Vec<Directed<RaftMessage<D>>> {
        self.state = ShipperState::Mismatch;
        let floor = ctx.log.prev_index() + 1;
        let naive_next = attempted_index - 1;
        let next_probe = naive_next.max(floor);
        self.last_sent_index = next_probe;

        let mut out = Vec::new();
        if naive_next < floor && ctx.log.prev_index() != NO_INDEX {
            // Backtracking would have crossed the pruned prefix. Nothing has
            // actually been pruned when `prev_index()` is still the fresh
            // sentinel, so there is no compaction to report yet.
            out.push(self.compaction_info(ctx));
        }
        let entries = match ctx.log.entry_at(next_probe) {
            Some(entry) => vec![entry.clone()],
            None => Vec::new(),
        };
        out.push(self.append_entries(ctx, next_probe - 1, entries));
        out
    }

    /// A match was confirmed at `match_index`.
    pub fn on_match<D: Clone, L: RaftLog<D>>(
        &mut self,
        ctx: &ShipperContext<D, L>,
        match_index: LogIndex,
    ) -> Vec<Directed<RaftMessage<D>>> {
        let append_index = ctx.log.append_index();

        if match_index <= ctx.log.prev_index() && match_index < append_index {
            // The entries needed to continue from here were pruned out from
            // under an in-flight match.
            self.state = ShipperState::Mismatch;
            return vec![self.compaction_info(ctx)];
        }

        if match_index >= append_index {
            self.state = ShipperState::Pipeline;
            self.last_sent_index = match_index;
            return Vec::new();
        }

        self.state = ShipperState::Catchup;
        let start = match_index + 1;
        let end = (match_index + ctx.catchup_batch_size as LogIndex).min(append_index);
        let entries: Vec<LogEntry<D>> = ctx
            .log
            .entries_from(start)
            .into_iter()
            .cloned()
            .take((end - start + 1) as usize)
            .collect();
        self.last_sent_index = end;
        vec![self.append_entries(ctx, match_index, entries)]
    }

    /// New entries were appended to the leader's log while streaming. Only
    /// honored from PIPELINE and only when `prev_index` lines up with what
    /// was last sent.
    pub fn on_new_entries<D: Clone, L: RaftLog<D>>(
        &mut self,
        ctx: &ShipperContext<D, L>,
        prev_index: LogIndex,
        entries: Vec<LogEntry<D>>,
    ) -> Vec<Directed<RaftMessage<D>>> {
        if self.state != ShipperState::Pipeline || prev_index != self.last_sent_index {
            return Vec::new();
        }
        if entries.is_empty() {
            return Vec::new();
        }
        self.last_sent_index = prev_index + entries.len() as LogIndex;
        vec![self.append_entries(ctx, prev_index, entries)]
    }

    /// Timer fired with no new event.
    pub fn on_timeout<D: Clone, L: RaftLog<D>>(
        &mut self,
        ctx: &ShipperContext<D, L>,
    ) -> Vec<Directed<RaftMessage<D>>> {
        match self.state {
            ShipperState::Pipeline => {
                let prev = self.last_sent_index;
                vec![self.append_entries(ctx, prev, Vec::new())]
            }
            ShipperState::Mismatch => {
                let entries = match ctx.log.entry_at(self.last_sent_index) {
                    Some(entry) => vec![entry.clone()],
                    None => Vec::new(),
                };
                vec![self.append_entries(ctx, self.last_sent_index - 1, entries)]
            }
            ShipperState::Catchup => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryRaftLog;
    use crate::messages::RaftMessage;

    const LEADER: MemberId = MemberId(1);
    const FOLLOWER: MemberId = MemberId(2);

    fn log_with(n: u64) -> MemoryRaftLog<&'static str> {
        let mut log = MemoryRaftLog::new();
        for _ in 0..n {
            log.append(LogEntry::new(0, "x"));
        }
        log
    }

    fn ctx<D, L: RaftLog<D>>(log: &L) -> ShipperContext<D, L> {
        ShipperContext::new(LEADER, 0, log, -1, 64)
    }

    fn append_payloads<D: Clone>(msgs: &[Directed<RaftMessage<D>>]) -> Vec<Vec<D>> {
        msgs.iter()
            .filter_map(|d| match &d.inner {
                RaftMessage::AppendEntries(req) => {
                    Some(req.entries.iter().map(|e| e.payload.clone()).collect())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn start_sends_last_entry() {
        let log = log_with(2);
        let mut shipper = LogShipper::new(FOLLOWER);
        let out = shipper.start(&ctx(&log));
        assert_eq!(shipper.state(), ShipperState::Pipeline);
        assert_eq!(append_payloads(&out), vec![vec!["x"]]);
    }

    #[test]
    fn mismatch_walks_backward_and_floors() {
        let log = log_with(2);
        let mut shipper = LogShipper::new(FOLLOWER);
        shipper.start(&ctx(&log));
        for _ in 0..3 {
            let out = shipper.on_mismatch(&ctx(&log), 0);
            assert_eq!(shipper.state(), ShipperState::Mismatch);
            assert_eq!(out.len(), 1, "unpruned log must not emit LogCompactionInfo");
            assert_eq!(append_payloads(&out), vec![vec!["x"]]);
            assert_eq!(shipper.last_sent_index(), 0);
        }
    }

    #[test]
    fn match_triggers_catchup_batch() {
        let log = log_with(4);
        let mut shipper = LogShipper::new(FOLLOWER);
        let out = shipper.on_match(&ctx(&log), 0);
        assert_eq!(shipper.state(), ShipperState::Catchup);
        assert_eq!(append_payloads(&out), vec![vec!["x", "x", "x"]]);
        assert_eq!(shipper.last_sent_index(), 3);
    }

    #[test]
    fn pipeline_streams_new_entries() {
        let mut log = log_with(1);
        let mut shipper = LogShipper::new(FOLLOWER);
        shipper.on_match(&ctx(&log), 0);
        assert_eq!(shipper.state(), ShipperState::Pipeline);

        log.append(LogEntry::new(0, "e1"));
        let out = shipper.on_new_entries(&ctx(&log), 0, vec![LogEntry::new(0, "e1")]);
        assert_eq!(append_payloads(&out), vec![vec!["e1"]]);

        log.append(LogEntry::new(0, "e2"));
        let out = shipper.on_new_entries(&ctx(&log), 1, vec![LogEntry::new(0, "e2")]);
        assert_eq!(append_payloads(&out), vec![vec!["e2"]]);
    }

    #[test]
    fn no_streaming_before_match() {
        let log = log_with(1);
        let mut shipper = LogShipper::new(FOLLOWER);
        let out = shipper.on_new_entries(&ctx(&log), 0, vec![LogEntry::new(0, "e1")]);
        assert!(out.is_empty());
        assert_eq!(shipper.state(), ShipperState::Mismatch);
    }

    #[test]
    fn pruning_past_probe_yields_most_recent_available_entry() {
        let mut log = log_with(4);
        log.prune(2);
        let mut shipper = LogShipper::new(FOLLOWER);
        let out = shipper.on_mismatch(&ctx(&log), 0);
        assert_eq!(append_payloads(&out), vec![vec!["x"]]);
        assert_eq!(shipper.last_sent_index(), 3);
    }

    #[test]
    fn compaction_signal_on_match_into_pruned_region() {
        let mut log = log_with(4);
        log.prune(1);
        let mut shipper = LogShipper::new(FOLLOWER);
        let out = shipper.on_match(&ctx(&log), 1);
        assert_eq!(out.len(), 1);
        match &out[0].inner {
            RaftMessage::LogCompactionInfo(info) => {
                assert_eq!(info.prev_index, 1);
                assert_eq!(info.term, 0);
            }
            other => panic!("expected LogCompactionInfo, got {:?}", other),
        }
    }
}

//! The in-memory append-only log.
//!
//! The on-disk segmented log is an external collaborator outside this
//! crate's scope; `MemoryRaftLog` is what this crate ships and tests
//! against, in the same spirit as async-raft's `memstore` reference
//! storage implementation.

use crate::error::SafetyViolation;
use crate::types::{LogEntry, LogIndex, Term, NO_INDEX, NO_TERM};
use std::collections::VecDeque;

/// Append-only ordered log of `(term, payload)` entries with prefix pruning
/// and random read.
pub trait RaftLog<D> {
    /// Appends `entry`, returning the index it was assigned.
    fn append(&mut self, entry: LogEntry<D>) -> LogIndex;

    /// Removes entries with index `>= from_index`. Forbidden when
    /// `from_index <= commit_index`; callers must check before calling.
    fn truncate(&mut self, from_index: LogIndex);

    /// Advances the prune boundary so that entries at index `<= up_to_index`
    /// may become unreadable. Never affects `append_index`.
    fn prune(&mut self, up_to_index: LogIndex);

    /// Index of the last appended entry, or `NO_INDEX` if empty.
    fn append_index(&self) -> LogIndex;

    /// Index of the last pruned entry, or `NO_INDEX` if nothing pruned yet.
    fn prev_index(&self) -> LogIndex;

    /// Term of the entry at `index`, or `NO_TERM` if `index` is `NO_INDEX`,
    /// pruned, or beyond `append_index`.
    fn term_at(&self, index: LogIndex) -> Term;

    /// Reads the entry at `index`, if still retained.
    fn entry_at(&self, index: LogIndex) -> Option<&LogEntry<D>>;

    /// Entries with index `>= from_index`, in order, up to `append_index`.
    fn entries_from(&self, from_index: LogIndex) -> Vec<&LogEntry<D>>;
}

/// `VecDeque`-backed implementation. Indices are translated to deque
/// offsets by subtracting `base_index` (the index that would occupy slot 0
/// were it not pruned).
#[derive(Debug)]
pub struct MemoryRaftLog<D> {
    entries: VecDeque<LogEntry<D>>,
    /// Index of `entries[0]`, i.e. `prev_index + 1` once any entry exists.
    base_index: LogIndex,
    prev_index: LogIndex,
}

// Written by hand: `#[derive(Default)]` would require `D: Default`, which
// the replicated payload type has no reason to satisfy.
impl<D> Default for MemoryRaftLog<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> MemoryRaftLog<D> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            base_index: 0,
            prev_index: NO_INDEX,
        }
    }

    fn offset_of(&self, index: LogIndex) -> Option<usize> {
        if index < self.base_index {
            return None;
        }
        let offset = (index - self.base_index) as usize;
        if offset >= self.entries.len() {
            None
        } else {
            Some(offset)
        }
    }

    /// Checked truncate: returns an error instead of violating the
    /// commit-index invariant: truncating committed entries is a fatal
    /// safety violation.
    pub fn try_truncate(
        &mut self,
        from_index: LogIndex,
        commit_index: LogIndex,
    ) -> Result<(), SafetyViolation> {
        if from_index <= commit_index {
            return Err(SafetyViolation::TruncateCommitted {
                index: from_index,
                commit_index,
            });
        }
        self.truncate(from_index);
        Ok(())
    }

    /// Checked prune: returns an error instead of pruning past the commit
    /// line — pruning must never remove an uncommitted entry.
    pub fn try_prune(
        &mut self,
        up_to_index: LogIndex,
        commit_index: LogIndex,
    ) -> Result<(), SafetyViolation> {
        if up_to_index > commit_index {
            return Err(SafetyViolation::PrunePastCommit {
                index: up_to_index,
                commit_index,
            });
        }
        self.prune(up_to_index);
        Ok(())
    }
}

impl<D> RaftLog<D> for MemoryRaftLog<D> {
    fn append(&mut self, entry: LogEntry<D>) -> LogIndex {
        let index = self.append_index() + 1;
        if self.entries.is_empty() {
            self.base_index = index;
        }
        self.entries.push_back(entry);
        index
    }

    fn truncate(&mut self, from_index: LogIndex) {
        if let Some(offset) = self.offset_of(from_index) {
            self.entries.truncate(offset);
        }
        // from_index beyond append_index: nothing to remove.
    }

    fn prune(&mut self, up_to_index: LogIndex) {
        if up_to_index <= self.prev_index {
            return;
        }
        let to_drop = if up_to_index < self.base_index {
            0
        } else {
            ((up_to_index - self.base_index) as usize + 1).min(self.entries.len())
        };
        for _ in 0..to_drop {
            self.entries.pop_front();
        }
        self.prev_index = up_to_index;
        if self.entries.is_empty() {
            self.base_index = up_to_index + 1;
        } else {
            self.base_index = up_to_index + 1;
        }
    }

    fn append_index(&self) -> LogIndex {
        if self.entries.is_empty() {
            self.prev_index
        } else {
            self.base_index + self.entries.len() as LogIndex - 1
        }
    }

    fn prev_index(&self) -> LogIndex {
        self.prev_index
    }

    fn term_at(&self, index: LogIndex) -> Term {
        if index == NO_INDEX || index == self.prev_index {
            return NO_TERM;
        }
        self.entry_at(index).map(|e| e.term).unwrap_or(NO_TERM)
    }

    fn entry_at(&self, index: LogIndex) -> Option<&LogEntry<D>> {
        self.offset_of(index).map(|off| &self.entries[off])
    }

    fn entries_from(&self, from_index: LogIndex) -> Vec<&LogEntry<D>> {
        let start = from_index.max(self.base_index);
        match self.offset_of(start) {
            Some(start_offset) => self.entries.iter().skip(start_offset).collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(term: Term) -> LogEntry<&'static str> {
        LogEntry::new(term, "x")
    }

    #[test]
    fn append_assigns_dense_indices() {
        let mut log = MemoryRaftLog::new();
        assert_eq!(log.append(entry(1)), 0);
        assert_eq!(log.append(entry(1)), 1);
        assert_eq!(log.append(entry(2)), 2);
        assert_eq!(log.append_index(), 2);
    }

    #[test]
    fn term_at_before_log_is_sentinel() {
        let log: MemoryRaftLog<&'static str> = MemoryRaftLog::new();
        assert_eq!(log.term_at(NO_INDEX), NO_TERM);
        assert_eq!(log.term_at(5), NO_TERM);
    }

    #[test]
    fn truncate_removes_suffix() {
        let mut log = MemoryRaftLog::new();
        log.append(entry(1));
        log.append(entry(1));
        log.append(entry(2));
        log.truncate(1);
        assert_eq!(log.append_index(), 0);
        assert_eq!(log.term_at(1), NO_TERM);
    }

    #[test]
    fn prune_hides_prefix_without_moving_append_index() {
        let mut log = MemoryRaftLog::new();
        for t in 0..4 {
            log.append(entry(t));
        }
        log.prune(1);
        assert_eq!(log.prev_index(), 1);
        assert_eq!(log.append_index(), 3);
        assert_eq!(log.entry_at(0), None);
        assert_eq!(log.entry_at(1), None);
        assert!(log.entry_at(2).is_some());
        assert_eq!(log.term_at(1), NO_TERM);
    }

    #[test]
    fn entries_from_respects_pruned_prefix() {
        let mut log = MemoryRaftLog::new();
        for t in 0..4 {
            log.append(entry(t));
        }
        log.prune(1);
        let got: Vec<Term> = log.entries_from(0).iter().map(|e| e.term).collect();
        assert_eq!(got, vec![2, 3]);
    }

    #[test]
    fn try_truncate_rejects_committed_index() {
        let mut log = MemoryRaftLog::new();
        for t in 0..3 {
            log.append(entry(t));
        }
        let err = log.try_truncate(1, 2).unwrap_err();
        assert!(matches!(err, SafetyViolation::TruncateCommitted { .. }));
    }

    #[test]
    fn try_prune_rejects_past_commit() {
        let mut log = MemoryRaftLog::new();
        for t in 0..3 {
            log.append(entry(t));
        }
        let err = log.try_prune(2, 1).unwrap_err();
        assert!(matches!(err, SafetyViolation::PrunePastCommit { .. }));
    }
}

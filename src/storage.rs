//! External persistence for the durable records the core owns. Grounded on
//! async-raft's `RaftStorage::{get_initial_state, save_hard_state}` and
//! `HardState` (`async-raft/src/storage.rs`), narrowed to vote/term
//! persistence. The on-disk segmented log itself is an external
//! collaborator and is not modeled here; the log this crate ships,
//! `MemoryRaftLog`, is in-memory only and replayed from whatever durable
//! log store the embedder provides at startup.

use crate::state::{TermState, VoteState};
use crate::types::MemberId;
use anyhow::Result;
use async_trait::async_trait;

/// Durable `(term, votedFor)` record, plus the separately persisted term
/// counter (`TermState`) per the spec's "Persistent state files" split.
#[async_trait]
pub trait PersistentState: Send + Sync + 'static {
    /// Loads the last persisted vote state, or a fresh `VoteState` if this
    /// is a pristine node.
    async fn load_vote_state(&self) -> Result<VoteState>;

    /// Persists `state`. Must complete before any message relying on it
    /// (e.g. a granted vote) is handed to the transport.
    async fn save_vote_state(&self, state: &VoteState) -> Result<()>;

    /// Loads the last persisted term counter, or a fresh `TermState` if this
    /// is a pristine node.
    async fn load_term_state(&self) -> Result<TermState>;

    /// Persists `state`. Written alongside `VoteState` whenever the term
    /// advances.
    async fn save_term_state(&self, state: &TermState) -> Result<()>;

    /// Persists this node's own identity, so that a restarted process can
    /// confirm it is rejoining the same logical member slot.
    async fn save_self_id(&self, id: MemberId) -> Result<()>;
}

/// In-memory `PersistentState`, sufficient for tests and for embedding
/// applications that provide their own durability elsewhere.
pub struct MemoryPersistentState {
    votes: tokio::sync::Mutex<VoteState>,
    term: tokio::sync::Mutex<TermState>,
}

impl MemoryPersistentState {
    pub fn new() -> Self {
        Self {
            votes: tokio::sync::Mutex::new(VoteState::new()),
            term: tokio::sync::Mutex::new(TermState::new()),
        }
    }
}

impl Default for MemoryPersistentState {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistentState for MemoryPersistentState {
    async fn load_vote_state(&self) -> Result<VoteState> {
        Ok(*self.votes.lock().await)
    }

    async fn save_vote_state(&self, state: &VoteState) -> Result<()> {
        *self.votes.lock().await = *state;
        Ok(())
    }

    async fn load_term_state(&self) -> Result<TermState> {
        Ok(*self.term.lock().await)
    }

    async fn save_term_state(&self, state: &TermState) -> Result<()> {
        *self.term.lock().await = *state;
        Ok(())
    }

    async fn save_self_id(&self, _id: MemberId) -> Result<()> {
        Ok(())
    }
}

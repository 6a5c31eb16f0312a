//! Raft consensus core for replicating a linearizable operation log among a
//! fixed cluster of graph database peers.
//!
//! This crate covers the consensus core only: the role state machine
//! (Follower/Candidate/Leader), leader election, per-follower log
//! replication, the persistent vote record, and the in-memory log. The
//! on-disk segmented log and snapshot store, the network transport's wire
//! encoding, the store-copy subsystem, membership changes, and the graph
//! storage engine itself are external collaborators reached through the
//! [`network::RaftNetwork`] and [`storage::PersistentState`] traits.

pub mod config;
pub mod election;
pub mod error;
pub mod inflight;
pub mod instance;
pub mod log;
pub mod messages;
pub mod metrics;
pub mod network;
pub mod outcome;
pub mod role;
pub mod shipper;
pub mod state;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::{ProposeError, RaftError, RaftResult};
pub use instance::{RaftHandle, RaftInstance, RaftMsg};
pub use log::{MemoryRaftLog, RaftLog};
pub use outcome::{Outcome, Role};
pub use state::RaftState;
pub use storage::{MemoryPersistentState, PersistentState};
pub use types::{LogEntry, LogIndex, MemberId, Proposal, StoreId, Term};

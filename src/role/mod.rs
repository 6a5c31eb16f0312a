//! Per-role pure handlers. Each function takes a read-only
//! view of [`crate::state::RaftState`] plus an inbound message and returns
//! an [`crate::outcome::Outcome`] for `RaftInstance` to apply.

pub mod candidate;
pub mod common;
pub mod follower;
pub mod leader;

pub use crate::outcome::Role;

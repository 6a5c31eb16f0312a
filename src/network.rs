//! The network/transport seam: an opaque sink the core does not wait on for
//! delivery. The embedding application owns encoding, addressing, and
//! connection management; this crate only needs to hand it messages and
//! await a response.

use crate::messages::{
    AppendEntriesRequest, AppendEntriesResponse, LogCompactionInfo, VoteRequest, VoteResponse,
};
use crate::types::MemberId;
use anyhow::Result;
use async_trait::async_trait;

/// Implemented by the embedding application to actually move bytes between
/// cluster members. The core never blocks on delivery; failures surface as
/// ordinary timeouts to the caller.
#[async_trait]
pub trait RaftNetwork<D>: Send + Sync + 'static {
    async fn send_vote_request(&self, target: MemberId, rpc: VoteRequest) -> Result<VoteResponse>;

    async fn send_append_entries(
        &self,
        target: MemberId,
        rpc: AppendEntriesRequest<D>,
    ) -> Result<AppendEntriesResponse>;

    /// Fire-and-forget: the follower's reaction (store-copy, fast-forward)
    /// is outside this crate's scope.
    async fn send_log_compaction_info(&self, target: MemberId, rpc: LogCompactionInfo) -> Result<()>;
}

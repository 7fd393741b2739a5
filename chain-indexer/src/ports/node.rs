//! Remote node port.

use async_trait::async_trait;
use comet_rpc::{BlockResponse, BlockResultsResponse, CometClient, Status, TxSearchResponse};

use crate::error::Result;
use crate::types::Height;

/// Capability set the pipeline needs from a remote node.
///
/// The production implementation is [`comet_rpc::CometClient`]; tests use a
/// scripted implementation with programmable per-height responses.
///
/// Every call may fail; `EOF`-suffixed transport errors are retried once at
/// the call site inside the client, so callers see only persistent failures.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Fetch the block at a height.
    ///
    /// # Errors
    ///
    /// Returns an error when the node cannot serve the height.
    async fn block(&self, height: Height) -> Result<BlockResponse>;

    /// Fetch the ABCI results at a height.
    ///
    /// # Errors
    ///
    /// Returns an error when the node cannot serve the height.
    async fn block_results(&self, height: Height) -> Result<BlockResultsResponse>;

    /// Fetch all committed transactions at a height.
    ///
    /// # Errors
    ///
    /// Returns an error when the node cannot serve the query.
    async fn tx_search(&self, height: Height) -> Result<TxSearchResponse>;

    /// Fetch the node's status.
    ///
    /// # Errors
    ///
    /// Returns an error when the node is unreachable.
    async fn status(&self) -> Result<Status>;
}

#[async_trait]
impl NodeClient for CometClient {
    async fn block(&self, height: Height) -> Result<BlockResponse> {
        Ok(Self::block(self, height.value()).await?)
    }

    async fn block_results(&self, height: Height) -> Result<BlockResultsResponse> {
        Ok(Self::block_results(self, height.value()).await?)
    }

    async fn tx_search(&self, height: Height) -> Result<TxSearchResponse> {
        Ok(Self::tx_search(self, height.value()).await?)
    }

    async fn status(&self) -> Result<Status> {
        Ok(Self::status(self).await?)
    }
}

//! CometBFT RPC client.
//!
//! This module provides [`CometClient`], the main entry point for talking to
//! a CometBFT full node over JSON-RPC.
//!
//! # Features
//!
//! - **Typed responses**: every method returns a typed struct, never raw JSON
//! - **EOF retry**: `EOF`-suffixed transport errors are retried once per call
//! - **Paginated `tx_search`**: pages are fetched and merged automatically
//!
//! # Example
//!
//! ```ignore
//! use comet_rpc::{CometClient, ClientConfig};
//!
//! let client = CometClient::new("https://rpc.example.com:26657")?;
//!
//! let status = client.status().await?;
//! if status.is_caught_up() {
//!     let block = client.block(status.latest_height()).await?;
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;
use crate::error::{CometError, Result};
use crate::types::{
    BlockResponse, BlockResultsResponse, HeightParams, JsonRpcRequest, JsonRpcResponse, Status,
    TxSearchParams, TxSearchResponse,
};

// ═══════════════════════════════════════════════════════════════════════════════
// COMET RPC CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

/// CometBFT JSON-RPC client.
///
/// Provides the four node calls a block indexer needs: `status`, `block`,
/// `block_results` and `tx_search`.
///
/// # Thread Safety
///
/// This client is `Send + Sync` and can be shared across tasks. The internal
/// `reqwest::Client` is designed for concurrent use.
///
/// # Transient Errors
///
/// Nodes behind load balancers occasionally sever connections mid-response,
/// which surfaces as an error message suffixed with `EOF`. Every call retries
/// exactly once on such errors before surfacing them to the caller.
#[derive(Debug)]
pub struct CometClient {
    /// HTTP client for JSON-RPC requests.
    client: reqwest::Client,

    /// RPC endpoint URL.
    rpc_url: String,

    /// Request ID counter for JSON-RPC correlation.
    request_id: AtomicU64,

    /// Client configuration.
    config: ClientConfig,
}

impl CometClient {
    /// Create a new client with default configuration.
    ///
    /// # Arguments
    ///
    /// * `rpc_url` - HTTP URL of the CometBFT RPC endpoint (usually port 26657)
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(rpc_url: impl Into<String>) -> Result<Self> {
        Self::with_config(rpc_url, ClientConfig::default())
    }

    /// Create a new client with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn with_config(rpc_url: impl Into<String>, config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CometError::Connection(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
            request_id: AtomicU64::new(1),
            config,
        })
    }

    /// Get the RPC URL this client is connected to.
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Get the current configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the next request ID for JSON-RPC correlation.
    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // NODE CALLS
    // ───────────────────────────────────────────────────────────────────────────

    /// Fetch the node's status: chain identity and sync state.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails after the EOF retry.
    #[instrument(skip(self))]
    pub async fn status(&self) -> Result<Status> {
        self.call("status", serde_json::Map::new()).await
    }

    /// Fetch the block at the given height.
    ///
    /// # Errors
    ///
    /// Returns an error if the height does not exist on the node or the call
    /// fails after the EOF retry.
    #[instrument(skip(self))]
    pub async fn block(&self, height: u64) -> Result<BlockResponse> {
        self.call("block", HeightParams::new(height)).await
    }

    /// Fetch the ABCI results for the block at the given height.
    ///
    /// # Errors
    ///
    /// Returns an error if the height does not exist on the node or the call
    /// fails after the EOF retry.
    #[instrument(skip(self))]
    pub async fn block_results(&self, height: u64) -> Result<BlockResultsResponse> {
        self.call("block_results", HeightParams::new(height)).await
    }

    /// Fetch all committed transactions at the given height.
    ///
    /// `tx_search` responses are paginated server-side; this method walks the
    /// pages and merges them, bounded by
    /// [`ClientConfig::max_tx_pages`](crate::config::ClientConfig::max_tx_pages).
    ///
    /// # Errors
    ///
    /// - [`CometError::PageLimitExceeded`] if the page cap is hit before all
    ///   matches are collected
    /// - Any call error after the per-call EOF retry
    #[instrument(skip(self), fields(height))]
    pub async fn tx_search(&self, height: u64) -> Result<TxSearchResponse> {
        let query = format!("\"tx.height={height}\"");
        let per_page = self.config.tx_page_size;

        let mut merged = TxSearchResponse::default();
        let mut page = 1usize;

        loop {
            if page > self.config.max_tx_pages {
                warn!(
                    height,
                    pages = page - 1,
                    max = self.config.max_tx_pages,
                    "Reached max tx_search pages, stopping"
                );
                return Err(CometError::PageLimitExceeded {
                    pages: page - 1,
                    max: self.config.max_tx_pages,
                });
            }

            let params = TxSearchParams {
                query: query.clone(),
                prove: false,
                page: page.to_string(),
                per_page: per_page.to_string(),
                order_by: "asc".into(),
            };

            let response: TxSearchResponse = self.call("tx_search", params).await?;

            debug!(
                height,
                page,
                txs_in_page = response.txs.len(),
                total = response.total_count,
                "tx_search page received"
            );

            merged.total_count = response.total_count;
            merged.txs.extend(response.txs);

            // The final page is the one that completes the advertised total.
            // An empty page also terminates, guarding against nodes that
            // report a stale total_count.
            let done = merged.txs.len() as u64 >= merged.total_count
                || merged.txs.len() < page * per_page;
            if done {
                return Ok(merged);
            }

            page += 1;
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // INTERNAL HELPERS
    // ───────────────────────────────────────────────────────────────────────────

    /// Execute a JSON-RPC call with a single automatic retry on EOF errors.
    async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: serde::Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        match self.call_once(method, &params).await {
            Err(e) if e.is_eof() => {
                warn!(method, error = %e, "EOF from node, retrying once");
                self.call_once(method, &params).await
            }
            other => other,
        }
    }

    /// Execute a single JSON-RPC call.
    async fn call_once<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: serde::Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        let request_id = self.next_request_id();
        let request = JsonRpcRequest::new(method, params, request_id);

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?;

        let body: JsonRpcResponse<R> = response.json().await?;

        if let Some(error) = body.error {
            return Err(error.into_error());
        }

        body.result
            .ok_or_else(|| CometError::InvalidResponse("Missing result in RPC response".into()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    use super::*;

    fn rpc_result(result: serde_json::Value) -> serde_json::Value {
        serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": result})
    }

    fn sample_status() -> serde_json::Value {
        serde_json::json!({
            "node_info": {"network": "testchain-1", "moniker": "node0"},
            "sync_info": {
                "latest_block_height": "500",
                "latest_block_time": "2024-06-01T12:00:00Z",
                "catching_up": false
            }
        })
    }

    #[tokio::test]
    async fn client_creation() {
        let client = CometClient::new("http://localhost:26657").expect("client creation failed");
        assert_eq!(client.rpc_url(), "http://localhost:26657");
    }

    #[tokio::test]
    async fn client_rejects_invalid_config() {
        let config = ClientConfig::default().with_tx_page_size(0);
        assert!(CometClient::with_config("http://localhost:26657", config).is_err());
    }

    #[tokio::test]
    async fn status_round_trip() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(serde_json::json!({"method": "status"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(sample_status())))
            .mount(&mock_server)
            .await;

        let client = CometClient::new(mock_server.uri()).unwrap();
        let status = client.status().await.expect("status failed");

        assert_eq!(status.latest_height(), 500);
        assert!(status.is_caught_up());
    }

    #[tokio::test]
    async fn block_sends_height_param() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(serde_json::json!({
                "method": "block",
                "params": {"height": "100"}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(rpc_result(serde_json::json!({
                    "block_id": {"hash": "AA"},
                    "block": {
                        "header": {
                            "chain_id": "testchain-1",
                            "height": "100",
                            "time": "2024-06-01T12:00:00Z",
                            "proposer_address": "BB"
                        },
                        "data": {"txs": []}
                    }
                }))),
            )
            .mount(&mock_server)
            .await;

        let client = CometClient::new(mock_server.uri()).unwrap();
        let block = client.block(100).await.expect("block failed");
        assert_eq!(block.block.header.height, 100);
    }

    #[tokio::test]
    async fn rpc_error_is_surfaced() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32603, "message": "Internal error", "data": "height 99999 is not available"}
            })))
            .mount(&mock_server)
            .await;

        let client = CometClient::new(mock_server.uri()).unwrap();
        let result = client.block(99999).await;

        assert!(matches!(result, Err(CometError::Rpc { code: -32603, .. })));
    }

    #[tokio::test]
    async fn eof_error_is_retried_once() {
        // First call fails with an EOF-suffixed error, second succeeds.
        struct EofThenOk {
            call_count: Arc<AtomicU32>,
        }

        impl Respond for EofThenOk {
            fn respond(&self, _request: &Request) -> ResponseTemplate {
                let count = self.call_count.fetch_add(1, Ordering::SeqCst);
                if count == 0 {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": 1,
                        "error": {"code": -32603, "message": "post failed: EOF"}
                    }))
                } else {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": 2,
                        "result": {
                            "node_info": {"network": "testchain-1", "moniker": "node0"},
                            "sync_info": {
                                "latest_block_height": "500",
                                "latest_block_time": "2024-06-01T12:00:00Z",
                                "catching_up": false
                            }
                        }
                    }))
                }
            }
        }

        let mock_server = MockServer::start().await;
        let call_count = Arc::new(AtomicU32::new(0));

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(EofThenOk {
                call_count: call_count.clone(),
            })
            .mount(&mock_server)
            .await;

        let client = CometClient::new(mock_server.uri()).unwrap();
        let status = client.status().await.expect("retry should succeed");

        assert_eq!(status.latest_height(), 500);
        assert_eq!(call_count.load(Ordering::SeqCst), 2, "Expected 2 RPC calls");
    }

    #[tokio::test]
    async fn persistent_eof_fails_after_one_retry() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32603, "message": "post failed: EOF"}
            })))
            .expect(2)
            .mount(&mock_server)
            .await;

        let client = CometClient::new(mock_server.uri()).unwrap();
        let result = client.status().await;

        assert!(result.is_err());
        assert!(result.unwrap_err().is_eof());
    }

    #[tokio::test]
    async fn tx_search_merges_pages() {
        // Two pages of one tx each, total_count = 2.
        struct PagedResponder;

        impl Respond for PagedResponder {
            fn respond(&self, request: &Request) -> ResponseTemplate {
                let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
                let page = body["params"]["page"].as_str().unwrap_or("1");
                let hash = if page == "1" { "AAAA" } else { "BBBB" };
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {
                        "txs": [{
                            "hash": hash,
                            "height": "100",
                            "index": 0,
                            "tx_result": {
                                "code": 0,
                                "log": "",
                                "gas_wanted": "0",
                                "gas_used": "0",
                                "events": []
                            },
                            "tx": ""
                        }],
                        "total_count": "2"
                    }
                }))
            }
        }

        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(PagedResponder)
            .mount(&mock_server)
            .await;

        let config = ClientConfig::default().with_tx_page_size(1);
        let client = CometClient::with_config(mock_server.uri(), config).unwrap();
        let response = client.tx_search(100).await.expect("tx_search failed");

        assert_eq!(response.txs.len(), 2);
        assert_eq!(response.txs[0].hash, "AAAA");
        assert_eq!(response.txs[1].hash, "BBBB");
    }

    #[tokio::test]
    async fn tx_search_empty_height() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(serde_json::json!({"method": "tx_search"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(rpc_result(serde_json::json!({
                    "txs": [],
                    "total_count": "0"
                }))),
            )
            .mount(&mock_server)
            .await;

        let client = CometClient::new(mock_server.uri()).unwrap();
        let response = client.tx_search(100).await.expect("tx_search failed");

        assert!(response.txs.is_empty());
        assert_eq!(response.total_count, 0);
    }

    #[tokio::test]
    async fn tx_search_page_limit() {
        // A node that always claims more results than it returns.
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(rpc_result(serde_json::json!({
                    "txs": [{
                        "hash": "AAAA",
                        "height": "100",
                        "index": 0,
                        "tx_result": {"code": 0, "log": "", "gas_wanted": "0", "gas_used": "0", "events": []},
                        "tx": ""
                    }],
                    "total_count": "1000000"
                }))),
            )
            .mount(&mock_server)
            .await;

        let config = ClientConfig::default()
            .with_tx_page_size(1)
            .with_max_tx_pages(3);
        let client = CometClient::with_config(mock_server.uri(), config).unwrap();
        let result = client.tx_search(100).await;

        assert!(matches!(
            result,
            Err(CometError::PageLimitExceeded { pages: 3, max: 3 })
        ));
    }
}

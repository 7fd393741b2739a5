//! Configuration for the CometBFT RPC client.
//!
//! This module provides [`ClientConfig`] for customizing client behavior:
//!
//! - Request timeouts
//! - `tx_search` page size and pagination limits
//!
//! # Example
//!
//! ```
//! use comet_rpc::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::default()
//!     .with_timeout(Duration::from_secs(60))
//!     .with_tx_page_size(50);
//! ```

use std::time::Duration;

use crate::error::{CometError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default timeout for HTTP requests to the RPC endpoint.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of transactions per `tx_search` page.
///
/// 100 is the maximum CometBFT accepts for `per_page`.
pub const DEFAULT_TX_PAGE_SIZE: usize = 100;

/// Default maximum pages to fetch in a single `tx_search` operation.
pub const DEFAULT_MAX_TX_PAGES: usize = 100;

/// Minimum allowed timeout.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum allowed timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum `per_page` value CometBFT accepts.
pub const MAX_TX_PAGE_SIZE: usize = 100;

/// Maximum allowed page limit.
pub const MAX_TX_PAGES: usize = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// CLIENT CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration options for [`CometClient`](crate::CometClient).
///
/// Use the builder pattern to customize settings:
///
/// ```
/// use comet_rpc::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::default()
///     .with_timeout(Duration::from_secs(60))
///     .with_tx_page_size(50)
///     .with_max_tx_pages(200);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout for HTTP calls.
    ///
    /// Default: 30 seconds.
    /// Range: 1-300 seconds.
    pub timeout: Duration,

    /// Number of transactions requested per `tx_search` page.
    ///
    /// Default: 100 (the CometBFT maximum).
    /// Range: 1-100.
    pub tx_page_size: usize,

    /// Maximum number of pages fetched in a single `tx_search` operation.
    ///
    /// This prevents runaway queries against heights with pathological
    /// transaction counts. When this limit is reached, the client returns
    /// [`CometError::PageLimitExceeded`](crate::CometError::PageLimitExceeded).
    ///
    /// Default: 100 pages.
    /// Range: 1-10,000 pages.
    pub max_tx_pages: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            tx_page_size: DEFAULT_TX_PAGE_SIZE,
            max_tx_pages: DEFAULT_MAX_TX_PAGES,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the `tx_search` page size.
    #[must_use]
    pub const fn with_tx_page_size(mut self, size: usize) -> Self {
        self.tx_page_size = size;
        self
    }

    /// Set the maximum number of `tx_search` pages.
    #[must_use]
    pub const fn with_max_tx_pages(mut self, max: usize) -> Self {
        self.max_tx_pages = max;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CometError::InvalidConfig`] if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.timeout < MIN_TIMEOUT || self.timeout > MAX_TIMEOUT {
            return Err(CometError::InvalidConfig(format!(
                "timeout must be between {}s and {}s, got {}s",
                MIN_TIMEOUT.as_secs(),
                MAX_TIMEOUT.as_secs(),
                self.timeout.as_secs()
            )));
        }

        if self.tx_page_size == 0 || self.tx_page_size > MAX_TX_PAGE_SIZE {
            return Err(CometError::InvalidConfig(format!(
                "tx_page_size must be between 1 and {MAX_TX_PAGE_SIZE}, got {}",
                self.tx_page_size
            )));
        }

        if self.max_tx_pages == 0 || self.max_tx_pages > MAX_TX_PAGES {
            return Err(CometError::InvalidConfig(format!(
                "max_tx_pages must be between 1 and {MAX_TX_PAGES}, got {}",
                self.max_tx_pages
            )));
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn builder_methods() {
        let config = ClientConfig::new()
            .with_timeout(Duration::from_secs(60))
            .with_tx_page_size(50)
            .with_max_tx_pages(10);

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.tx_page_size, 50);
        assert_eq!(config.max_tx_pages, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_zero_page_size() {
        let config = ClientConfig::default().with_tx_page_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_oversized_page_size() {
        let config = ClientConfig::default().with_tx_page_size(101);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_short_timeout() {
        let config = ClientConfig::default().with_timeout(Duration::from_millis(100));
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_max_pages() {
        let config = ClientConfig::default().with_max_tx_pages(0);
        assert!(config.validate().is_err());
    }
}

//! Price/liquidity oracle abstraction.
//!
//! The oracle's own implementation is external; this module defines the
//! contract the ledger consumes, the trust gate applied to every quote, an
//! HTTP adapter, a caching wrapper, and a mock for tests.

use crate::domain::{Decimal, Mint};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

pub mod caching;
pub mod http;
pub mod mock;

pub use caching::CachingOracle;
pub use http::HttpPriceOracle;
pub use mock::MockOracle;

/// A price quote with the context needed to decide whether to trust it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenQuote {
    /// Price per whole token in USD.
    pub price: Decimal,
    /// Pool liquidity in USD.
    pub liquidity: Decimal,
    /// When the oracle last observed this market, seconds since epoch.
    pub update_unix_time: i64,
}

impl TokenQuote {
    /// A quote is trusted only with enough liquidity behind it and a
    /// sufficiently fresh observation. Untrusted quotes are treated as
    /// zero-value by callers.
    pub fn is_trusted(&self, min_liquidity_usd: Decimal, max_age_secs: i64, now_secs: i64) -> bool {
        self.liquidity >= min_liquidity_usd
            && now_secs.saturating_sub(self.update_unix_time) <= max_age_secs
    }
}

/// Read-only price oracle contract.
///
/// Implementations must batch `prices_with_liquidity` to amortize round trips.
#[async_trait]
pub trait PriceOracle: Send + Sync + fmt::Debug {
    /// Current USD price for a single mint.
    async fn price(&self, mint: &Mint) -> Result<Decimal, OracleError>;

    /// Batched quotes with liquidity depth and staleness timestamps.
    ///
    /// Mints the oracle knows nothing about are absent from the result.
    async fn prices_with_liquidity(
        &self,
        mints: &[Mint],
    ) -> Result<HashMap<Mint, TokenQuote>, OracleError>;
}

/// Error type for oracle operations.
#[derive(Debug, Clone)]
pub enum OracleError {
    /// Network error (connection timeout, DNS failure).
    NetworkError(String),
    /// HTTP error (429 rate limit, 5xx server error).
    HttpError { status: u16, message: String },
    /// Invalid JSON or malformed response.
    ParseError(String),
    /// Rate limit exceeded.
    RateLimited,
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            OracleError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            OracleError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            OracleError::RateLimited => write!(f, "Rate limited"),
        }
    }
}

impl std::error::Error for OracleError {}

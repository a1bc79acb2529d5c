//! Mock price oracle for testing without network calls.

use super::{OracleError, PriceOracle, TokenQuote};
use crate::domain::{Decimal, Mint};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock oracle returning predefined quotes.
#[derive(Debug, Default)]
pub struct MockOracle {
    quotes: Mutex<HashMap<Mint, TokenQuote>>,
    batch_calls: AtomicUsize,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a quote for a mint.
    pub fn with_quote(self, mint: Mint, quote: TokenQuote) -> Self {
        self.quotes
            .lock()
            .expect("mock lock poisoned")
            .insert(mint, quote);
        self
    }

    /// Convenience: a fresh, deeply liquid quote at the given USD price.
    pub fn with_price(self, mint: Mint, price: Decimal) -> Self {
        let quote = TokenQuote {
            price,
            liquidity: Decimal::from_str_canonical("1000000").expect("static decimal"),
            update_unix_time: chrono::Utc::now().timestamp(),
        };
        self.with_quote(mint, quote)
    }

    /// Replace a quote after construction.
    pub fn set_quote(&self, mint: Mint, quote: TokenQuote) {
        self.quotes
            .lock()
            .expect("mock lock poisoned")
            .insert(mint, quote);
    }

    /// How many batched fetches have been made.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceOracle for MockOracle {
    async fn price(&self, mint: &Mint) -> Result<Decimal, OracleError> {
        self.quotes
            .lock()
            .expect("mock lock poisoned")
            .get(mint)
            .map(|q| q.price)
            .ok_or_else(|| OracleError::ParseError(format!("no quote for {}", mint)))
    }

    async fn prices_with_liquidity(
        &self,
        mints: &[Mint],
    ) -> Result<HashMap<Mint, TokenQuote>, OracleError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let quotes = self.quotes.lock().expect("mock lock poisoned");
        Ok(mints
            .iter()
            .filter_map(|m| quotes.get(m).map(|q| (m.clone(), *q)))
            .collect())
    }
}

//! TTL-caching wrapper around any price oracle.

use super::{OracleError, PriceOracle, TokenQuote};
use crate::cache::{Clock, TtlCache};
use crate::domain::{Decimal, Mint};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fronts an oracle with an injected short-TTL quote cache.
///
/// Quotes for mints the process still holds are inserted pinned, which keeps
/// a held position priced across quiet stretches; the cache and clock are
/// constructed by the caller so tests control both.
pub struct CachingOracle {
    inner: Arc<dyn PriceOracle>,
    cache: TtlCache<Mint, TokenQuote>,
    held: Mutex<HashSet<Mint>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CachingOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingOracle")
            .field("cached_quotes", &self.cache.len())
            .finish()
    }
}

impl CachingOracle {
    pub fn new(
        inner: Arc<dyn PriceOracle>,
        ttl: Duration,
        pinned_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner,
            cache: TtlCache::with_pinned_ttl(ttl, pinned_ttl),
            held: Mutex::new(HashSet::new()),
            clock,
        }
    }

    /// Replace the set of mints the ledger currently holds; their quotes are
    /// cached on the pinned TTL from the next fetch on.
    pub fn set_held(&self, mints: Vec<Mint>) {
        let mut held = self.held.lock().expect("held set lock poisoned");
        *held = mints.into_iter().collect();
    }

    fn is_held(&self, mint: &Mint) -> bool {
        self.held
            .lock()
            .expect("held set lock poisoned")
            .contains(mint)
    }

    /// Drop expired quotes; called from the periodic sweep task.
    pub fn sweep(&self) -> usize {
        self.cache.sweep(self.clock.as_ref())
    }
}

#[async_trait]
impl PriceOracle for CachingOracle {
    async fn price(&self, mint: &Mint) -> Result<Decimal, OracleError> {
        if let Some(quote) = self.cache.get(mint, self.clock.as_ref()) {
            return Ok(quote.price);
        }
        // A single-price fetch has no liquidity context, so it is not cached:
        // a later batched call must still see the full quote.
        self.inner.price(mint).await
    }

    async fn prices_with_liquidity(
        &self,
        mints: &[Mint],
    ) -> Result<HashMap<Mint, TokenQuote>, OracleError> {
        let mut quotes = HashMap::new();
        let mut misses = Vec::new();

        for mint in mints {
            match self.cache.get(mint, self.clock.as_ref()) {
                Some(quote) => {
                    quotes.insert(mint.clone(), quote);
                }
                None => misses.push(mint.clone()),
            }
        }

        if !misses.is_empty() {
            let fetched = self.inner.prices_with_liquidity(&misses).await?;
            for (mint, quote) in fetched {
                if self.is_held(&mint) {
                    self.cache
                        .insert_pinned(mint.clone(), quote, self.clock.as_ref());
                } else {
                    self.cache.insert(mint.clone(), quote, self.clock.as_ref());
                }
                quotes.insert(mint, quote);
            }
        }

        Ok(quotes)
    }
}

//! HTTP price oracle adapter (Birdeye-style REST API).

use super::{OracleError, PriceOracle, TokenQuote};
use crate::domain::{Decimal, Mint};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Price oracle backed by a REST endpoint exposing `/defi/price` and
/// `/defi/multi_price`.
#[derive(Debug, Clone)]
pub struct HttpPriceOracle {
    client: Client,
    base_url: String,
}

impl HttpPriceOracle {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, OracleError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self.client.get(url).send().await.map_err(|e| {
                backoff::Error::transient(OracleError::NetworkError(e.to_string()))
            })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(OracleError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(OracleError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(OracleError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(OracleError::ParseError(e.to_string())))
        })
        .await
    }
}

fn parse_quote(value: &serde_json::Value) -> Option<TokenQuote> {
    let price = value.get("value").and_then(|v| v.as_f64())?;
    let liquidity = value
        .get("liquidity")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    let update_unix_time = value
        .get("updateUnixTime")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    Some(TokenQuote {
        price: Decimal::from_f64_lossy(price),
        liquidity: Decimal::from_f64_lossy(liquidity),
        update_unix_time,
    })
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn price(&self, mint: &Mint) -> Result<Decimal, OracleError> {
        debug!(mint = %mint, "Fetching price");

        let url = format!("{}/defi/price?address={}", self.base_url, mint.as_str());
        let response = self.get_json(&url).await?;

        let data = response
            .get("data")
            .ok_or_else(|| OracleError::ParseError("Missing data field".to_string()))?;

        parse_quote(data)
            .map(|q| q.price)
            .ok_or_else(|| OracleError::ParseError("Missing price value".to_string()))
    }

    async fn prices_with_liquidity(
        &self,
        mints: &[Mint],
    ) -> Result<HashMap<Mint, TokenQuote>, OracleError> {
        if mints.is_empty() {
            return Ok(HashMap::new());
        }

        let addresses = mints
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/defi/multi_price?list_address={}&include_liquidity=true",
            self.base_url, addresses
        );
        debug!(count = mints.len(), "Fetching batched quotes");

        let response = self.get_json(&url).await?;
        let data = response
            .get("data")
            .and_then(|d| d.as_object())
            .ok_or_else(|| OracleError::ParseError("Expected data object".to_string()))?;

        let mut quotes = HashMap::new();
        for mint in mints {
            match data.get(mint.as_str()).and_then(parse_quote) {
                Some(quote) => {
                    quotes.insert(mint.clone(), quote);
                }
                None => {
                    warn!(mint = %mint, "No quote in oracle response");
                }
            }
        }

        Ok(quotes)
    }
}

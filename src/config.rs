use crate::domain::Decimal;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub oracle_api_url: String,
    /// Quotes with less pooled liquidity than this are treated as worthless.
    pub min_liquidity_usd: Decimal,
    /// Quotes older than this are treated as worthless.
    pub price_staleness_secs: i64,
    /// Open lots valued below this are dust.
    pub min_dust_usd: Decimal,
    /// Untracked on-chain balances below this USD value are not imported.
    pub min_import_usd: Decimal,
    pub idempotency_ttl_secs: u64,
    pub mutation_timeout_secs: u64,
    pub mutation_max_retries: u32,
    /// TP/SL-triggered closes are rejected while automation is not armed.
    pub automation_armed: bool,
    /// Mints reconciliation never imports (native asset, stables).
    pub exclude_mints: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn parse_decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Decimal, ConfigError> {
    let raw = env_map.get(key).map(|s| s.as_str()).unwrap_or(default);
    Decimal::from_str_canonical(raw).map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), "must be a valid decimal".to_string())
    })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let oracle_api_url = env_map
            .get("ORACLE_API_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("ORACLE_API_URL".to_string()))?;

        let min_liquidity_usd = parse_decimal(&env_map, "MIN_LIQUIDITY_USD", "1000")?;
        let min_dust_usd = parse_decimal(&env_map, "MIN_DUST_USD", "0.01")?;
        let min_import_usd = parse_decimal(&env_map, "MIN_IMPORT_USD", "1")?;

        let price_staleness_secs = env_map
            .get("PRICE_STALENESS_SECS")
            .map(|s| s.as_str())
            .unwrap_or("21600")
            .parse::<i64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "PRICE_STALENESS_SECS".to_string(),
                    "must be a valid i64".to_string(),
                )
            })?;

        let idempotency_ttl_secs = env_map
            .get("IDEMPOTENCY_TTL_SECS")
            .map(|s| s.as_str())
            .unwrap_or("3600")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "IDEMPOTENCY_TTL_SECS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        let mutation_timeout_secs = env_map
            .get("MUTATION_TIMEOUT_SECS")
            .map(|s| s.as_str())
            .unwrap_or("30")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "MUTATION_TIMEOUT_SECS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        let mutation_max_retries = env_map
            .get("MUTATION_MAX_RETRIES")
            .map(|s| s.as_str())
            .unwrap_or("3")
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "MUTATION_MAX_RETRIES".to_string(),
                    "must be a valid u32".to_string(),
                )
            })?;

        let automation_armed = match env_map
            .get("AUTOMATION_ARMED")
            .map(|s| s.as_str())
            .unwrap_or("false")
        {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "AUTOMATION_ARMED".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        let exclude_mints = env_map
            .get("EXCLUDE_MINTS")
            .map(|s| {
                s.split(',')
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .collect()
            })
            .unwrap_or_else(default_exclude_mints);

        Ok(Config {
            port,
            database_path,
            oracle_api_url,
            min_liquidity_usd,
            price_staleness_secs,
            min_dust_usd,
            min_import_usd,
            idempotency_ttl_secs,
            mutation_timeout_secs,
            mutation_max_retries,
            automation_armed,
            exclude_mints,
        })
    }
}

/// Wrapped SOL and the major stables are never imported by reconciliation.
fn default_exclude_mints() -> Vec<String> {
    vec![
        "So11111111111111111111111111111111111111112".to_string(),
        "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
        "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB".to_string(),
    ]
}

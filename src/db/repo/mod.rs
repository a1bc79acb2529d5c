//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all ledger persistence.
//! Methods are organized across submodules by domain:
//! - `lots.rs` - Open lot reads, inserts, reduction application, deletes
//! - `trades.rs` - Realized trade operations
//! - `rules.rs` - TP/SL rule operations

mod lots;
mod rules;
mod trades;

use crate::domain::{Decimal, RawAmount};
use sqlx::sqlite::SqlitePool;
use std::str::FromStr;
use tracing::warn;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Parse a stored smallest-unit amount, defaulting to zero on corruption.
///
/// Amounts are written by this process as canonical u128 strings; a parse
/// failure means row corruption, which is logged rather than propagated so a
/// single bad row cannot take down every read of the scope.
pub(crate) fn parse_amount(column: &str, raw: &str) -> RawAmount {
    RawAmount::from_str(raw).unwrap_or_else(|e| {
        warn!(column, value = raw, error = %e, "Failed to parse stored amount, using zero");
        RawAmount::ZERO
    })
}

/// Parse a stored decimal column with the same zero-on-corruption policy.
pub(crate) fn parse_decimal(column: &str, raw: &str) -> Decimal {
    Decimal::from_str(raw).unwrap_or_else(|e| {
        warn!(column, value = raw, error = %e, "Failed to parse stored decimal, using zero");
        Decimal::zero()
    })
}

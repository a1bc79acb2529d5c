//! Realized trade operations for the repository.

use crate::domain::{Mint, RealizedTrade, Strategy, TimeMs, Trigger, WalletId};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

use super::{parse_amount, parse_decimal, Repository};

fn trade_from_row(row: &sqlx::sqlite::SqliteRow) -> RealizedTrade {
    let event_id_str = row.get::<String, _>("event_id");
    let event_id = Uuid::from_str(&event_id_str).unwrap_or_else(|e| {
        warn!(event_id = %event_id_str, error = %e, "Failed to parse trade event id");
        Uuid::nil()
    });

    RealizedTrade {
        event_id,
        wallet_id: WalletId::new(row.get::<String, _>("wallet_id")),
        mint: Mint::new(row.get::<String, _>("mint")),
        strategy: Strategy::new(row.get::<String, _>("strategy")),
        closed_quantity: parse_amount(
            "closed_quantity",
            &row.get::<String, _>("closed_quantity"),
        ),
        closed_cost: parse_amount("closed_cost", &row.get::<String, _>("closed_cost")),
        decimals: row.get::<i64, _>("decimals") as u8,
        entry_price: parse_decimal("entry_price", &row.get::<String, _>("entry_price")),
        entry_price_usd: parse_decimal(
            "entry_price_usd",
            &row.get::<String, _>("entry_price_usd"),
        ),
        exit_price: parse_decimal("exit_price", &row.get::<String, _>("exit_price")),
        exit_price_usd: parse_decimal("exit_price_usd", &row.get::<String, _>("exit_price_usd")),
        trigger: row
            .get::<Option<String>, _>("trigger_type")
            .and_then(|s| Trigger::parse(&s)),
        opened_at: TimeMs::new(row.get::<i64, _>("opened_at_ms")),
        closed_at: TimeMs::new(row.get::<i64, _>("closed_at_ms")),
    }
}

impl Repository {
    /// Query realized trades for a wallet, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_realized_trades(
        &self,
        wallet: &WalletId,
        mint: Option<&Mint>,
    ) -> Result<Vec<RealizedTrade>, sqlx::Error> {
        let (sql, binds_mint) = if mint.is_some() {
            (
                r#"
                SELECT event_id, wallet_id, mint, strategy, closed_quantity, closed_cost,
                       decimals, entry_price, entry_price_usd, exit_price, exit_price_usd,
                       trigger_type, opened_at_ms, closed_at_ms
                FROM realized_trades
                WHERE wallet_id = ? AND mint = ?
                ORDER BY closed_at_ms DESC, id DESC
                "#,
                true,
            )
        } else {
            (
                r#"
                SELECT event_id, wallet_id, mint, strategy, closed_quantity, closed_cost,
                       decimals, entry_price, entry_price_usd, exit_price, exit_price_usd,
                       trigger_type, opened_at_ms, closed_at_ms
                FROM realized_trades
                WHERE wallet_id = ?
                ORDER BY closed_at_ms DESC, id DESC
                "#,
                false,
            )
        };

        let mut query = sqlx::query(sql).bind(wallet.as_str());
        if binds_mint {
            query = query.bind(mint.expect("binds_mint implies mint is Some").as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(trade_from_row).collect())
    }
}

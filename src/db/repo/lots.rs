//! Open lot operations for the repository.

use crate::domain::{Mint, OpenLot, RawAmount, Strategy, TimeMs, WalletId};
use crate::engine::ReductionPlan;
use sqlx::Row;

use super::{parse_amount, parse_decimal, Repository};

fn lot_from_row(row: &sqlx::sqlite::SqliteRow) -> OpenLot {
    let extensions = row
        .get::<Option<String>, _>("extensions")
        .and_then(|s| serde_json::from_str(&s).ok());

    OpenLot {
        id: row.get::<i64, _>("id"),
        wallet_id: WalletId::new(row.get::<String, _>("wallet_id")),
        mint: Mint::new(row.get::<String, _>("mint")),
        cost: parse_amount("cost", &row.get::<String, _>("cost")),
        acquired_quantity: parse_amount(
            "acquired_quantity",
            &row.get::<String, _>("acquired_quantity"),
        ),
        closed_quantity: parse_amount(
            "closed_quantity",
            &row.get::<String, _>("closed_quantity"),
        ),
        decimals: row.get::<i64, _>("decimals") as u8,
        strategy: Strategy::new(row.get::<String, _>("strategy")),
        entry_price: parse_decimal("entry_price", &row.get::<String, _>("entry_price")),
        entry_price_usd: parse_decimal(
            "entry_price_usd",
            &row.get::<String, _>("entry_price_usd"),
        ),
        created_at: TimeMs::new(row.get::<i64, _>("created_at_ms")),
        extensions,
    }
}

fn insert_lot_query(
    lot: &OpenLot,
) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    let extensions = lot.extensions.as_ref().map(|v| v.to_string());

    sqlx::query(
        r#"
        INSERT INTO open_lots
        (wallet_id, mint, cost, acquired_quantity, closed_quantity, decimals,
         strategy, entry_price, entry_price_usd, created_at_ms, extensions)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(lot.wallet_id.as_str())
    .bind(lot.mint.as_str())
    .bind(lot.cost.to_string())
    .bind(lot.acquired_quantity.to_string())
    .bind(lot.closed_quantity.to_string())
    .bind(lot.decimals as i64)
    .bind(lot.strategy.as_str())
    .bind(lot.entry_price.to_canonical_string())
    .bind(lot.entry_price_usd.to_canonical_string())
    .bind(lot.created_at.as_ms())
    .bind(extensions)
}

impl Repository {
    /// Insert a new open lot; returns the assigned row id.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_lot(&self, lot: &OpenLot) -> Result<i64, sqlx::Error> {
        let result = insert_lot_query(lot).execute(&self.pool).await?;
        Ok(result.last_insert_rowid())
    }

    /// Insert a lot and, optionally, its attached TP/SL rule in one
    /// transaction. A retried buy can then never land the lot without the
    /// rule or vice versa.
    ///
    /// # Errors
    /// Returns an error if any statement fails; nothing is partially applied.
    pub async fn insert_lot_with_rule(
        &self,
        lot: &OpenLot,
        rule: Option<&crate::domain::TpSlRule>,
    ) -> Result<(i64, Option<i64>), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let lot_id = insert_lot_query(lot).execute(&mut *tx).await?.last_insert_rowid();
        let rule_id = match rule {
            Some(rule) => Some(
                super::rules::insert_rule_query(rule)
                    .execute(&mut *tx)
                    .await?
                    .last_insert_rowid(),
            ),
            None => None,
        };

        tx.commit().await?;
        Ok((lot_id, rule_id))
    }

    /// Query open lots for a wallet, optionally narrowed by mint and strategy.
    ///
    /// Openness (`closed < acquired`) is evaluated in Rust: the quantity
    /// columns are canonical u128 strings and do not compare numerically in
    /// SQL.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_open_lots(
        &self,
        wallet: &WalletId,
        mint: Option<&Mint>,
        strategy: Option<&Strategy>,
    ) -> Result<Vec<OpenLot>, sqlx::Error> {
        let mut sql = String::from(
            "SELECT id, wallet_id, mint, cost, acquired_quantity, closed_quantity, decimals, \
             strategy, entry_price, entry_price_usd, created_at_ms, extensions \
             FROM open_lots WHERE wallet_id = ?",
        );
        if mint.is_some() {
            sql.push_str(" AND mint = ?");
        }
        if strategy.is_some() {
            sql.push_str(" AND strategy = ?");
        }
        sql.push_str(" ORDER BY created_at_ms ASC, id ASC");

        let mut query = sqlx::query(&sql).bind(wallet.as_str());
        if let Some(mint) = mint {
            query = query.bind(mint.as_str());
        }
        if let Some(strategy) = strategy {
            query = query.bind(strategy.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(lot_from_row)
            .filter(|l| l.is_open())
            .collect())
    }

    /// Sum of remaining quantities across a wallet's open lots for one mint.
    pub async fn sum_remaining(
        &self,
        wallet: &WalletId,
        mint: &Mint,
    ) -> Result<RawAmount, sqlx::Error> {
        let lots = self.query_open_lots(wallet, Some(mint), None).await?;
        Ok(lots.iter().fold(RawAmount::ZERO, |acc, l| {
            acc.checked_add(l.remaining()).unwrap_or(acc)
        }))
    }

    /// Distinct mints with any remaining quantity, across all wallets.
    ///
    /// Feeds the quote cache's pinned set so held positions keep a price.
    pub async fn held_mints(&self) -> Result<Vec<Mint>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT mint, acquired_quantity, closed_quantity FROM open_lots",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut mints: Vec<Mint> = Vec::new();
        for row in &rows {
            let acquired = parse_amount(
                "acquired_quantity",
                &row.get::<String, _>("acquired_quantity"),
            );
            let closed = parse_amount(
                "closed_quantity",
                &row.get::<String, _>("closed_quantity"),
            );
            let mint = Mint::new(row.get::<String, _>("mint"));
            if closed < acquired && !mints.contains(&mint) {
                mints.push(mint);
            }
        }
        Ok(mints)
    }

    /// Apply a reduction plan atomically: every lot update, the aggregated
    /// realized trade, and, when the (wallet, mint) position ends flat, the
    /// cancellation of the given strategies' rules commit together or not at
    /// all.
    ///
    /// The update is guarded so a stale plan can never push a lot's closed
    /// quantity past its acquired quantity.
    ///
    /// # Errors
    /// Returns an error if any statement fails; nothing is partially applied.
    pub async fn apply_reduction(
        &self,
        plan: &ReductionPlan,
        rule_strategies: &[Strategy],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for update in &plan.updates {
            let result = sqlx::query(
                r#"
                UPDATE open_lots
                SET closed_quantity = ?
                WHERE id = ? AND CAST(closed_quantity AS INTEGER) <= CAST(? AS INTEGER)
                "#,
            )
            .bind(update.closed_quantity.to_string())
            .bind(update.lot_id)
            .bind(update.closed_quantity.to_string())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                // The lot moved under us; abort the whole close.
                return Err(sqlx::Error::RowNotFound);
            }
        }

        let trade = &plan.trade;
        sqlx::query(
            r#"
            INSERT INTO realized_trades
            (event_id, wallet_id, mint, strategy, closed_quantity, closed_cost, decimals,
             entry_price, entry_price_usd, exit_price, exit_price_usd, trigger_type,
             opened_at_ms, closed_at_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(trade.event_id.to_string())
        .bind(trade.wallet_id.as_str())
        .bind(trade.mint.as_str())
        .bind(trade.strategy.as_str())
        .bind(trade.closed_quantity.to_string())
        .bind(trade.closed_cost.to_string())
        .bind(trade.decimals as i64)
        .bind(trade.entry_price.to_canonical_string())
        .bind(trade.entry_price_usd.to_canonical_string())
        .bind(trade.exit_price.to_canonical_string())
        .bind(trade.exit_price_usd.to_canonical_string())
        .bind(trade.trigger.map(|t| t.as_str()))
        .bind(trade.opened_at.as_ms())
        .bind(trade.closed_at.as_ms())
        .execute(&mut *tx)
        .await?;

        if !rule_strategies.is_empty() {
            let rows = sqlx::query(
                "SELECT acquired_quantity, closed_quantity FROM open_lots \
                 WHERE wallet_id = ? AND mint = ?",
            )
            .bind(trade.wallet_id.as_str())
            .bind(trade.mint.as_str())
            .fetch_all(&mut *tx)
            .await?;
            let flat = rows.iter().all(|row| {
                let acquired = parse_amount(
                    "acquired_quantity",
                    &row.get::<String, _>("acquired_quantity"),
                );
                let closed = parse_amount(
                    "closed_quantity",
                    &row.get::<String, _>("closed_quantity"),
                );
                closed >= acquired
            });
            if flat {
                for strategy in rule_strategies {
                    super::rules::cancel_rules_query(&trade.wallet_id, &trade.mint, strategy)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Hard-delete all lots for (wallet, mint) and cancel the given
    /// strategies' rules in the same transaction; returns how many lot rows
    /// went.
    ///
    /// # Errors
    /// Returns an error if any statement fails; nothing is partially applied.
    pub async fn delete_lots(
        &self,
        wallet: &WalletId,
        mint: &Mint,
        rule_strategies: &[Strategy],
    ) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM open_lots WHERE wallet_id = ? AND mint = ?")
            .bind(wallet.as_str())
            .bind(mint.as_str())
            .execute(&mut *tx)
            .await?;
        for strategy in rule_strategies {
            super::rules::cancel_rules_query(wallet, mint, strategy)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Hard-delete a single lot by id.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn delete_lot(&self, lot_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM open_lots WHERE id = ?")
            .bind(lot_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Entry price of the most recent acquisition for a scope, if any.
    ///
    /// Used to default a TP/SL rule's entry price snapshot.
    pub async fn latest_entry_price(
        &self,
        wallet: &WalletId,
        mint: &Mint,
        strategy: &Strategy,
    ) -> Result<Option<crate::domain::Decimal>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT entry_price
            FROM open_lots
            WHERE wallet_id = ? AND mint = ? AND strategy = ?
            ORDER BY created_at_ms DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(wallet.as_str())
        .bind(mint.as_str())
        .bind(strategy.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| parse_decimal("entry_price", &r.get::<String, _>("entry_price"))))
    }
}

//! TP/SL rule operations for the repository.

use crate::domain::{Mint, RuleStatus, Strategy, TimeMs, TpSlRule, UserId, WalletId};
use sqlx::Row;

use super::{parse_decimal, Repository};

fn rule_from_row(row: &sqlx::sqlite::SqliteRow) -> TpSlRule {
    let opt_decimal = |column: &str, value: Option<String>| {
        value.map(|s| parse_decimal(column, &s))
    };

    TpSlRule {
        id: row.get::<i64, _>("id"),
        user_id: UserId::new(row.get::<String, _>("user_id")),
        wallet_id: WalletId::new(row.get::<String, _>("wallet_id")),
        mint: Mint::new(row.get::<String, _>("mint")),
        strategy: Strategy::new(row.get::<String, _>("strategy")),
        tp_price: opt_decimal("tp_price", row.get::<Option<String>, _>("tp_price")),
        sl_price: opt_decimal("sl_price", row.get::<Option<String>, _>("sl_price")),
        tp_percent: opt_decimal("tp_percent", row.get::<Option<String>, _>("tp_percent")),
        sl_percent: opt_decimal("sl_percent", row.get::<Option<String>, _>("sl_percent")),
        entry_price: parse_decimal("entry_price", &row.get::<String, _>("entry_price")),
        enabled: row.get::<i64, _>("enabled") != 0,
        status: RuleStatus::parse(&row.get::<String, _>("status")).unwrap_or(RuleStatus::Failed),
        created_at: TimeMs::new(row.get::<i64, _>("created_at_ms")),
    }
}

/// Rule insert as a bound statement, so lot-plus-rule writes can run it
/// inside their own transaction.
pub(crate) fn insert_rule_query(
    rule: &TpSlRule,
) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(
        r#"
        INSERT INTO tpsl_rules
        (user_id, wallet_id, mint, strategy, tp_price, sl_price, tp_percent, sl_percent,
         entry_price, enabled, status, created_at_ms)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(rule.user_id.as_str())
    .bind(rule.wallet_id.as_str())
    .bind(rule.mint.as_str())
    .bind(rule.strategy.as_str())
    .bind(rule.tp_price.map(|d| d.to_canonical_string()))
    .bind(rule.sl_price.map(|d| d.to_canonical_string()))
    .bind(rule.tp_percent.map(|d| d.to_canonical_string()))
    .bind(rule.sl_percent.map(|d| d.to_canonical_string()))
    .bind(rule.entry_price.to_canonical_string())
    .bind(if rule.enabled { 1 } else { 0 })
    .bind(rule.status.as_str())
    .bind(rule.created_at.as_ms())
}

/// Cancel every active rule in a (wallet, mint, strategy) scope, as a bound
/// statement so ledger writes that flatten a position can run it in the same
/// transaction.
pub(crate) fn cancel_rules_query<'q>(
    wallet: &'q WalletId,
    mint: &'q Mint,
    strategy: &'q Strategy,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    sqlx::query(
        r#"
        UPDATE tpsl_rules
        SET enabled = 0, status = 'cancelled'
        WHERE wallet_id = ? AND mint = ? AND strategy = ? AND status = 'active'
        "#,
    )
    .bind(wallet.as_str())
    .bind(mint.as_str())
    .bind(strategy.as_str())
}

impl Repository {
    /// Insert a rule; returns the assigned row id.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_rule(&self, rule: &TpSlRule) -> Result<i64, sqlx::Error> {
        let result = insert_rule_query(rule).execute(&self.pool).await?;
        Ok(result.last_insert_rowid())
    }

    /// All rules in a (wallet, mint, strategy) scope, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_rules_for_scope(
        &self,
        wallet: &WalletId,
        mint: &Mint,
        strategy: &Strategy,
    ) -> Result<Vec<TpSlRule>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, wallet_id, mint, strategy, tp_price, sl_price,
                   tp_percent, sl_percent, entry_price, enabled, status, created_at_ms
            FROM tpsl_rules
            WHERE wallet_id = ? AND mint = ? AND strategy = ?
            ORDER BY created_at_ms ASC, id ASC
            "#,
        )
        .bind(wallet.as_str())
        .bind(mint.as_str())
        .bind(strategy.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(rule_from_row).collect())
    }

    /// Update an existing rule in place.
    ///
    /// # Errors
    /// Returns an error if the update fails or the rule does not exist.
    pub async fn update_rule(&self, rule: &TpSlRule) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE tpsl_rules
            SET tp_price = ?, sl_price = ?, tp_percent = ?, sl_percent = ?,
                entry_price = ?, enabled = ?, status = ?
            WHERE id = ?
            "#,
        )
        .bind(rule.tp_price.map(|d| d.to_canonical_string()))
        .bind(rule.sl_price.map(|d| d.to_canonical_string()))
        .bind(rule.tp_percent.map(|d| d.to_canonical_string()))
        .bind(rule.sl_percent.map(|d| d.to_canonical_string()))
        .bind(rule.entry_price.to_canonical_string())
        .bind(if rule.enabled { 1 } else { 0 })
        .bind(rule.status.as_str())
        .bind(rule.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }
}

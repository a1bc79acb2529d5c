//! Trade service: the mutating operations behind the HTTP surface.

use crate::config::Config;
use crate::db::Repository;
use crate::domain::{
    Decimal, Mint, OpenLot, RawAmount, RuleStatus, Strategy, TimeMs, TpSlRule, Trigger, UserId,
    WalletId,
};
use crate::engine::{
    check_allocation, plan_reduction, AllocationError, CloseTarget, DustPolicy, ReduceError,
    ReductionRequest, ReductionSummary,
};
use crate::oracle::{OracleError, PriceOracle, TokenQuote};
use crate::wallets::{WalletDirectory, WalletInfo, WalletSelector};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum TradeError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    NeedForce(String),
    #[error("{0}")]
    NeedsArm(String),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("Database error: {0}")]
    Db(sqlx::Error),
    #[error("Wallet directory error: {0}")]
    Wallet(#[from] anyhow::Error),
}

impl TradeError {
    /// Infrastructure failures are retryable by the idempotency layer;
    /// everything else is a terminal domain outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TradeError::Oracle(_) | TradeError::Db(_) | TradeError::Wallet(_)
        )
    }
}

impl From<sqlx::Error> for TradeError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => TradeError::NotFound("Record not found".to_string()),
            other => TradeError::Db(other),
        }
    }
}

impl From<ReduceError> for TradeError {
    fn from(err: ReduceError) -> Self {
        match err {
            ReduceError::NoOpenLots => TradeError::NotFound(err.to_string()),
            ReduceError::InvalidAmount => TradeError::Validation(err.to_string()),
        }
    }
}

impl From<AllocationError> for TradeError {
    fn from(err: AllocationError) -> Self {
        TradeError::Validation(err.to_string())
    }
}

/// Optional TP/SL legs attached to a buy.
#[derive(Debug, Clone, Default)]
pub struct RuleLegs {
    pub tp_price: Option<Decimal>,
    pub sl_price: Option<Decimal>,
    pub tp_percent: Option<Decimal>,
    pub sl_percent: Option<Decimal>,
}

impl RuleLegs {
    pub fn is_empty(&self) -> bool {
        self.tp_price.is_none()
            && self.sl_price.is_none()
            && self.tp_percent.is_none()
            && self.sl_percent.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct OpenLotRequest {
    pub wallet: WalletSelector,
    pub mint: Mint,
    /// Base asset spent, smallest units.
    pub cost: RawAmount,
    /// Tokens received, smallest units.
    pub quantity: RawAmount,
    pub decimals: u8,
    pub strategy: Strategy,
    pub entry_price: Decimal,
    pub entry_price_usd: Decimal,
    pub rule: Option<RuleLegs>,
    pub extensions: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenLotOutcome {
    pub lot_id: i64,
    pub wallet_id: WalletId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CloseRequest {
    pub wallet: WalletSelector,
    pub strategy: Option<Strategy>,
    pub target: CloseTarget,
    pub exit_price: Decimal,
    pub exit_price_usd: Decimal,
    pub trigger: Option<Trigger>,
}

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub wallet: WalletSelector,
    pub mints: Vec<Mint>,
    pub force: bool,
    pub hard_delete: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSummary {
    pub deleted_mints: Vec<Mint>,
    pub lots_removed: u64,
}

#[derive(Debug, Clone)]
pub struct ClearDustRequest {
    pub wallet: Option<WalletSelector>,
    pub min_dust_usd: Option<Decimal>,
    pub hard_delete: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearedPosition {
    pub mint: Mint,
    pub quantity: RawAmount,
}

#[derive(Debug, Clone)]
pub struct RuleRequest {
    pub wallet: WalletSelector,
    pub strategy: Strategy,
    pub legs: RuleLegs,
    pub entry_price: Option<Decimal>,
}

pub struct TradeService {
    repo: Arc<Repository>,
    oracle: Arc<dyn PriceOracle>,
    wallets: Arc<dyn WalletDirectory>,
    config: Config,
}

impl TradeService {
    pub fn new(
        repo: Arc<Repository>,
        oracle: Arc<dyn PriceOracle>,
        wallets: Arc<dyn WalletDirectory>,
        config: Config,
    ) -> Self {
        Self {
            repo,
            oracle,
            wallets,
            config,
        }
    }

    async fn resolve_wallet(
        &self,
        user: &UserId,
        selector: &WalletSelector,
    ) -> Result<WalletInfo, TradeError> {
        self.wallets
            .resolve(user, selector)
            .await?
            .ok_or_else(|| TradeError::NotFound("Wallet not found".to_string()))
    }

    fn dust_policy(&self) -> DustPolicy {
        DustPolicy {
            min_dust_usd: self.config.min_dust_usd,
        }
    }

    /// Record a fill as a new open lot, optionally attaching a TP/SL rule.
    ///
    /// The allocation budget is checked before anything is written, so a buy
    /// with a violating rule leaves no trace. Under one idempotency key the
    /// whole operation is a single unit of work: a retried buy never
    /// duplicates the lot or the rule.
    pub async fn open_lot(
        &self,
        user: &UserId,
        req: OpenLotRequest,
    ) -> Result<OpenLotOutcome, TradeError> {
        if req.quantity.is_zero() {
            return Err(TradeError::Validation(
                "Output amount must be positive".to_string(),
            ));
        }

        let wallet = self.resolve_wallet(user, &req.wallet).await?;

        let candidate_rule = match &req.rule {
            Some(legs) if !legs.is_empty() => Some(self.build_rule(
                user,
                &wallet.id,
                &req.mint,
                &req.strategy,
                legs,
                req.entry_price,
            )?),
            _ => None,
        };
        if let Some(rule) = &candidate_rule {
            let existing = self
                .repo
                .query_rules_for_scope(&wallet.id, &req.mint, &req.strategy)
                .await?;
            check_allocation(&existing, rule)?;
        }

        let lot = OpenLot {
            id: 0,
            wallet_id: wallet.id.clone(),
            mint: req.mint.clone(),
            cost: req.cost,
            acquired_quantity: req.quantity,
            closed_quantity: RawAmount::ZERO,
            decimals: req.decimals,
            strategy: req.strategy.clone(),
            entry_price: req.entry_price,
            entry_price_usd: req.entry_price_usd,
            created_at: TimeMs::now(),
            extensions: req.extensions,
        };
        let (lot_id, rule_id) = self
            .repo
            .insert_lot_with_rule(&lot, candidate_rule.as_ref())
            .await?;

        info!(
            mint = %req.mint,
            wallet = %wallet.id,
            lot_id,
            quantity = %req.quantity,
            "Opened lot"
        );
        Ok(OpenLotOutcome {
            lot_id,
            wallet_id: wallet.id,
            rule_id,
        })
    }

    /// Close part or all of a position via the FIFO engine.
    pub async fn close_position(
        &self,
        user: &UserId,
        mint: &Mint,
        req: CloseRequest,
    ) -> Result<ReductionSummary, TradeError> {
        if matches!(req.trigger, Some(Trigger::Tp) | Some(Trigger::Sl))
            && !self.config.automation_armed
        {
            return Err(TradeError::NeedsArm(
                "Automated triggers require arming".to_string(),
            ));
        }

        let wallet = self.resolve_wallet(user, &req.wallet).await?;
        let lots = self
            .repo
            .query_open_lots(&wallet.id, Some(mint), req.strategy.as_ref())
            .await?;

        let plan = plan_reduction(
            &lots,
            &ReductionRequest {
                target: req.target,
                exit_price: req.exit_price,
                exit_price_usd: req.exit_price_usd,
                trigger: req.trigger,
                closed_at: TimeMs::now(),
            },
            &self.dust_policy(),
        )?;
        self.repo
            .apply_reduction(&plan, &distinct_strategies(&lots))
            .await?;

        info!(
            mint = %mint,
            wallet = %wallet.id,
            removed = %plan.summary.removed,
            fully_sold = plan.summary.fully_sold.len(),
            "Closed position slice"
        );
        Ok(plan.summary)
    }

    /// Delete open lots for one or more mints, hard or as `manualDelete`
    /// closures. Positions still worth more than the dust floor need
    /// `force`.
    pub async fn delete_lots(
        &self,
        user: &UserId,
        req: DeleteRequest,
    ) -> Result<DeleteSummary, TradeError> {
        let wallet = self.resolve_wallet(user, &req.wallet).await?;
        let quotes = self.trusted_quotes(&req.mints).await?;

        let mut deleted_mints = Vec::new();
        let mut lots_removed = 0u64;

        for mint in &req.mints {
            let lots = self
                .repo
                .query_open_lots(&wallet.id, Some(mint), None)
                .await?;
            if lots.is_empty() {
                continue;
            }

            let price_usd = quotes
                .get(mint)
                .map(|q| q.price)
                .unwrap_or_else(Decimal::zero);
            if !req.force {
                let value = lots.iter().fold(Decimal::zero(), |acc, l| {
                    acc + l.remaining().usd_value(price_usd, l.decimals)
                });
                if value >= self.config.min_dust_usd {
                    return Err(TradeError::NeedForce(format!(
                        "Position {} is worth ${} and needs forceDelete",
                        mint,
                        value.to_canonical_string()
                    )));
                }
            }

            let strategies = distinct_strategies(&lots);
            if req.hard_delete {
                lots_removed += self.repo.delete_lots(&wallet.id, mint, &strategies).await?;
            } else {
                let plan = plan_reduction(
                    &lots,
                    &ReductionRequest {
                        target: CloseTarget::Percent(Decimal::hundred()),
                        exit_price: Decimal::zero(),
                        exit_price_usd: price_usd,
                        trigger: Some(Trigger::ManualDelete),
                        closed_at: TimeMs::now(),
                    },
                    &self.dust_policy(),
                )?;
                self.repo.apply_reduction(&plan, &strategies).await?;
                lots_removed += plan.updates.len() as u64;
            }

            deleted_mints.push(mint.clone());
        }

        if deleted_mints.is_empty() {
            return Err(TradeError::NotFound("No matching open trades".to_string()));
        }
        info!(
            wallet = %wallet.id,
            mints = deleted_mints.len(),
            lots = lots_removed,
            hard = req.hard_delete,
            "Deleted lots"
        );
        Ok(DeleteSummary {
            deleted_mints,
            lots_removed,
        })
    }

    /// Close (trigger `dust`) or hard-delete every open lot valued below the
    /// dust floor. Re-running immediately is a no-op.
    pub async fn clear_dust(
        &self,
        user: &UserId,
        req: ClearDustRequest,
    ) -> Result<Vec<ClearedPosition>, TradeError> {
        let wallets = match &req.wallet {
            Some(selector) => vec![self.resolve_wallet(user, selector).await?],
            None => self.wallets.list_wallets(user).await?,
        };
        let floor = req.min_dust_usd.unwrap_or(self.config.min_dust_usd);

        let mut cleared = Vec::new();
        for wallet in &wallets {
            let lots = self.repo.query_open_lots(&wallet.id, None, None).await?;
            if lots.is_empty() {
                continue;
            }

            let mints: Vec<Mint> = {
                let mut seen = Vec::new();
                for lot in &lots {
                    if !seen.contains(&lot.mint) {
                        seen.push(lot.mint.clone());
                    }
                }
                seen
            };
            let quotes = self.trusted_quotes(&mints).await?;

            for lot in &lots {
                let price_usd = quotes
                    .get(&lot.mint)
                    .map(|q| q.price)
                    .unwrap_or_else(Decimal::zero);
                let value = lot.remaining().usd_value(price_usd, lot.decimals);
                if value >= floor {
                    continue;
                }

                let quantity = lot.remaining();
                if req.hard_delete {
                    self.repo.delete_lot(lot.id).await?;
                } else {
                    let plan = plan_reduction(
                        std::slice::from_ref(lot),
                        &ReductionRequest {
                            target: CloseTarget::Percent(Decimal::hundred()),
                            exit_price: Decimal::zero(),
                            exit_price_usd: price_usd,
                            trigger: Some(Trigger::Dust),
                            closed_at: TimeMs::now(),
                        },
                        &self.dust_policy(),
                    )?;
                    self.repo
                        .apply_reduction(&plan, std::slice::from_ref(&lot.strategy))
                        .await?;
                }
                cleared.push(ClearedPosition {
                    mint: lot.mint.clone(),
                    quantity,
                });
            }
        }

        info!(positions = cleared.len(), "Cleared dust");
        Ok(cleared)
    }

    /// Create or replace the TP/SL rule for a scope under the allocation
    /// budget.
    pub async fn upsert_rule(
        &self,
        user: &UserId,
        mint: &Mint,
        req: RuleRequest,
    ) -> Result<TpSlRule, TradeError> {
        if req.legs.is_empty() {
            return Err(TradeError::Validation(
                "No take-profit or stop-loss provided".to_string(),
            ));
        }
        let wallet = self.resolve_wallet(user, &req.wallet).await?;

        let entry_price = match req.entry_price.filter(|p| p.is_positive()) {
            Some(p) => p,
            None => self.default_entry_price(&wallet.id, mint, &req.strategy).await?,
        };

        let mut rule =
            self.build_rule(user, &wallet.id, mint, &req.strategy, &req.legs, entry_price)?;

        let existing = self
            .repo
            .query_rules_for_scope(&wallet.id, mint, &req.strategy)
            .await?;
        let replaced = existing.iter().find(|r| r.counts_against_budget());
        if let Some(previous) = replaced {
            rule.id = previous.id;
            rule.created_at = previous.created_at;
        }
        check_allocation(&existing, &rule)?;

        if replaced.is_some() {
            self.repo.update_rule(&rule).await?;
        } else {
            rule.id = self.repo.insert_rule(&rule).await?;
        }

        info!(mint = %mint, wallet = %wallet.id, rule_id = rule.id, "Stored TP/SL rule");
        Ok(rule)
    }

    fn build_rule(
        &self,
        user: &UserId,
        wallet: &WalletId,
        mint: &Mint,
        strategy: &Strategy,
        legs: &RuleLegs,
        entry_price: Decimal,
    ) -> Result<TpSlRule, TradeError> {
        if !entry_price.is_positive() {
            return Err(TradeError::Validation(
                "No valid entry price for rule".to_string(),
            ));
        }
        Ok(TpSlRule {
            id: 0,
            user_id: user.clone(),
            wallet_id: wallet.clone(),
            mint: mint.clone(),
            strategy: strategy.clone(),
            tp_price: legs.tp_price,
            sl_price: legs.sl_price,
            tp_percent: legs.tp_percent,
            sl_percent: legs.sl_percent,
            entry_price,
            enabled: true,
            status: RuleStatus::Active,
            created_at: TimeMs::now(),
        })
    }

    /// Most recent buy's entry price, falling back to the live oracle price.
    async fn default_entry_price(
        &self,
        wallet: &WalletId,
        mint: &Mint,
        strategy: &Strategy,
    ) -> Result<Decimal, TradeError> {
        if let Some(price) = self.repo.latest_entry_price(wallet, mint, strategy).await? {
            if price.is_positive() {
                return Ok(price);
            }
        }
        Ok(self.oracle.price(mint).await?)
    }

    /// Batched quotes with the trust gate applied; untrusted quotes are
    /// dropped so callers value those positions at zero.
    async fn trusted_quotes(
        &self,
        mints: &[Mint],
    ) -> Result<HashMap<Mint, TokenQuote>, TradeError> {
        let now_secs = TimeMs::now().as_secs();
        let mut quotes = self.oracle.prices_with_liquidity(mints).await?;
        quotes.retain(|_, q| {
            q.is_trusted(
                self.config.min_liquidity_usd,
                self.config.price_staleness_secs,
                now_secs,
            )
        });
        Ok(quotes)
    }
}

/// Distinct strategy tags across the lots a mutation touched; their rules are
/// cancelled inside the ledger write if the position ends flat.
fn distinct_strategies(lots: &[OpenLot]) -> Vec<Strategy> {
    let mut strategies: Vec<Strategy> = Vec::new();
    for lot in lots {
        if !strategies.contains(&lot.strategy) {
            strategies.push(lot.strategy.clone());
        }
    }
    strategies
}

//! On-chain reconciliation.
//!
//! Compares live wallet balances against the ledger's open lots and imports
//! the difference as zero-cost lots. Only balances with a trusted quote and a
//! meaningful USD value are imported, so illiquid spam tokens never pollute
//! the ledger. The pass is idempotent: once the delta is imported, a second
//! run finds nothing to do.

use crate::config::Config;
use crate::db::Repository;
use crate::domain::{Decimal, Mint, OpenLot, RawAmount, Strategy, TimeMs, UserId};
use crate::oracle::PriceOracle;
use crate::orchestration::trader::TradeError;
use crate::wallets::{WalletDirectory, WalletInfo, WalletSelector};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Strategy tag stamped on reconciliation-imported lots.
pub const IMPORT_STRATEGY: &str = "import";

/// One balance delta imported as a zero-cost lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedLot {
    pub mint: Mint,
    pub quantity: RawAmount,
}

pub struct Reconciler {
    repo: Arc<Repository>,
    oracle: Arc<dyn PriceOracle>,
    wallets: Arc<dyn WalletDirectory>,
    config: Config,
}

impl Reconciler {
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

    /// Reconcile one wallet, or every wallet of the user when none is given.
    pub async fn reconcile(
        &self,
        user: &UserId,
        wallet: Option<&WalletSelector>,
    ) -> Result<Vec<ImportedLot>, TradeError> {
        let wallets = match wallet {
            Some(selector) => {
                let info = self
                    .wallets
                    .resolve(user, selector)
                    .await?
                    .ok_or_else(|| TradeError::NotFound("Wallet not found".to_string()))?;
                vec![info]
            }
            None => self.wallets.list_wallets(user).await?,
        };

        let mut imported = Vec::new();
        for info in &wallets {
            imported.extend(self.reconcile_wallet(info).await?);
        }
        info!(
            wallets = wallets.len(),
            imported = imported.len(),
            "Reconciliation pass complete"
        );
        Ok(imported)
    }

    async fn reconcile_wallet(&self, wallet: &WalletInfo) -> Result<Vec<ImportedLot>, TradeError> {
        let balances = self.wallets.onchain_balances(&wallet.public_key).await?;

        let candidates: Vec<_> = balances
            .into_iter()
            .filter(|b| !b.raw_amount.is_zero())
            .filter(|b| !self.is_excluded(&b.mint))
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mints: Vec<Mint> = candidates.iter().map(|b| b.mint.clone()).collect();
        let quotes = self.oracle.prices_with_liquidity(&mints).await?;
        let now_secs = TimeMs::now().as_secs();

        let mut imported = Vec::new();
        for balance in candidates {
            let quote = match quotes.get(&balance.mint) {
                Some(q)
                    if q.is_trusted(
                        self.config.min_liquidity_usd,
                        self.config.price_staleness_secs,
                        now_secs,
                    ) =>
                {
                    q
                }
                _ => {
                    debug!(mint = %balance.mint, "Skipping balance without a trusted quote");
                    continue;
                }
            };

            let value = balance
                .raw_amount
                .usd_value(quote.price, balance.decimals);
            if value < self.config.min_import_usd {
                debug!(mint = %balance.mint, value = %value.to_canonical_string(), "Balance below import floor");
                continue;
            }

            let tracked = self.repo.sum_remaining(&wallet.id, &balance.mint).await?;
            if balance.raw_amount <= tracked {
                continue;
            }
            let delta = balance.raw_amount.saturating_sub(tracked);

            let lot = OpenLot {
                id: 0,
                wallet_id: wallet.id.clone(),
                mint: balance.mint.clone(),
                cost: RawAmount::ZERO,
                acquired_quantity: delta,
                closed_quantity: RawAmount::ZERO,
                decimals: balance.decimals,
                strategy: Strategy::new(IMPORT_STRATEGY),
                entry_price: Decimal::zero(),
                entry_price_usd: Decimal::zero(),
                created_at: TimeMs::now(),
                extensions: None,
            };
            self.repo.insert_lot(&lot).await?;

            info!(
                mint = %balance.mint,
                wallet = %wallet.id,
                quantity = %delta,
                "Imported untracked balance"
            );
            imported.push(ImportedLot {
                mint: balance.mint,
                quantity: delta,
            });
        }
        Ok(imported)
    }

    fn is_excluded(&self, mint: &Mint) -> bool {
        self.config
            .exclude_mints
            .iter()
            .any(|m| m == mint.as_str())
    }
}

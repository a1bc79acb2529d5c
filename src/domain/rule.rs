//! Take-profit / stop-loss rules and their allocation weight.

use crate::domain::{Decimal, Mint, Strategy, TimeMs, UserId, WalletId};
use serde::{Deserialize, Serialize};

/// Rule lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Active,
    Cancelled,
    Failed,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Active => "active",
            RuleStatus::Cancelled => "cancelled",
            RuleStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<RuleStatus> {
        match s {
            "active" => Some(RuleStatus::Active),
            "cancelled" => Some(RuleStatus::Cancelled),
            "failed" => Some(RuleStatus::Failed),
            _ => None,
        }
    }
}

/// A TP/SL rule scoped to (user, wallet, mint, strategy).
///
/// The take-profit and stop-loss legs are mutually exclusive outcomes of the
/// same reserved slice of the position, so the rule's allocation weight is
/// `max(tp_percent, sl_percent)`, not the sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TpSlRule {
    pub id: i64,
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub mint: Mint,
    pub strategy: Strategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sl_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp_percent: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sl_percent: Option<Decimal>,
    /// Entry price snapshot at rule creation.
    pub entry_price: Decimal,
    pub enabled: bool,
    pub status: RuleStatus,
    pub created_at: TimeMs,
}

impl TpSlRule {
    /// The share of the position this rule reserves: `max(tp%, sl%)`.
    pub fn allocation_weight(&self) -> Decimal {
        let tp = self.tp_percent.unwrap_or_else(Decimal::zero);
        let sl = self.sl_percent.unwrap_or_else(Decimal::zero);
        if tp > sl {
            tp
        } else {
            sl
        }
    }

    /// Only enabled, active rules count against the allocation budget.
    pub fn counts_against_budget(&self) -> bool {
        self.enabled && self.status == RuleStatus::Active
    }
}

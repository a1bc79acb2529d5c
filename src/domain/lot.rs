//! Open lot: one acquisition event in the position ledger.

use crate::domain::{Decimal, Mint, RawAmount, Strategy, TimeMs, WalletId};
use serde::{Deserialize, Serialize};

/// A single open acquisition record.
///
/// Mutated only by the reduction engine, and only by increasing
/// `closed_quantity`. Invariant: `closed_quantity <= acquired_quantity`; the
/// lot is open while the inequality is strict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenLot {
    /// Database row id (0 before the first insert).
    pub id: i64,
    /// Owning wallet.
    pub wallet_id: WalletId,
    /// Token mint.
    pub mint: Mint,
    /// Acquisition cost in base-asset smallest units.
    pub cost: RawAmount,
    /// Acquired token quantity in smallest units.
    pub acquired_quantity: RawAmount,
    /// Quantity already closed, monotonically non-decreasing.
    pub closed_quantity: RawAmount,
    /// Token decimal precision.
    pub decimals: u8,
    /// Strategy tag.
    pub strategy: Strategy,
    /// Entry price in the quote asset (per whole token).
    pub entry_price: Decimal,
    /// Entry price in USD (per whole token).
    pub entry_price_usd: Decimal,
    /// Acquisition timestamp.
    pub created_at: TimeMs,
    /// Free-form extension attributes (e.g. smart-exit parameters).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

impl OpenLot {
    /// Quantity still open: `acquired - closed`.
    pub fn remaining(&self) -> RawAmount {
        self.acquired_quantity.saturating_sub(self.closed_quantity)
    }

    /// Cost basis still attributable to the open remainder.
    pub fn remaining_cost(&self) -> RawAmount {
        self.cost
            .proportion(self.remaining(), self.acquired_quantity)
    }

    /// A lot is open while some quantity remains unclosed.
    pub fn is_open(&self) -> bool {
        !self.remaining().is_zero()
    }
}

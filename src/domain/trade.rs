//! Realized trade: the immutable record produced when open lots are reduced.

use crate::domain::{Decimal, Mint, RawAmount, Strategy, TimeMs, WalletId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a closure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Trigger {
    /// User-initiated sell.
    Manual,
    /// Take-profit rule fired.
    Tp,
    /// Stop-loss rule fired.
    Sl,
    /// Leftover forced to zero by the dust floor.
    Dust,
    /// Lot removed by an explicit delete.
    ManualDelete,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Tp => "tp",
            Trigger::Sl => "sl",
            Trigger::Dust => "dust",
            Trigger::ManualDelete => "manualDelete",
        }
    }

    pub fn parse(s: &str) -> Option<Trigger> {
        match s {
            "manual" => Some(Trigger::Manual),
            "tp" => Some(Trigger::Tp),
            "sl" => Some(Trigger::Sl),
            "dust" => Some(Trigger::Dust),
            "manualDelete" => Some(Trigger::ManualDelete),
            _ => None,
        }
    }
}

/// One logical close event, aggregated across every lot slice it consumed.
///
/// Multiple closures of the same original lot produce multiple rows; a single
/// closure spanning several lots produces exactly one row with
/// quantity-weighted entry prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealizedTrade {
    /// Stable event id for this closure.
    pub event_id: Uuid,
    pub wallet_id: WalletId,
    pub mint: Mint,
    pub strategy: Strategy,
    /// Quantity closed in this event, smallest units.
    pub closed_quantity: RawAmount,
    /// Cost basis consumed by this event, smallest units.
    pub closed_cost: RawAmount,
    pub decimals: u8,
    /// Quantity-weighted entry price in the quote asset.
    pub entry_price: Decimal,
    /// Quantity-weighted entry price in USD.
    pub entry_price_usd: Decimal,
    pub exit_price: Decimal,
    pub exit_price_usd: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    /// Acquisition timestamp of the oldest consumed lot.
    pub opened_at: TimeMs,
    pub closed_at: TimeMs,
}

impl RealizedTrade {
    /// Realized gain over entry in percent, from the USD legs.
    ///
    /// Returns zero when the entry price is zero (import lots have no basis).
    pub fn realized_gain_percent(&self) -> Decimal {
        if !self.entry_price_usd.is_positive() {
            return Decimal::zero();
        }
        (self.exit_price_usd - self.entry_price_usd) / self.entry_price_usd * Decimal::hundred()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(entry_usd: &str, exit_usd: &str) -> RealizedTrade {
        RealizedTrade {
            event_id: Uuid::new_v4(),
            wallet_id: WalletId::new("w1"),
            mint: Mint::new("MintA"),
            strategy: Strategy::new("manual"),
            closed_quantity: RawAmount(100),
            closed_cost: RawAmount(50),
            decimals: 9,
            entry_price: Decimal::zero(),
            entry_price_usd: Decimal::from_str_canonical(entry_usd).unwrap(),
            exit_price: Decimal::zero(),
            exit_price_usd: Decimal::from_str_canonical(exit_usd).unwrap(),
            trigger: None,
            opened_at: TimeMs::new(1000),
            closed_at: TimeMs::new(2000),
        }
    }

    #[test]
    fn test_realized_gain_percent() {
        assert_eq!(
            trade("100", "150").realized_gain_percent().to_canonical_string(),
            "50"
        );
        assert_eq!(
            trade("100", "90").realized_gain_percent().to_canonical_string(),
            "-10"
        );
    }

    #[test]
    fn test_realized_gain_zero_entry() {
        assert!(trade("0", "150").realized_gain_percent().is_zero());
    }

    #[test]
    fn test_trigger_roundtrip() {
        for t in [
            Trigger::Manual,
            Trigger::Tp,
            Trigger::Sl,
            Trigger::Dust,
            Trigger::ManualDelete,
        ] {
            assert_eq!(Trigger::parse(t.as_str()), Some(t));
        }
        assert_eq!(Trigger::parse("bogus"), None);
    }
}

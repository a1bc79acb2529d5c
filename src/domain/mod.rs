//! Domain types for the position ledger.
//!
//! This module provides:
//! - Lossless numeric handling: Decimal for prices/percentages, RawAmount for
//!   smallest-unit token quantities and costs
//! - Domain primitives: TimeMs, Mint, WalletId, UserId, Strategy
//! - Open lot, realized trade, and TP/SL rule records

pub mod amount;
pub mod decimal;
pub mod lot;
pub mod primitives;
pub mod rule;
pub mod trade;

pub use amount::{AmountParseError, RawAmount};
pub use decimal::Decimal;
pub use lot::OpenLot;
pub use primitives::{Mint, Strategy, TimeMs, UserId, WalletId};
pub use rule::{RuleStatus, TpSlRule};
pub use trade::{RealizedTrade, Trigger};

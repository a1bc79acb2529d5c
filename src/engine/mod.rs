//! Pure computation engines for deterministic ledger logic.
//!
//! Nothing in here touches the database or the network; the engines take a
//! consistent snapshot of ledger rows and produce a plan the repository
//! applies atomically.

use crate::domain::{Decimal, RawAmount, RealizedTrade, Trigger};
use serde::Serialize;

pub mod allocation;
pub mod fifo;

pub use allocation::{check_allocation, AllocationError};
pub use fifo::{plan_reduction, DustPolicy, ReduceError, ReductionRequest};

/// How much of a position a close request wants to shed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CloseTarget {
    /// Absolute token quantity in smallest units.
    Amount(RawAmount),
    /// Share of the currently held quantity. Values above 1 are percentages.
    Percent(Decimal),
    /// Exact quantity already removed on-chain (post-hoc bookkeeping).
    Removed(RawAmount),
}

/// One lot's contribution to a close, before aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    pub lot_id: i64,
    pub quantity: RawAmount,
    pub cost: RawAmount,
    pub entry_price: Decimal,
    pub entry_price_usd: Decimal,
    pub opened_at_ms: i64,
    /// True when the lot's leftover was forced to zero by the dust floor.
    pub dust_forced: bool,
}

/// New closed-quantity total for one touched lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotUpdate {
    pub lot_id: i64,
    /// The updated cumulative closed quantity (never decreases).
    pub closed_quantity: RawAmount,
}

/// The full outcome of one FIFO close, applied as a single transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionPlan {
    pub updates: Vec<LotUpdate>,
    pub slices: Vec<Slice>,
    /// The single aggregated realized-trade row for this request.
    pub trade: RealizedTrade,
    pub summary: ReductionSummary,
}

/// Caller-facing summary of a close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReductionSummary {
    /// Total quantity removed from the ledger, dust-forced leftovers included.
    pub removed: RawAmount,
    /// Lot ids closed to zero.
    pub fully_sold: Vec<i64>,
    /// Lot ids reduced but still open.
    pub partials: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
}

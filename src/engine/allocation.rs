//! Allocation budget check for TP/SL rules.
//!
//! Each rule reserves `max(tpPercent, slPercent)` of the position; across all
//! active rules in a (wallet, mint, strategy) scope the reservations must
//! never exceed 100%. The check is pure and runs against a snapshot of the
//! scope's rules; acceptance and persistence happen in one step so a
//! violating proposal is never partially applied.

use crate::domain::{Decimal, TpSlRule};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("allocation exceeds 100%, currently used: {used}%")]
    BudgetExceeded { used: Decimal },
    #[error("take-profit and stop-loss percentages must be non-negative")]
    NegativePercent,
}

/// Validate a proposed rule against the scope's existing rules.
///
/// `existing` must already be filtered to the proposal's scope. When editing,
/// the rule being replaced is excluded by id so its old weight does not count
/// against its own update.
pub fn check_allocation(existing: &[TpSlRule], proposal: &TpSlRule) -> Result<(), AllocationError> {
    let proposal_weight = proposal.allocation_weight();
    if proposal
        .tp_percent
        .map(|p| p.is_negative())
        .unwrap_or(false)
        || proposal
            .sl_percent
            .map(|p| p.is_negative())
            .unwrap_or(false)
    {
        return Err(AllocationError::NegativePercent);
    }

    let used = existing
        .iter()
        .filter(|r| r.counts_against_budget() && r.id != proposal.id)
        .fold(Decimal::zero(), |acc, r| acc + r.allocation_weight());

    if used + proposal_weight > Decimal::hundred() {
        return Err(AllocationError::BudgetExceeded { used });
    }
    Ok(())
}

//! FIFO reduction engine.
//!
//! Closes part or all of a (wallet, mint, strategy) position by walking the
//! open lots oldest-first, trimming proportional cost basis off each consumed
//! lot, suppressing un-sellable dust leftovers, and aggregating the consumed
//! slices into one realized-trade row.
//!
//! The planner is pure: it sees a consistent snapshot of open lots and emits a
//! [`ReductionPlan`]; persistence happens elsewhere in a single transaction.

use super::{CloseTarget, LotUpdate, ReductionPlan, ReductionSummary, Slice};
use crate::domain::{Decimal, OpenLot, RawAmount, RealizedTrade, Strategy, TimeMs, Trigger};
use thiserror::Error;
use uuid::Uuid;

/// Dust thresholds applied to lot leftovers after trimming.
#[derive(Debug, Clone, Copy)]
pub struct DustPolicy {
    /// Leftovers worth less than this in USD are forced to zero.
    pub min_dust_usd: Decimal,
}

/// A single close request against one position scope.
#[derive(Debug, Clone)]
pub struct ReductionRequest {
    pub target: CloseTarget,
    pub exit_price: Decimal,
    pub exit_price_usd: Decimal,
    pub trigger: Option<Trigger>,
    pub closed_at: TimeMs,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReduceError {
    #[error("No matching open trades")]
    NoOpenLots,
    #[error("Invalid sell amount")]
    InvalidAmount,
}

/// Plan a FIFO close over the given snapshot of lots.
///
/// Lots that are already fully closed are ignored. The returned plan never
/// takes any lot's closed quantity past its acquired quantity.
pub fn plan_reduction(
    lots: &[OpenLot],
    req: &ReductionRequest,
    dust: &DustPolicy,
) -> Result<ReductionPlan, ReduceError> {
    let mut open: Vec<&OpenLot> = lots.iter().filter(|l| l.is_open()).collect();
    if open.is_empty() {
        return Err(ReduceError::NoOpenLots);
    }
    open.sort_by_key(|l| (l.created_at, l.id));

    let total_held = open
        .iter()
        .fold(RawAmount::ZERO, |acc, l| {
            acc.checked_add(l.remaining()).unwrap_or(RawAmount(u128::MAX))
        });

    let to_sell = match req.target {
        CloseTarget::Amount(a) | CloseTarget::Removed(a) => a,
        CloseTarget::Percent(p) => total_held.scale_floor(p.as_fraction()),
    };
    if to_sell.is_zero() {
        return Err(ReduceError::InvalidAmount);
    }

    let mut progress = RawAmount::ZERO;
    let mut slices = Vec::new();
    let mut updates = Vec::new();
    let mut fully_sold = Vec::new();
    let mut partials = Vec::new();

    for lot in &open {
        if progress >= to_sell {
            break;
        }
        let remaining = lot.remaining();
        let remaining_cost = lot.remaining_cost();
        let mut close_tok = remaining.min(to_sell.saturating_sub(progress));
        progress = progress.checked_add(close_tok).unwrap_or(to_sell);

        let leftover = remaining.saturating_sub(close_tok);
        let mut dust_forced = false;
        if !leftover.is_zero() {
            let below_absolute = leftover < RawAmount::dust_threshold(lot.decimals);
            let below_usd = leftover.usd_value(req.exit_price_usd, lot.decimals) < dust.min_dust_usd;
            if below_absolute || below_usd {
                close_tok = remaining;
                dust_forced = true;
            }
        }

        let cost_trim = if close_tok == remaining {
            remaining_cost
        } else {
            remaining_cost.proportion(close_tok, remaining)
        };

        let new_closed = lot
            .closed_quantity
            .checked_add(close_tok)
            .unwrap_or(lot.acquired_quantity)
            .min(lot.acquired_quantity);

        slices.push(Slice {
            lot_id: lot.id,
            quantity: close_tok,
            cost: cost_trim,
            entry_price: lot.entry_price,
            entry_price_usd: lot.entry_price_usd,
            opened_at_ms: lot.created_at.as_ms(),
            dust_forced,
        });
        updates.push(LotUpdate {
            lot_id: lot.id,
            closed_quantity: new_closed,
        });
        if new_closed == lot.acquired_quantity {
            fully_sold.push(lot.id);
        } else {
            partials.push(lot.id);
        }
    }

    let first = open.first().expect("non-empty checked above");
    let trade = aggregate_trade(&slices, first, req);
    let removed = slices
        .iter()
        .fold(RawAmount::ZERO, |acc, s| {
            acc.checked_add(s.quantity).unwrap_or(RawAmount(u128::MAX))
        });

    let summary = ReductionSummary {
        removed,
        fully_sold,
        partials,
        trigger: trade.trigger,
    };

    Ok(ReductionPlan {
        updates,
        slices,
        trade,
        summary,
    })
}

/// Collapse all slices of one request into a single realized-trade row with
/// quantity-weighted entry prices.
fn aggregate_trade(slices: &[Slice], first_lot: &OpenLot, req: &ReductionRequest) -> RealizedTrade {
    let mut total_qty = RawAmount::ZERO;
    let mut total_cost = RawAmount::ZERO;
    let mut opened_at_ms = i64::MAX;

    for slice in slices {
        total_qty = total_qty.checked_add(slice.quantity).unwrap_or(total_qty);
        total_cost = total_cost.checked_add(slice.cost).unwrap_or(total_cost);
        opened_at_ms = opened_at_ms.min(slice.opened_at_ms);
    }

    // Weights are exact integer quantities. Totals wider than the decimal
    // mantissa get every quantity scaled down by one common power of ten,
    // which preserves the ratios.
    let divisor = weight_divisor(total_qty);
    let total_weight = quantity_weight(total_qty, divisor);
    let (entry_price, entry_price_usd) = if total_weight.is_positive() {
        let mut entry = Decimal::zero();
        let mut entry_usd = Decimal::zero();
        for slice in slices {
            let share = quantity_weight(slice.quantity, divisor) / total_weight;
            entry = entry + slice.entry_price * share;
            entry_usd = entry_usd + slice.entry_price_usd * share;
        }
        (entry, entry_usd)
    } else {
        (Decimal::zero(), Decimal::zero())
    };

    let mut trade = RealizedTrade {
        event_id: Uuid::new_v4(),
        wallet_id: first_lot.wallet_id.clone(),
        mint: first_lot.mint.clone(),
        strategy: first_lot.strategy.clone(),
        closed_quantity: total_qty,
        closed_cost: total_cost,
        decimals: first_lot.decimals,
        entry_price,
        entry_price_usd,
        exit_price: req.exit_price,
        exit_price_usd: req.exit_price_usd,
        trigger: req.trigger,
        opened_at: TimeMs::new(if opened_at_ms == i64::MAX {
            req.closed_at.as_ms()
        } else {
            opened_at_ms
        }),
        closed_at: req.closed_at,
    };

    let (trigger, strategy) = relabel_trigger(req.trigger, &trade);
    trade.trigger = trigger;
    trade.strategy = strategy;
    trade
}

/// Smallest power of ten that brings `total` inside the decimal mantissa.
fn weight_divisor(total: RawAmount) -> u128 {
    let mut divisor = 1u128;
    while Decimal::try_from_u128(total.0 / divisor).is_none() {
        divisor *= 10;
    }
    divisor
}

fn quantity_weight(quantity: RawAmount, divisor: u128) -> Decimal {
    Decimal::try_from_u128(quantity.0 / divisor).unwrap_or_else(Decimal::zero)
}

/// Policy decision carried over from the source system: a caller-supplied
/// tp/sl trigger is kept only when the realized sign agrees with it (gain
/// above +1% for tp, below -1% for sl). Otherwise the trigger is dropped and
/// any `-tp`/`-sl` suffix is stripped from the strategy label, which can
/// override a legitimate manual tp/sl that closed at an unexpected sign.
fn relabel_trigger(
    supplied: Option<Trigger>,
    trade: &RealizedTrade,
) -> (Option<Trigger>, Strategy) {
    let base = trade.strategy.without_trigger_suffix();
    let gain = trade.realized_gain_percent();
    let one = Decimal::one();

    match supplied {
        Some(Trigger::Tp) if gain > one => {
            (Some(Trigger::Tp), Strategy::new(format!("{}-tp", base)))
        }
        Some(Trigger::Sl) if gain < -one => {
            (Some(Trigger::Sl), Strategy::new(format!("{}-sl", base)))
        }
        Some(Trigger::Tp) | Some(Trigger::Sl) => (None, base),
        other => (other, trade.strategy.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Mint, WalletId};

    fn lot(id: i64, created_ms: i64, acquired: u128, cost: u128) -> OpenLot {
        OpenLot {
            id,
            wallet_id: WalletId::new("w1"),
            mint: Mint::new("MintA"),
            cost: RawAmount(cost),
            acquired_quantity: RawAmount(acquired),
            closed_quantity: RawAmount::ZERO,
            decimals: 9,
            strategy: Strategy::new("sniper"),
            entry_price: Decimal::from_str_canonical("0.5").unwrap(),
            entry_price_usd: Decimal::from_str_canonical("100").unwrap(),
            created_at: TimeMs::new(created_ms),
            extensions: None,
        }
    }

    fn req(target: CloseTarget) -> ReductionRequest {
        ReductionRequest {
            target,
            exit_price: Decimal::from_str_canonical("0.6").unwrap(),
            exit_price_usd: Decimal::from_str_canonical("120").unwrap(),
            trigger: None,
            closed_at: TimeMs::new(10_000),
        }
    }

    fn dust() -> DustPolicy {
        DustPolicy {
            min_dust_usd: Decimal::from_str_canonical("0.01").unwrap(),
        }
    }

    // Quantities below are whole tokens at 9 decimals.
    const TOK: u128 = 1_000_000_000;

    #[test]
    fn test_fifo_consumes_oldest_first() {
        let lots = vec![lot(2, 2000, 10 * TOK, 100), lot(1, 1000, 10 * TOK, 100)];
        let plan = plan_reduction(&lots, &req(CloseTarget::Amount(RawAmount(15 * TOK))), &dust())
            .unwrap();

        assert_eq!(plan.summary.removed, RawAmount(15 * TOK));
        assert_eq!(plan.summary.fully_sold, vec![1]);
        assert_eq!(plan.summary.partials, vec![2]);

        let update_b = plan.updates.iter().find(|u| u.lot_id == 2).unwrap();
        assert_eq!(update_b.closed_quantity, RawAmount(5 * TOK));
    }

    #[test]
    fn test_no_open_lots() {
        let mut closed = lot(1, 1000, 10 * TOK, 100);
        closed.closed_quantity = closed.acquired_quantity;
        let err = plan_reduction(
            &[closed],
            &req(CloseTarget::Amount(RawAmount(TOK))),
            &dust(),
        )
        .unwrap_err();
        assert_eq!(err, ReduceError::NoOpenLots);

        let err = plan_reduction(&[], &req(CloseTarget::Amount(RawAmount(TOK))), &dust())
            .unwrap_err();
        assert_eq!(err, ReduceError::NoOpenLots);
    }

    #[test]
    fn test_zero_sell_amount_rejected() {
        let lots = vec![lot(1, 1000, 10 * TOK, 100)];
        let err = plan_reduction(
            &lots,
            &req(CloseTarget::Percent(Decimal::zero())),
            &dust(),
        )
        .unwrap_err();
        assert_eq!(err, ReduceError::InvalidAmount);
    }

    #[test]
    fn test_percent_above_one_is_percentage() {
        let lots = vec![lot(1, 1000, 10 * TOK, 1000)];
        let fifty = Decimal::from_str_canonical("50").unwrap();
        let plan = plan_reduction(&lots, &req(CloseTarget::Percent(fifty)), &dust()).unwrap();
        assert_eq!(plan.summary.removed, RawAmount(5 * TOK));
    }

    #[test]
    fn test_fraction_percent() {
        let lots = vec![lot(1, 1000, 10 * TOK, 1000)];
        let quarter = Decimal::from_str_canonical("0.25").unwrap();
        let plan = plan_reduction(&lots, &req(CloseTarget::Percent(quarter)), &dust()).unwrap();
        assert_eq!(plan.summary.removed, RawAmount(2_500_000_000));
    }

    #[test]
    fn test_proportional_cost_trim() {
        let lots = vec![lot(1, 1000, 100 * TOK, 1000)];
        let plan = plan_reduction(&lots, &req(CloseTarget::Amount(RawAmount(25 * TOK))), &dust())
            .unwrap();
        // 25% of the quantity carries 25% of the cost basis.
        assert_eq!(plan.trade.closed_cost, RawAmount(250));
        assert_eq!(plan.summary.partials, vec![1]);
    }

    #[test]
    fn test_close_never_exceeds_acquired() {
        let lots = vec![lot(1, 1000, 10 * TOK, 100)];
        let plan = plan_reduction(
            &lots,
            &req(CloseTarget::Amount(RawAmount(50 * TOK))),
            &dust(),
        )
        .unwrap();
        assert_eq!(plan.updates[0].closed_quantity, RawAmount(10 * TOK));
        assert_eq!(plan.summary.removed, RawAmount(10 * TOK));
    }

    #[test]
    fn test_dust_leftover_below_absolute_threshold_forced() {
        let lots = vec![lot(1, 1000, 10 * TOK, 100)];
        // Leave 0.005 tokens, below the 0.01-token absolute floor.
        let close = RawAmount(10 * TOK - 5_000_000);
        let plan = plan_reduction(&lots, &req(CloseTarget::Amount(close)), &dust()).unwrap();

        assert_eq!(plan.summary.removed, RawAmount(10 * TOK));
        assert_eq!(plan.summary.fully_sold, vec![1]);
        assert!(plan.slices[0].dust_forced);
    }

    #[test]
    fn test_dust_leftover_below_usd_floor_forced() {
        // 0.02 tokens leftover clears the absolute floor, but at a worthless
        // exit price its USD value is under a cent.
        let lots = vec![lot(1, 1000, 10 * TOK, 100)];
        let close = RawAmount(10 * TOK - 20_000_000);
        let mut request = req(CloseTarget::Amount(close));
        request.exit_price_usd = Decimal::from_str_canonical("0.0001").unwrap();

        let plan = plan_reduction(&lots, &request, &dust()).unwrap();
        assert_eq!(plan.summary.fully_sold, vec![1]);
        assert!(plan.slices[0].dust_forced);
    }

    #[test]
    fn test_meaningful_leftover_stays_open() {
        let lots = vec![lot(1, 1000, 10 * TOK, 100)];
        let plan = plan_reduction(&lots, &req(CloseTarget::Amount(RawAmount(4 * TOK))), &dust())
            .unwrap();
        assert_eq!(plan.summary.partials, vec![1]);
        assert_eq!(plan.updates[0].closed_quantity, RawAmount(4 * TOK));
        assert!(!plan.slices[0].dust_forced);
    }

    #[test]
    fn test_aggregation_weights_entry_price_by_quantity() {
        let mut a = lot(1, 1000, 10 * TOK, 100);
        a.entry_price_usd = Decimal::from_str_canonical("100").unwrap();
        let mut b = lot(2, 2000, 30 * TOK, 100);
        b.entry_price_usd = Decimal::from_str_canonical("200").unwrap();

        let plan = plan_reduction(
            &[a, b],
            &req(CloseTarget::Amount(RawAmount(40 * TOK))),
            &dust(),
        )
        .unwrap();

        // (100*10 + 200*30) / 40 = 175
        assert_eq!(plan.trade.entry_price_usd.to_canonical_string(), "175");
        assert_eq!(plan.trade.opened_at.as_ms(), 1000);
        assert_eq!(plan.trade.closed_quantity, RawAmount(40 * TOK));
    }

    #[test]
    fn test_aggregation_weights_exact_beyond_f64_range() {
        // Quantities past f64's 53-bit integer range must still average
        // exactly: two equal-size lots at 100 and 200 give precisely 150.
        let big = (1u128 << 90) + 1;
        let mut a = lot(1, 1000, big, 100);
        a.entry_price_usd = Decimal::from_str_canonical("100").unwrap();
        let mut b = lot(2, 2000, big, 100);
        b.entry_price_usd = Decimal::from_str_canonical("200").unwrap();

        let plan = plan_reduction(
            &[a, b],
            &req(CloseTarget::Percent(Decimal::hundred())),
            &dust(),
        )
        .unwrap();
        assert_eq!(plan.trade.entry_price_usd.to_canonical_string(), "150");
        assert_eq!(plan.trade.closed_quantity, RawAmount(2 * big));
    }

    #[test]
    fn test_tp_trigger_kept_on_gain() {
        let lots = vec![lot(1, 1000, 10 * TOK, 100)];
        let mut request = req(CloseTarget::Amount(RawAmount(10 * TOK)));
        request.trigger = Some(Trigger::Tp);
        // entry 100 -> exit 120: +20%, tp is consistent
        let plan = plan_reduction(&lots, &request, &dust()).unwrap();
        assert_eq!(plan.trade.trigger, Some(Trigger::Tp));
        assert_eq!(plan.trade.strategy, Strategy::new("sniper-tp"));
    }

    #[test]
    fn test_tp_trigger_dropped_on_loss() {
        let mut l = lot(1, 1000, 10 * TOK, 100);
        l.strategy = Strategy::new("sniper-tp");
        let mut request = req(CloseTarget::Amount(RawAmount(10 * TOK)));
        request.trigger = Some(Trigger::Tp);
        request.exit_price_usd = Decimal::from_str_canonical("80").unwrap();

        let plan = plan_reduction(&[l], &request, &dust()).unwrap();
        assert_eq!(plan.trade.trigger, None);
        assert_eq!(plan.trade.strategy, Strategy::new("sniper"));
        assert_eq!(plan.summary.trigger, None);
    }

    #[test]
    fn test_sl_trigger_kept_on_loss() {
        let lots = vec![lot(1, 1000, 10 * TOK, 100)];
        let mut request = req(CloseTarget::Amount(RawAmount(10 * TOK)));
        request.trigger = Some(Trigger::Sl);
        request.exit_price_usd = Decimal::from_str_canonical("80").unwrap();

        let plan = plan_reduction(&lots, &request, &dust()).unwrap();
        assert_eq!(plan.trade.trigger, Some(Trigger::Sl));
        assert_eq!(plan.trade.strategy, Strategy::new("sniper-sl"));
    }

    #[test]
    fn test_sl_trigger_dropped_inside_noise_band() {
        // +0.5% gain: neither tp nor sl territory, trigger dropped.
        let lots = vec![lot(1, 1000, 10 * TOK, 100)];
        let mut request = req(CloseTarget::Amount(RawAmount(10 * TOK)));
        request.trigger = Some(Trigger::Sl);
        request.exit_price_usd = Decimal::from_str_canonical("100.5").unwrap();

        let plan = plan_reduction(&lots, &request, &dust()).unwrap();
        assert_eq!(plan.trade.trigger, None);
    }

    #[test]
    fn test_manual_trigger_untouched() {
        let lots = vec![lot(1, 1000, 10 * TOK, 100)];
        let mut request = req(CloseTarget::Amount(RawAmount(10 * TOK)));
        request.trigger = Some(Trigger::Manual);
        request.exit_price_usd = Decimal::from_str_canonical("80").unwrap();

        let plan = plan_reduction(&lots, &request, &dust()).unwrap();
        assert_eq!(plan.trade.trigger, Some(Trigger::Manual));
        assert_eq!(plan.trade.strategy, Strategy::new("sniper"));
    }

    #[test]
    fn test_partially_closed_lot_uses_remaining() {
        let mut l = lot(1, 1000, 10 * TOK, 1000);
        l.closed_quantity = RawAmount(5 * TOK);

        let plan = plan_reduction(
            &[l],
            &req(CloseTarget::Amount(RawAmount(5 * TOK))),
            &dust(),
        )
        .unwrap();
        assert_eq!(plan.summary.fully_sold, vec![1]);
        // Remaining half of the basis, 500, is consumed.
        assert_eq!(plan.trade.closed_cost, RawAmount(500));
    }
}

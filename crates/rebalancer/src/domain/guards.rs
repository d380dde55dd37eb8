//! Safety predicates. All guards are pure and order-independent: they only
//! inspect their inputs and report whether the condition triggered.

use {crate::domain::snapshot::PoolSnapshot, itertools::Itertools, std::collections::HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardOutcome {
    pub triggered: bool,
    pub reason: String,
}

impl GuardOutcome {
    fn clear() -> Self {
        Self {
            triggered: false,
            reason: String::new(),
        }
    }

    fn triggered(reason: String) -> Self {
        Self {
            triggered: true,
            reason,
        }
    }
}

/// Triggers if any watched stable deviates from $1.00 by more than the
/// threshold.
pub fn depeg(stable_prices: &HashMap<String, f64>, depeg_threshold_bps: i64) -> GuardOutcome {
    // Symbol order fixed so the reported reason is deterministic.
    for (symbol, price) in stable_prices.iter().sorted_by_key(|(symbol, _)| *symbol) {
        let deviation_bps = (price - 1.0).abs() * 10_000.0;
        if deviation_bps > depeg_threshold_bps as f64 {
            return GuardOutcome::triggered(format!(
                "{symbol} at {price} deviates {deviation_bps:.0} bps from peg \
                 (threshold {depeg_threshold_bps} bps)"
            ));
        }
    }
    GuardOutcome::clear()
}

/// Triggers if entering the snapshot's pool would cost more price impact
/// than the policy tolerates.
pub fn slippage(snapshot: &PoolSnapshot, max_price_impact_bps: i64) -> GuardOutcome {
    if snapshot.slippage_bps > max_price_impact_bps {
        return GuardOutcome::triggered(format!(
            "{} slippage {} bps exceeds {} bps",
            snapshot.pool_id, snapshot.slippage_bps, max_price_impact_bps
        ));
    }
    GuardOutcome::clear()
}

/// Triggers if the pool's incentive APR collapsed relative to the previous
/// observation. Without a prior observation (or with a non-positive prior)
/// there is nothing to compare against.
pub fn apr_cliff(
    previous: Option<&PoolSnapshot>,
    current: &PoolSnapshot,
    apr_cliff_drop_bps: i64,
) -> GuardOutcome {
    let Some(previous) = previous else {
        return GuardOutcome::clear();
    };
    if previous.incentive_apr_bps <= 0 {
        return GuardOutcome::clear();
    }
    let drop = previous.incentive_apr_bps - current.incentive_apr_bps;
    let drop_bps = (drop as f64 / previous.incentive_apr_bps as f64 * 10_000.0).floor() as i64;
    if drop_bps > apr_cliff_drop_bps {
        return GuardOutcome::triggered(format!(
            "{} incentive APR fell {} -> {} bps ({} bps drop, cliff {} bps)",
            current.pool_id,
            previous.incentive_apr_bps,
            current.incentive_apr_bps,
            drop_bps,
            apr_cliff_drop_bps
        ));
    }
    GuardOutcome::clear()
}

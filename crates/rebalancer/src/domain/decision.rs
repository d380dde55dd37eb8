//! The decision engine: a deterministic function from the current market
//! observations and the stored position to the action the executor should
//! attempt this tick.

use {
    crate::domain::{
        guards,
        policy::Policy,
        pool::Pool,
        position::Position,
        snapshot::PoolSnapshot,
    },
    alloy::primitives::{Address, U256},
    serde::{Deserialize, Serialize},
    std::collections::{HashMap, HashSet},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Hold,
    Enter,
    Rotate,
    ExitToPark,
}

impl Action {
    /// Whether the executor has anything to do for this action.
    pub fn actionable(self) -> bool {
        !matches!(self, Action::Hold)
    }
}

/// Stable audit codes. Persisted as their numeric value. Codes 1 through
/// 9 are produced only by the autonomous decision flow; operator-forced
/// actions carry their own code so log consumers can tell the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    InitialDeploy = 1,
    ApyUpgrade = 2,
    DepegExit = 3,
    AprCliffExit = 4,
    MinHoldActive = 5,
    DeltaBelowThreshold = 6,
    PaybackTooLong = 7,
    SlippageTooHigh = 8,
    NoEligiblePool = 9,
    OperatorRequest = 10,
}

impl ReasonCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::InitialDeploy,
            2 => Self::ApyUpgrade,
            3 => Self::DepegExit,
            4 => Self::AprCliffExit,
            5 => Self::MinHoldActive,
            6 => Self::DeltaBelowThreshold,
            7 => Self::PaybackTooLong,
            8 => Self::SlippageTooHigh,
            9 => Self::NoEligiblePool,
            10 => Self::OperatorRequest,
            _ => return None,
        })
    }
}

impl Serialize for ReasonCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ReasonCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown reason code {code}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub timestamp: i64,
    pub action: Action,
    pub reason_code: ReasonCode,
    pub reason: String,
    pub chosen_pool_id: Option<String>,
    pub from_pool_id: Option<String>,
    pub emergency: bool,
    pub old_net_apy_bps: i64,
    pub new_net_apy_bps: i64,
    pub estimated_payback_hours: Option<f64>,
}

/// Everything the engine is allowed to look at. The engine never reaches
/// outside this struct, which is what makes decisions reproducible from the
/// audit log.
pub struct DecisionInput<'a> {
    pub now_ts: i64,
    pub position: &'a Position,
    /// This tick's snapshots, ranked by the scanner.
    pub snapshots: &'a [PoolSnapshot],
    /// Snapshots retained from earlier ticks, oldest first.
    pub previous_snapshots: &'a [PoolSnapshot],
    pub stable_prices: &'a HashMap<String, f64>,
    /// Movement-cap preview: when present, entries are restricted to these
    /// pools.
    pub deployable_entry_pool_ids: Option<&'a HashSet<String>>,
    pub pools: &'a [Pool],
    pub deposit_token: Address,
    pub trade_amount: U256,
    pub policy: &'a Policy,
}

/// Estimates what rotating out of `from` into `to` costs, in bps of the
/// moved amount. Synchronous so the decision engine stays pure.
pub trait CostModel {
    fn rotation_cost_bps(&self, from: &Pool, to: &Pool, amount_in: U256) -> i64;
}

/// Placeholder model pending a quote-stitched path: the worse of the two
/// pools' static rotation costs.
pub struct StaticCostModel;

impl CostModel for StaticCostModel {
    fn rotation_cost_bps(&self, from: &Pool, to: &Pool, _amount_in: U256) -> i64 {
        if from.id == to.id {
            return 0;
        }
        from.rotation_cost_bps.max(to.rotation_cost_bps)
    }
}

/// Hours until the APY uplift of a rotation has paid for its cost.
pub fn estimated_payback_hours(cost_bps: i64, delta_bps: i64) -> f64 {
    if delta_bps <= 0 {
        return f64::INFINITY;
    }
    cost_bps as f64 / delta_bps as f64 * 24.0 * 365.0
}

pub fn decide(input: &DecisionInput, cost_model: &dyn CostModel) -> Decision {
    let pool_by_id: HashMap<&str, &Pool> =
        input.pools.iter().map(|pool| (pool.id.as_str(), pool)).collect();

    // Eligible = S-tier, enabled, accepting the vault's deposit token, and
    // observed this tick. Ranked deterministically.
    let mut eligible: Vec<&PoolSnapshot> = input
        .snapshots
        .iter()
        .filter(|snapshot| {
            pool_by_id
                .get(snapshot.pool_id.as_str())
                .is_some_and(|pool| pool.selectable(input.deposit_token))
        })
        .collect();
    eligible.sort_by(|a, b| {
        b.net_apy_bps
            .cmp(&a.net_apy_bps)
            .then_with(|| a.slippage_bps.cmp(&b.slippage_bps))
            .then_with(|| a.pool_id.cmp(&b.pool_id))
    });

    if eligible.is_empty() {
        return hold(
            input,
            ReasonCode::NoEligiblePool,
            "no eligible pools in this scan".to_string(),
            None,
        );
    }

    let depeg = guards::depeg(input.stable_prices, input.policy.depeg_threshold_bps);

    match &input.position.pool_id {
        Some(current_id) => decide_deployed(input, cost_model, current_id, &eligible, depeg),
        None => decide_undeployed(input, &eligible, depeg),
    }
}

fn decide_deployed(
    input: &DecisionInput,
    cost_model: &dyn CostModel,
    current_id: &str,
    eligible: &[&PoolSnapshot],
    depeg: guards::GuardOutcome,
) -> Decision {
    let current = input
        .snapshots
        .iter()
        .find(|snapshot| snapshot.pool_id == current_id);
    let current_net = current
        .map(|snapshot| snapshot.net_apy_bps)
        .unwrap_or(input.position.last_net_apy_bps);

    if depeg.triggered {
        return exit_to_park(input, ReasonCode::DepegExit, depeg.reason, current_net);
    }

    if let Some(current) = current {
        let prior = input
            .previous_snapshots
            .iter()
            .rev()
            .find(|snapshot| snapshot.pool_id == current_id);
        let cliff = guards::apr_cliff(prior, current, input.policy.apr_cliff_drop_bps);
        if cliff.triggered {
            return exit_to_park(input, ReasonCode::AprCliffExit, cliff.reason, current_net);
        }
    }

    let entered_at = input.position.entered_at.unwrap_or(0);
    if input.now_ts - entered_at < input.policy.min_hold_seconds {
        let held_for = input.now_ts - entered_at;
        return hold(
            input,
            ReasonCode::MinHoldActive,
            format!(
                "minimum hold active: {held_for}s of {}s",
                input.policy.min_hold_seconds
            ),
            Some(current_id.to_string()),
        );
    }

    let Some(current) = current else {
        return hold(
            input,
            ReasonCode::NoEligiblePool,
            format!("current position {current_id} was not observed this tick"),
            Some(current_id.to_string()),
        );
    };

    let Some(candidate) = best_entry(input, eligible, Some(current_id)) else {
        return hold(
            input,
            ReasonCode::SlippageTooHigh,
            "no alternate pool passes the slippage guard".to_string(),
            Some(current_id.to_string()),
        );
    };

    let delta_bps = candidate.net_apy_bps - current.net_apy_bps;
    if delta_bps < input.policy.rotation_delta_apy_bps {
        return Decision {
            timestamp: input.now_ts,
            action: Action::Hold,
            reason_code: ReasonCode::DeltaBelowThreshold,
            reason: format!(
                "uplift {delta_bps} bps below rotation threshold {} bps",
                input.policy.rotation_delta_apy_bps
            ),
            chosen_pool_id: None,
            from_pool_id: Some(current_id.to_string()),
            emergency: false,
            old_net_apy_bps: current.net_apy_bps,
            new_net_apy_bps: candidate.net_apy_bps,
            estimated_payback_hours: None,
        };
    }

    let pool_by_id: HashMap<&str, &Pool> =
        input.pools.iter().map(|pool| (pool.id.as_str(), pool)).collect();
    let (from_pool, to_pool) = match (
        pool_by_id.get(current_id),
        pool_by_id.get(candidate.pool_id.as_str()),
    ) {
        (Some(from), Some(to)) => (*from, *to),
        _ => {
            return hold(
                input,
                ReasonCode::NoEligiblePool,
                "pool configuration missing for rotation legs".to_string(),
                Some(current_id.to_string()),
            );
        }
    };
    let cost_bps = cost_model.rotation_cost_bps(from_pool, to_pool, input.trade_amount);
    let payback_hours = estimated_payback_hours(cost_bps, delta_bps);
    if payback_hours > input.policy.max_payback_hours {
        return Decision {
            timestamp: input.now_ts,
            action: Action::Hold,
            reason_code: ReasonCode::PaybackTooLong,
            reason: format!(
                "rotation cost {cost_bps} bps pays back in {payback_hours:.0}h, cap {:.0}h",
                input.policy.max_payback_hours
            ),
            chosen_pool_id: None,
            from_pool_id: Some(current_id.to_string()),
            emergency: false,
            old_net_apy_bps: current.net_apy_bps,
            new_net_apy_bps: candidate.net_apy_bps,
            estimated_payback_hours: Some(payback_hours),
        };
    }

    Decision {
        timestamp: input.now_ts,
        action: Action::Rotate,
        reason_code: ReasonCode::ApyUpgrade,
        reason: format!(
            "rotating {} -> {}: {} -> {} bps net APY",
            current_id, candidate.pool_id, current.net_apy_bps, candidate.net_apy_bps
        ),
        chosen_pool_id: Some(candidate.pool_id.clone()),
        from_pool_id: Some(current_id.to_string()),
        emergency: false,
        old_net_apy_bps: current.net_apy_bps,
        new_net_apy_bps: candidate.net_apy_bps,
        estimated_payback_hours: Some(payback_hours),
    }
}

fn decide_undeployed(
    input: &DecisionInput,
    eligible: &[&PoolSnapshot],
    depeg: guards::GuardOutcome,
) -> Decision {
    if depeg.triggered {
        return hold(
            input,
            ReasonCode::NoEligiblePool,
            format!("staying parked: {}", depeg.reason),
            None,
        );
    }

    let Some(candidate) = best_entry(input, eligible, None) else {
        return hold(
            input,
            ReasonCode::SlippageTooHigh,
            "no pool passes the slippage guard".to_string(),
            None,
        );
    };

    Decision {
        timestamp: input.now_ts,
        action: Action::Enter,
        reason_code: ReasonCode::InitialDeploy,
        reason: format!(
            "deploying into {} at {} bps net APY",
            candidate.pool_id, candidate.net_apy_bps
        ),
        chosen_pool_id: Some(candidate.pool_id.clone()),
        from_pool_id: None,
        emergency: false,
        old_net_apy_bps: 0,
        new_net_apy_bps: candidate.net_apy_bps,
        estimated_payback_hours: None,
    }
}

/// The best ranked snapshot that passes the slippage guard, excluding
/// `exclude` and respecting the deployable-entry restriction.
fn best_entry<'a>(
    input: &DecisionInput,
    eligible: &[&'a PoolSnapshot],
    exclude: Option<&str>,
) -> Option<&'a PoolSnapshot> {
    eligible
        .iter()
        .filter(|snapshot| exclude.is_none_or(|id| snapshot.pool_id != id))
        .filter(|snapshot| {
            input
                .deployable_entry_pool_ids
                .is_none_or(|ids| ids.contains(&snapshot.pool_id))
        })
        .find(|snapshot| !guards::slippage(snapshot, input.policy.max_price_impact_bps).triggered)
        .copied()
}

fn hold(
    input: &DecisionInput,
    reason_code: ReasonCode,
    reason: String,
    from_pool_id: Option<String>,
) -> Decision {
    Decision {
        timestamp: input.now_ts,
        action: Action::Hold,
        reason_code,
        reason,
        chosen_pool_id: None,
        from_pool_id,
        emergency: false,
        old_net_apy_bps: input.position.last_net_apy_bps,
        new_net_apy_bps: input.position.last_net_apy_bps,
        estimated_payback_hours: None,
    }
}

fn exit_to_park(
    input: &DecisionInput,
    reason_code: ReasonCode,
    reason: String,
    current_net: i64,
) -> Decision {
    Decision {
        timestamp: input.now_ts,
        action: Action::ExitToPark,
        reason_code,
        reason,
        chosen_pool_id: None,
        from_pool_id: input.position.pool_id.clone(),
        emergency: true,
        old_net_apy_bps: current_net,
        new_net_apy_bps: 0,
        estimated_payback_hours: None,
    }
}

//! Per-protocol strategy adapters. Every venue on the allow-list names the
//! adapter that knows how to read its economics and build vault requests
//! for it; the rest of the agent only sees the [`Adapter`] trait.

use {
    crate::{
        domain::{CostModel, Pool, StaticCostModel},
        infra::vault::{EnterRequest, ExitRequest},
    },
    alloy::primitives::{Address, Bytes, U256},
    std::{collections::HashMap, sync::Arc},
};

pub mod aave;
pub mod erc4626;
pub mod mock;

pub use {aave::AaveV3Adapter, erc4626::Erc4626Adapter, mock::MockAdapter};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("ADAPTER_UNAVAILABLE: {0}")]
    Unavailable(String),
}

/// Live economics of one pool as the adapter sees them.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolState {
    pub tvl_usd: f64,
    pub reward_rate_per_second: f64,
    pub reward_token_symbol: String,
    pub base_apy_bps: i64,
    pub protocol_fee_bps: i64,
}

/// What the executor wants to enter with. The adapter may tighten
/// `min_out` from a fresh quote but never loosens it past the policy
/// tolerance implied by the requested value.
#[derive(Debug, Clone)]
pub struct EnterIntent<'a> {
    pub pool: &'a Pool,
    pub amount_in: U256,
    pub min_out: U256,
    pub deadline: u64,
    pub net_apy_bps: i64,
    pub intended_hold_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct ExitIntent<'a> {
    pub pool: &'a Pool,
    pub token_out: Address,
    pub amount_in: U256,
    pub min_out: U256,
    pub deadline: u64,
}

#[async_trait::async_trait]
pub trait Adapter: Send + Sync {
    /// Reads the pool's live economics. Falls back to the pool's static
    /// mock block on transient RPC failures whenever that fallback is
    /// deterministic; only fails when no safe fallback exists.
    async fn fetch_pool_state(&self, pool: &Pool) -> Result<PoolState, Error>;

    /// Price impact of entering with `amount_in`, in bps. Zero for
    /// non-positive amounts and for adapters that opt out of quote
    /// estimation.
    async fn estimate_price_impact_bps(&self, pool: &Pool, amount_in: U256) -> Result<i64, Error>;

    /// Cost of moving capital `from` -> `to` in bps of the moved amount.
    fn estimate_rotation_cost_bps(&self, from: &Pool, to: &Pool, _amount_in: U256) -> i64 {
        if from.id == to.id {
            return 0;
        }
        from.rotation_cost_bps.max(to.rotation_cost_bps)
    }

    async fn build_enter_request(&self, intent: EnterIntent<'_>) -> Result<EnterRequest, Error>;

    async fn build_exit_request(&self, intent: ExitIntent<'_>) -> Result<ExitRequest, Error>;
}

/// Adapter lookup by the pool's `adapter_id`.
pub struct Registry {
    adapters: HashMap<&'static str, Arc<dyn Adapter>>,
}

impl Registry {
    /// The standard adapter set. Without a provider every adapter serves
    /// its deterministic fallback, which is what dry runs want.
    pub fn standard(
        provider: Option<contracts::Provider>,
        deposit_token_decimals: u8,
    ) -> Self {
        let mut adapters: HashMap<&'static str, Arc<dyn Adapter>> = HashMap::new();
        adapters.insert("mock", Arc::new(MockAdapter));
        adapters.insert(
            "erc4626",
            Arc::new(Erc4626Adapter::new(provider.clone(), deposit_token_decimals)),
        );
        adapters.insert(
            "aave_v3",
            Arc::new(AaveV3Adapter::new(provider, deposit_token_decimals)),
        );
        Self { adapters }
    }

    pub fn get(&self, adapter_id: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(adapter_id).cloned()
    }

    pub fn known_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.adapters.keys().copied()
    }
}

/// Rotation cost estimation backed by the per-protocol adapters, with the
/// static model as fallback for unknown adapter ids.
pub struct AdapterCostModel {
    registry: Arc<Registry>,
}

impl AdapterCostModel {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl CostModel for AdapterCostModel {
    fn rotation_cost_bps(&self, from: &Pool, to: &Pool, amount_in: U256) -> i64 {
        match self.registry.get(&from.adapter_id) {
            Some(adapter) => adapter.estimate_rotation_cost_bps(from, to, amount_in),
            None => StaticCostModel.rotation_cost_bps(from, to, amount_in),
        }
    }
}

/// Re-derives `min_out` from a fresh quote while preserving the tolerance
/// implied by the originally requested values:
/// `tolerance = clamp(requested * 10000 / amount_in, 1, 10000)` applied to
/// the quote, floored at 1 wei.
pub(crate) fn tighten_min_out(amount_in: U256, requested_min_out: U256, quoted_out: U256) -> U256 {
    if amount_in.is_zero() {
        return requested_min_out.max(U256::from(1));
    }
    let bps = U256::from(10_000);
    let tolerance = (requested_min_out * bps / amount_in)
        .clamp(U256::from(1), bps);
    (quoted_out * tolerance / bps).max(U256::from(1))
}

/// The plain request the simpler adapters build: addresses straight from
/// the pool record, no extra calldata, `min_out` as requested.
pub(crate) fn plain_enter_request(intent: &EnterIntent<'_>) -> EnterRequest {
    EnterRequest {
        target: intent.pool.target,
        pool: intent.pool.pool,
        token_in: intent.pool.token_in,
        lp_token: intent.pool.lp_token,
        amount_in: intent.amount_in,
        min_out: intent.min_out.max(U256::from(1)),
        deadline: intent.deadline,
        data: Bytes::new(),
        pair: intent.pool.pair.clone(),
        protocol: intent.pool.protocol.clone(),
        net_apy_bps: intent.net_apy_bps,
        intended_hold_seconds: intent.intended_hold_seconds,
    }
}

pub(crate) fn plain_exit_request(intent: &ExitIntent<'_>) -> ExitRequest {
    ExitRequest {
        target: intent.pool.target,
        pool: intent.pool.pool,
        lp_token: intent.pool.lp_token,
        token_out: intent.token_out,
        amount_in: intent.amount_in,
        min_out: intent.min_out.max(U256::from(1)),
        deadline: intent.deadline,
        data: Bytes::new(),
        pair: intent.pool.pair.clone(),
        protocol: intent.pool.protocol.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_is_preserved_when_tightening() {
        // Requested 0.3% below par; quote of 995 tightens proportionally.
        let min_out = tighten_min_out(
            U256::from(1_000_000u64),
            U256::from(997_000u64),
            U256::from(995_000u64),
        );
        assert_eq!(min_out, U256::from(992_015u64));
    }

    #[test]
    fn tolerance_clamps_to_full_range() {
        // A requested min_out above par clamps the tolerance at 10000.
        let min_out = tighten_min_out(
            U256::from(1_000u64),
            U256::from(2_000u64),
            U256::from(900u64),
        );
        assert_eq!(min_out, U256::from(900u64));
        // Tiny requested min_out clamps at 1 bps and still floors at 1 wei.
        let min_out = tighten_min_out(U256::from(1_000_000u64), U256::ZERO, U256::from(50u64));
        assert_eq!(min_out, U256::from(1u64));
    }

    #[test]
    fn zero_amount_keeps_request() {
        assert_eq!(
            tighten_min_out(U256::ZERO, U256::from(7u64), U256::from(3u64)),
            U256::from(7u64)
        );
    }

    #[test]
    fn registry_serves_standard_ids() {
        let registry = Registry::standard(None, 6);
        for id in ["mock", "erc4626", "aave_v3"] {
            assert!(registry.get(id).is_some(), "missing {id}");
        }
        assert!(registry.get("unknown").is_none());
    }
}

//! Adapter backed entirely by the pool's static mock economics. Used for
//! venues without live reads and as the scan target in dry runs.

use {
    super::{Adapter, EnterIntent, Error, ExitIntent, PoolState, plain_enter_request, plain_exit_request},
    crate::{
        domain::Pool,
        infra::vault::{EnterRequest, ExitRequest},
    },
    alloy::primitives::U256,
};

pub struct MockAdapter;

#[async_trait::async_trait]
impl Adapter for MockAdapter {
    async fn fetch_pool_state(&self, pool: &Pool) -> Result<PoolState, Error> {
        Ok(PoolState {
            tvl_usd: pool.mock.tvl_usd,
            reward_rate_per_second: pool.mock.reward_rate_per_second,
            reward_token_symbol: pool.reward_token_symbol.clone(),
            base_apy_bps: pool.base_apy_bps,
            protocol_fee_bps: pool.mock.protocol_fee_bps,
        })
    }

    async fn estimate_price_impact_bps(
        &self,
        pool: &Pool,
        amount_in: U256,
    ) -> Result<i64, Error> {
        if amount_in.is_zero() {
            return Ok(0);
        }
        Ok(pool.mock.slippage_bps.max(0))
    }

    async fn build_enter_request(&self, intent: EnterIntent<'_>) -> Result<EnterRequest, Error> {
        Ok(plain_enter_request(&intent))
    }

    async fn build_exit_request(&self, intent: ExitIntent<'_>) -> Result<ExitRequest, Error> {
        Ok(plain_exit_request(&intent))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::domain::{MockEconomics, PoolTier},
        alloy::primitives::Address,
    };

    fn pool() -> Pool {
        Pool {
            id: "mock-pool".to_string(),
            protocol: "mock".to_string(),
            pair: "USDC/USDT".to_string(),
            tier: PoolTier::S,
            enabled: true,
            adapter_id: "mock".to_string(),
            target: Address::repeat_byte(1),
            pool: Address::repeat_byte(2),
            lp_token: Address::repeat_byte(3),
            token_in: Address::repeat_byte(4),
            base_apy_bps: 300,
            base_apy_source: Default::default(),
            reward_token_symbol: "CRV".to_string(),
            rotation_cost_bps: 12,
            mock: MockEconomics {
                tvl_usd: 2_000_000.0,
                reward_rate_per_second: 0.05,
                reward_token_price_usd: 0.4,
                protocol_fee_bps: 10,
                slippage_bps: 7,
            },
        }
    }

    #[tokio::test]
    async fn serves_mock_economics() {
        let state = MockAdapter.fetch_pool_state(&pool()).await.unwrap();
        assert_eq!(state.tvl_usd, 2_000_000.0);
        assert_eq!(state.base_apy_bps, 300);
        assert_eq!(state.protocol_fee_bps, 10);
    }

    #[tokio::test]
    async fn zero_amount_has_zero_impact() {
        let adapter = MockAdapter;
        assert_eq!(
            adapter
                .estimate_price_impact_bps(&pool(), U256::ZERO)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            adapter
                .estimate_price_impact_bps(&pool(), U256::from(1u64))
                .await
                .unwrap(),
            7
        );
    }

    #[tokio::test]
    async fn enter_request_floors_min_out() {
        let pool = pool();
        let request = MockAdapter
            .build_enter_request(EnterIntent {
                pool: &pool,
                amount_in: U256::from(100u64),
                min_out: U256::ZERO,
                deadline: 123,
                net_apy_bps: 400,
                intended_hold_seconds: 86_400,
            })
            .await
            .unwrap();
        assert_eq!(request.min_out, U256::from(1u64));
        assert_eq!(request.deadline, 123);
        assert_eq!(request.net_apy_bps, 400);
    }
}

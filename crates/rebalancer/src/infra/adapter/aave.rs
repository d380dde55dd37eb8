//! Aave v3 reserve adapter. Supplying mints aTokens 1:1, so the adapter
//! opts out of quote-based price impact estimation and reports zero.

use {
    super::{Adapter, EnterIntent, Error, ExitIntent, PoolState, plain_enter_request, plain_exit_request},
    crate::{
        domain::Pool,
        infra::vault::{EnterRequest, ExitRequest},
    },
    alloy::primitives::U256,
    contracts::{IAaveV3Pool, IERC20},
};

pub struct AaveV3Adapter {
    provider: Option<contracts::Provider>,
    deposit_token_decimals: u8,
}

impl AaveV3Adapter {
    pub fn new(provider: Option<contracts::Provider>, deposit_token_decimals: u8) -> Self {
        Self {
            provider,
            deposit_token_decimals,
        }
    }

    /// Reserve TVL approximated by the aToken supply, priced at par.
    async fn reserve_tvl_usd(&self, pool: &Pool) -> Option<f64> {
        let provider = self.provider.as_ref()?;
        let data = IAaveV3Pool::new(pool.pool, provider.clone())
            .getReserveData(pool.token_in)
            .call()
            .await
            .ok()?;
        let supply = IERC20::new(data.aTokenAddress, provider.clone())
            .totalSupply()
            .call()
            .await
            .ok()?;
        let scale = 10f64.powi(i32::from(self.deposit_token_decimals));
        Some(supply.to_string().parse::<f64>().unwrap_or(0.0) / scale)
    }
}

#[async_trait::async_trait]
impl Adapter for AaveV3Adapter {
    async fn fetch_pool_state(&self, pool: &Pool) -> Result<PoolState, Error> {
        let tvl_usd = match self.reserve_tvl_usd(pool).await {
            Some(tvl) => tvl,
            None => {
                tracing::debug!(pool = pool.id, "reserve read unavailable, using mock TVL");
                pool.mock.tvl_usd
            }
        };
        Ok(PoolState {
            tvl_usd,
            reward_rate_per_second: pool.mock.reward_rate_per_second,
            reward_token_symbol: pool.reward_token_symbol.clone(),
            base_apy_bps: pool.base_apy_bps,
            protocol_fee_bps: pool.mock.protocol_fee_bps,
        })
    }

    async fn estimate_price_impact_bps(
        &self,
        _pool: &Pool,
        _amount_in: U256,
    ) -> Result<i64, Error> {
        // Supply/withdraw is 1:1; no quote surface to estimate against.
        Ok(0)
    }

    async fn build_enter_request(&self, intent: EnterIntent<'_>) -> Result<EnterRequest, Error> {
        Ok(plain_enter_request(&intent))
    }

    async fn build_exit_request(&self, intent: ExitIntent<'_>) -> Result<ExitRequest, Error> {
        Ok(plain_exit_request(&intent))
    }
}

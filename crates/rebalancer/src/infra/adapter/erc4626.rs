//! ERC-4626 vault adapter. Quotes come from the vault's own preview
//! functions; TVL from `totalAssets`. Reward economics are not part of the
//! 4626 surface and stay on the pool's mock block.

use {
    super::{
        Adapter, EnterIntent, Error, ExitIntent, PoolState, plain_enter_request,
        plain_exit_request, tighten_min_out,
    },
    crate::{
        domain::Pool,
        infra::vault::{EnterRequest, ExitRequest},
    },
    alloy::primitives::U256,
    contracts::IERC4626,
};

pub struct Erc4626Adapter {
    provider: Option<contracts::Provider>,
    deposit_token_decimals: u8,
}

impl Erc4626Adapter {
    pub fn new(provider: Option<contracts::Provider>, deposit_token_decimals: u8) -> Self {
        Self {
            provider,
            deposit_token_decimals,
        }
    }

    fn vault(&self, pool: &Pool) -> Option<IERC4626::IERC4626Instance<contracts::Provider>> {
        self.provider
            .as_ref()
            .map(|provider| IERC4626::new(pool.pool, provider.clone()))
    }

    /// Deposit-token amounts are priced at par; the deposit token is a
    /// stable and depeg protection lives in the guards, not here.
    fn to_usd(&self, amount: U256) -> f64 {
        let scale = 10f64.powi(i32::from(self.deposit_token_decimals));
        amount.to_string().parse::<f64>().unwrap_or(0.0) / scale
    }

    async fn quoted_impact_bps(&self, pool: &Pool, amount_in: U256) -> Option<i64> {
        let vault = self.vault(pool)?;
        let shares = vault.previewDeposit(amount_in).call().await.ok()?;
        let roundtrip = vault.previewRedeem(shares).call().await.ok()?;
        if roundtrip >= amount_in {
            return Some(0);
        }
        let impact = (amount_in - roundtrip) * U256::from(10_000) / amount_in;
        Some(impact.saturating_to::<i64>())
    }
}

#[async_trait::async_trait]
impl Adapter for Erc4626Adapter {
    async fn fetch_pool_state(&self, pool: &Pool) -> Result<PoolState, Error> {
        let tvl_usd = match self.vault(pool) {
            Some(vault) => match vault.totalAssets().call().await {
                Ok(assets) => self.to_usd(assets),
                Err(err) => {
                    tracing::debug!(pool = pool.id, ?err, "totalAssets read failed, using mock TVL");
                    pool.mock.tvl_usd
                }
            },
            None => pool.mock.tvl_usd,
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
        pool: &Pool,
        amount_in: U256,
    ) -> Result<i64, Error> {
        if amount_in.is_zero() {
            return Ok(0);
        }
        match self.quoted_impact_bps(pool, amount_in).await {
            Some(impact) => Ok(impact.max(0)),
            None => Ok(pool.mock.slippage_bps.max(0)),
        }
    }

    async fn build_enter_request(&self, intent: EnterIntent<'_>) -> Result<EnterRequest, Error> {
        let mut request = plain_enter_request(&intent);
        if let Some(vault) = self.vault(intent.pool)
            && let Ok(shares) = vault.previewDeposit(intent.amount_in).call().await
        {
            request.min_out = tighten_min_out(intent.amount_in, intent.min_out, shares);
        }
        Ok(request)
    }

    async fn build_exit_request(&self, intent: ExitIntent<'_>) -> Result<ExitRequest, Error> {
        let mut request = plain_exit_request(&intent);
        if let Some(vault) = self.vault(intent.pool)
            && let Ok(assets) = vault.previewRedeem(intent.amount_in).call().await
        {
            request.min_out = tighten_min_out(intent.amount_in, intent.min_out, assets);
        }
        Ok(request)
    }
}

//! Live base-APY overrides, resolved per tick for every enabled pool whose
//! configuration names a live source. Failures are logged (deduplicated)
//! and the affected pool simply keeps its static `base_apy_bps`.

use {
    crate::domain::{BaseApySource, Pool, YEAR_SECONDS},
    alloy::{
        eips::{BlockId, BlockNumberOrTag},
        primitives::U256,
        providers::{DynProvider, Provider},
    },
    contracts::{IAaveV3Pool, IERC4626},
    futures::future::join_all,
    std::{
        collections::HashMap,
        sync::Mutex,
        time::{Duration, Instant},
    },
    url::Url,
};

/// Floor for the ERC-4626 lookback window; anything shorter produces too
/// noisy an annualization.
const MIN_LOOKBACK: Duration = Duration::from_secs(300);
const DEFAULT_WARN_COOLDOWN: Duration = Duration::from_secs(300);

/// Probe share amount for ERC-4626 share price reads.
const SHARE_PROBE: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

pub struct BaseApyOracle {
    provider: Option<DynProvider>,
    http: reqwest::Client,
    graphql_url: Option<Url>,
    lookback: Duration,
    warn_cooldown: Duration,
    warned: Mutex<HashMap<String, Instant>>,
}

impl BaseApyOracle {
    pub fn new(
        provider: Option<DynProvider>,
        http: reqwest::Client,
        graphql_url: Option<Url>,
        lookback: Duration,
    ) -> Self {
        Self {
            provider,
            http,
            graphql_url,
            lookback: lookback.max(MIN_LOOKBACK),
            warn_cooldown: DEFAULT_WARN_COOLDOWN,
            warned: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves overrides for all pools in one batched, concurrent pass.
    /// Pools without a live source, and pools whose reads failed, are
    /// absent from the result.
    pub async fn resolve_base_apy_bps_by_pool(&self, pools: &[Pool]) -> HashMap<String, i64> {
        let aave = self.resolve_all(pools, BaseApySource::AaveReserve, |pool| {
            self.read_aave_reserve(pool)
        });
        let graphql = self.resolve_all(pools, BaseApySource::Graphql, |pool| {
            self.read_graphql_apy(pool)
        });
        let lookback = self.resolve_all(pools, BaseApySource::Erc4626Lookback, |pool| {
            self.read_erc4626_lookback(pool)
        });
        let (aave, graphql, lookback) = futures::join!(aave, graphql, lookback);

        aave.into_iter()
            .chain(graphql)
            .chain(lookback)
            .collect()
    }

    async fn resolve_all<'a, F, Fut>(
        &'a self,
        pools: &'a [Pool],
        source: BaseApySource,
        read: F,
    ) -> Vec<(String, i64)>
    where
        F: Fn(&'a Pool) -> Fut,
        Fut: Future<Output = anyhow::Result<i64>> + 'a,
    {
        let reads = pools
            .iter()
            .filter(|pool| pool.enabled && pool.base_apy_source == source)
            .map(|pool| async {
                match read(pool).await {
                    Ok(bps) => Some((pool.id.clone(), bps)),
                    Err(err) => {
                        self.warn_once(&pool.id, &err);
                        None
                    }
                }
            });
        join_all(reads).await.into_iter().flatten().collect()
    }

    async fn read_aave_reserve(&self, pool: &Pool) -> anyhow::Result<i64> {
        let provider = self.require_provider()?;
        let data = IAaveV3Pool::new(pool.pool, provider.clone())
            .getReserveData(pool.token_in)
            .call()
            .await?;
        Ok(ray_to_bps(data.currentLiquidityRate))
    }

    async fn read_graphql_apy(&self, pool: &Pool) -> anyhow::Result<i64> {
        let url = self
            .graphql_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no GraphQL endpoint configured"))?;
        let body = serde_json::json!({
            "query": "query($vault: ID!) { vault(id: $vault) { apy } }",
            "variables": { "vault": format!("{:#x}", pool.pool) },
        });

        #[derive(serde::Deserialize)]
        struct Response {
            data: Data,
        }
        #[derive(serde::Deserialize)]
        struct Data {
            vault: Vault,
        }
        #[derive(serde::Deserialize)]
        struct Vault {
            apy: f64,
        }

        let response: Response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(((response.data.vault.apy * 10_000.0).round() as i64).max(0))
    }

    /// Annualizes the growth of the vault's share price over the lookback
    /// window.
    async fn read_erc4626_lookback(&self, pool: &Pool) -> anyhow::Result<i64> {
        let provider = self.require_provider()?;
        let latest = provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no latest block"))?;
        let latest_number = latest.header.number;
        let latest_ts = latest.header.timestamp;
        let target_ts = latest_ts.saturating_sub(self.lookback.as_secs());

        let past_number = self
            .find_block_at_or_before(provider, target_ts, latest_number)
            .await?;
        let past_ts = self.block_timestamp(provider, past_number).await?;
        let elapsed = latest_ts.saturating_sub(past_ts);
        if elapsed == 0 {
            anyhow::bail!("lookback window collapsed to a single block");
        }

        let vault = IERC4626::new(pool.pool, provider.clone());
        let now_assets = vault.previewRedeem(SHARE_PROBE).call().await?;
        let past_assets = vault
            .previewRedeem(SHARE_PROBE)
            .block(BlockId::number(past_number))
            .call()
            .await?;
        if past_assets.is_zero() {
            anyhow::bail!("past share price is zero");
        }

        let ratio = u256_to_f64(now_assets) / u256_to_f64(past_assets);
        Ok(annualized_bps(ratio, elapsed))
    }

    /// Binary search for the highest block whose timestamp is at or before
    /// `target_ts`.
    async fn find_block_at_or_before(
        &self,
        provider: &DynProvider,
        target_ts: u64,
        latest_number: u64,
    ) -> anyhow::Result<u64> {
        let mut lo = 1u64;
        let mut hi = latest_number;
        while lo < hi {
            let mid = lo + (hi - lo).div_ceil(2);
            if self.block_timestamp(provider, mid).await? <= target_ts {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        Ok(lo)
    }

    async fn block_timestamp(&self, provider: &DynProvider, number: u64) -> anyhow::Result<u64> {
        let block = provider
            .get_block_by_number(number.into())
            .await?
            .ok_or_else(|| anyhow::anyhow!("block {number} not found"))?;
        Ok(block.header.timestamp)
    }

    fn require_provider(&self) -> anyhow::Result<&DynProvider> {
        self.provider
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no RPC provider configured"))
    }

    /// Per-pool warnings are deduplicated so a persistently broken source
    /// does not flood the log every tick.
    fn warn_once(&self, pool_id: &str, err: &anyhow::Error) {
        let mut warned = self.warned.lock().unwrap();
        let now = Instant::now();
        let emit = warned
            .get(pool_id)
            .is_none_or(|last| now.duration_since(*last) >= self.warn_cooldown);
        if emit {
            warned.insert(pool_id.to_string(), now);
            tracing::warn!(pool = pool_id, ?err, "base APY override unavailable");
        } else {
            tracing::debug!(pool = pool_id, ?err, "base APY override unavailable");
        }
    }
}

fn u256_to_f64(value: U256) -> f64 {
    value.to_string().parse().unwrap_or(f64::MAX)
}

/// `ratio^(YEAR / elapsed) - 1`, clamped non-negative, in bps.
fn annualized_bps(ratio: f64, elapsed_seconds: u64) -> i64 {
    if !ratio.is_finite() || ratio <= 0.0 || elapsed_seconds == 0 {
        return 0;
    }
    let periods_per_year = YEAR_SECONDS as f64 / elapsed_seconds as f64;
    let apy = ratio.powf(periods_per_year) - 1.0;
    ((apy * 10_000.0).round() as i64).max(0)
}

/// Aave liquidity rates are rays (1e27) of annual rate.
fn ray_to_bps(rate: u128) -> i64 {
    ((rate as f64 / 1e27 * 10_000.0).round() as i64).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_conversion() {
        // 4.5% liquidity rate.
        assert_eq!(ray_to_bps(45_000_000_000_000_000_000_000_000), 450);
        assert_eq!(ray_to_bps(0), 0);
    }

    #[test]
    fn annualization_of_hourly_growth() {
        // One hour of growth at ~0.00051% compounds to roughly 4.6% a year.
        let bps = annualized_bps(1.0000051, 3_600);
        assert!((440..=460).contains(&bps), "got {bps}");
    }

    #[test]
    fn flat_or_shrinking_share_price_clamps_to_zero() {
        assert_eq!(annualized_bps(1.0, 3_600), 0);
        assert_eq!(annualized_bps(0.999, 3_600), 0);
        assert_eq!(annualized_bps(f64::NAN, 3_600), 0);
    }

    #[test]
    fn lookback_floor_applies() {
        let oracle = BaseApyOracle::new(
            None,
            reqwest::Client::new(),
            None,
            Duration::from_secs(10),
        );
        assert_eq!(oracle.lookback, MIN_LOOKBACK);
    }
}

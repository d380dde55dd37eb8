//! Per-tick market observation: fans out over every enabled pool with an
//! individual deadline, folds in the base-APY overrides and returns ranked
//! snapshots.

use {
    crate::{
        domain::{Pool, PoolSnapshot, YEAR_SECONDS},
        infra::{
            adapter,
            oracle::{BaseApyOracle, PriceOracle},
        },
    },
    alloy::primitives::U256,
    futures::future::join_all,
    std::{sync::Arc, time::Duration},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("SCAN_EMPTY: every enabled pool failed to scan")]
    Empty,
}

pub struct Scanner {
    pools: Arc<Vec<Pool>>,
    adapters: Arc<adapter::Registry>,
    price_oracle: Arc<dyn PriceOracle>,
    base_apy_oracle: Arc<BaseApyOracle>,
    pool_timeout: Duration,
    trade_amount: U256,
}

struct Observation {
    state: adapter::PoolState,
    reward_token_price_usd: f64,
    slippage_bps: i64,
}

impl Scanner {
    pub fn new(
        pools: Arc<Vec<Pool>>,
        adapters: Arc<adapter::Registry>,
        price_oracle: Arc<dyn PriceOracle>,
        base_apy_oracle: Arc<BaseApyOracle>,
        pool_timeout: Duration,
        trade_amount: U256,
    ) -> Self {
        Self {
            pools,
            adapters,
            price_oracle,
            base_apy_oracle,
            pool_timeout,
            trade_amount,
        }
    }

    /// Scans all enabled pools. Individual failures are logged and skipped;
    /// only a scan in which every enabled pool failed is an error.
    pub async fn scan(&self, now_ts: i64) -> Result<Vec<PoolSnapshot>, Error> {
        let enabled: Vec<&Pool> = self.pools.iter().filter(|pool| pool.enabled).collect();
        if enabled.is_empty() {
            return Ok(Vec::new());
        }

        let enabled_owned: Vec<Pool> = enabled.iter().map(|pool| (*pool).clone()).collect();
        let overrides = self
            .base_apy_oracle
            .resolve_base_apy_bps_by_pool(&enabled_owned);

        let observations = join_all(enabled.iter().map(|pool| async {
            match tokio::time::timeout(self.pool_timeout, self.observe_pool(pool)).await {
                Ok(Ok(observation)) => Some((*pool, observation)),
                Ok(Err(err)) => {
                    tracing::warn!(pool = pool.id, ?err, "pool scan failed");
                    None
                }
                Err(_) => {
                    tracing::warn!(
                        pool = pool.id,
                        timeout = ?self.pool_timeout,
                        "pool scan timed out"
                    );
                    None
                }
            }
        }));

        let (overrides, observations) = futures::join!(overrides, observations);
        let observations: Vec<_> = observations.into_iter().flatten().collect();
        if observations.is_empty() {
            return Err(Error::Empty);
        }

        let mut snapshots: Vec<PoolSnapshot> = observations
            .into_iter()
            .map(|(pool, observation)| {
                let base_apy_bps = overrides
                    .get(&pool.id)
                    .copied()
                    .unwrap_or(observation.state.base_apy_bps);
                build_snapshot(pool, &observation, base_apy_bps, now_ts)
            })
            .collect();

        snapshots.sort_by(|a, b| {
            b.net_apy_bps
                .cmp(&a.net_apy_bps)
                .then_with(|| a.pool_id.cmp(&b.pool_id))
        });
        Ok(snapshots)
    }

    async fn observe_pool(&self, pool: &Pool) -> anyhow::Result<Observation> {
        let adapter = self
            .adapters
            .get(&pool.adapter_id)
            .ok_or_else(|| anyhow::anyhow!("unknown adapter {}", pool.adapter_id))?;
        let state = adapter.fetch_pool_state(pool).await?;
        let reward_token_price_usd = if state.reward_rate_per_second > 0.0 {
            self.price_oracle
                .price_usd(&state.reward_token_symbol)
                .await?
        } else {
            0.0
        };
        let slippage_bps = adapter
            .estimate_price_impact_bps(pool, self.trade_amount)
            .await?
            .max(0);
        Ok(Observation {
            state,
            reward_token_price_usd,
            slippage_bps,
        })
    }
}

fn build_snapshot(
    pool: &Pool,
    observation: &Observation,
    base_apy_bps: i64,
    now_ts: i64,
) -> PoolSnapshot {
    let incentive_apr_bps = incentive_apr_bps(
        observation.state.reward_rate_per_second,
        observation.reward_token_price_usd,
        observation.state.tvl_usd,
    );
    let net_apy_bps =
        (base_apy_bps + incentive_apr_bps - observation.state.protocol_fee_bps).max(0);
    PoolSnapshot {
        pool_id: pool.id.clone(),
        pair: pool.pair.clone(),
        protocol: pool.protocol.clone(),
        timestamp: now_ts,
        tvl_usd: observation.state.tvl_usd,
        incentive_apr_bps,
        net_apy_bps,
        slippage_bps: observation.slippage_bps,
        reward_rate_per_second: observation.state.reward_rate_per_second,
        reward_token_price_usd: observation.reward_token_price_usd,
    }
}

/// Annualized incentive emissions as a fraction of TVL, in bps. Zero for
/// empty pools rather than infinity.
fn incentive_apr_bps(reward_rate_per_second: f64, reward_token_price_usd: f64, tvl_usd: f64) -> i64 {
    if tvl_usd <= 0.0 {
        return 0;
    }
    let apr = reward_rate_per_second * YEAR_SECONDS as f64 * reward_token_price_usd / tvl_usd;
    ((apr * 10_000.0).round() as i64).max(0)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            domain::{MockEconomics, PoolTier},
            infra::oracle::StaticPriceOracle,
        },
        alloy::primitives::Address,
        maplit::hashmap,
    };

    fn pool(id: &str, mock: MockEconomics) -> Pool {
        Pool {
            id: id.to_string(),
            protocol: "mock".to_string(),
            pair: "USDC/USDT".to_string(),
            tier: PoolTier::S,
            enabled: true,
            adapter_id: "mock".to_string(),
            target: Address::repeat_byte(1),
            pool: Address::repeat_byte(2),
            lp_token: Address::repeat_byte(3),
            token_in: Address::repeat_byte(4),
            base_apy_bps: 200,
            base_apy_source: Default::default(),
            reward_token_symbol: "CRV".to_string(),
            rotation_cost_bps: 0,
            mock,
        }
    }

    fn scanner(pools: Vec<Pool>) -> Scanner {
        Scanner::new(
            Arc::new(pools),
            Arc::new(adapter::Registry::standard(None, 6)),
            Arc::new(StaticPriceOracle::new(
                hashmap! { "CRV".to_string() => 0.5 },
                vec!["USDC".to_string()],
            )),
            Arc::new(BaseApyOracle::new(
                None,
                reqwest::Client::new(),
                None,
                Duration::from_secs(3_600),
            )),
            Duration::from_secs(12),
            U256::from(1_000_000u64),
        )
    }

    fn economics(tvl_usd: f64, reward_rate_per_second: f64) -> MockEconomics {
        MockEconomics {
            tvl_usd,
            reward_rate_per_second,
            reward_token_price_usd: 0.5,
            protocol_fee_bps: 0,
            slippage_bps: 5,
        }
    }

    #[tokio::test]
    async fn snapshots_are_ranked_by_net_apy() {
        // 0.01 CRV/s * 31536000 * $0.5 / $1m TVL = 15.768% incentive APR.
        let snapshots = scanner(vec![
            pool("low", economics(10_000_000.0, 0.01)),
            pool("high", economics(1_000_000.0, 0.01)),
        ])
        .scan(1_000)
        .await
        .unwrap();

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].pool_id, "high");
        assert_eq!(snapshots[0].incentive_apr_bps, 1_577);
        assert_eq!(snapshots[0].net_apy_bps, 1_777);
        assert!(
            snapshots
                .windows(2)
                .all(|pair| pair[0].net_apy_bps >= pair[1].net_apy_bps)
        );
    }

    #[tokio::test]
    async fn ties_rank_by_pool_id() {
        let snapshots = scanner(vec![
            pool("b", economics(1_000_000.0, 0.0)),
            pool("a", economics(1_000_000.0, 0.0)),
        ])
        .scan(1_000)
        .await
        .unwrap();
        assert_eq!(snapshots[0].pool_id, "a");
        assert_eq!(snapshots[1].pool_id, "b");
    }

    #[tokio::test]
    async fn empty_tvl_produces_zero_incentive() {
        let snapshots = scanner(vec![pool("a", economics(0.0, 10.0))])
            .scan(1_000)
            .await
            .unwrap();
        assert_eq!(snapshots[0].incentive_apr_bps, 0);
        assert_eq!(snapshots[0].net_apy_bps, 200);
    }

    #[tokio::test]
    async fn net_apy_clamps_at_zero() {
        let mut losing = pool("a", economics(1_000_000.0, 0.0));
        losing.base_apy_bps = 10;
        losing.mock.protocol_fee_bps = 50;
        let snapshots = scanner(vec![losing]).scan(1_000).await.unwrap();
        assert_eq!(snapshots[0].net_apy_bps, 0);
    }

    #[tokio::test]
    async fn disabled_pools_are_skipped() {
        let mut disabled = pool("off", economics(1_000_000.0, 0.0));
        disabled.enabled = false;
        let snapshots = scanner(vec![disabled, pool("on", economics(1_000_000.0, 0.0))])
            .scan(1_000)
            .await
            .unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].pool_id, "on");
    }

    #[tokio::test]
    async fn no_enabled_pools_is_an_empty_scan() {
        let mut disabled = pool("off", economics(1_000_000.0, 0.0));
        disabled.enabled = false;
        assert!(scanner(vec![disabled]).scan(1_000).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn all_pools_failing_is_scan_empty() {
        let mut broken = pool("a", economics(1_000_000.0, 0.0));
        broken.adapter_id = "missing".to_string();
        let result = scanner(vec![broken]).scan(1_000).await;
        assert!(matches!(result, Err(Error::Empty)));
    }
}

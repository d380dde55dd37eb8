use serde::{Deserialize, Serialize};

/// Immutable per-tick economic observation of one pool.
///
/// `net_apy_bps` and `slippage_bps` are clamped non-negative at
/// construction time by the scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub pool_id: String,
    pub pair: String,
    pub protocol: String,
    /// Unix seconds at the start of the tick that produced this snapshot.
    pub timestamp: i64,
    pub tvl_usd: f64,
    pub incentive_apr_bps: i64,
    pub net_apy_bps: i64,
    pub slippage_bps: i64,
    pub reward_rate_per_second: f64,
    pub reward_token_price_usd: f64,
}

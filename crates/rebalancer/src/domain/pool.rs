use {
    alloy::primitives::Address,
    serde::{Deserialize, Serialize},
};

/// A deposit or reward token known to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Token {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
}

/// Selection tier of a pool. Only `S` pools are candidates for automatic
/// capital movement; `R` pools are tracked but reserved for manual action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolTier {
    S,
    R,
}

/// Which source the base-APY oracle uses to override a pool's static
/// `base_apy_bps` with a live reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BaseApySource {
    /// No live override; the static `base_apy_bps` is authoritative.
    #[default]
    Static,
    /// Aave style reserve read (`currentLiquidityRate`).
    AaveReserve,
    /// ERC-4626 share price delta over the configured lookback window.
    Erc4626Lookback,
    /// External vault indexed by the configured GraphQL endpoint.
    Graphql,
}

/// Deterministic fallback economics used when a pool's live reads are
/// unavailable, and the full economics for pools scanned via the mock
/// adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MockEconomics {
    pub tvl_usd: f64,
    pub reward_rate_per_second: f64,
    pub reward_token_price_usd: f64,
    #[serde(default)]
    pub protocol_fee_bps: i64,
    #[serde(default)]
    pub slippage_bps: i64,
}

/// One venue on the allow-list. Referenced everywhere by its stable `id`;
/// the on-chain addresses are only dereferenced by adapters and the
/// executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Pool {
    pub id: String,
    pub protocol: String,
    pub pair: String,
    pub tier: PoolTier,
    pub enabled: bool,
    pub adapter_id: String,
    /// Protocol entry point the vault calls into.
    pub target: Address,
    pub pool: Address,
    pub lp_token: Address,
    pub token_in: Address,
    pub base_apy_bps: i64,
    #[serde(default)]
    pub base_apy_source: BaseApySource,
    pub reward_token_symbol: String,
    #[serde(default)]
    pub rotation_cost_bps: i64,
    pub mock: MockEconomics,
}

impl Pool {
    /// Whether the pool may be selected by the decision engine for the
    /// given vault deposit token.
    pub fn selectable(&self, deposit_token: Address) -> bool {
        self.enabled && self.tier == PoolTier::S && self.token_in == deposit_token
    }
}

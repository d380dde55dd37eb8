use {
    crate::domain::Policy,
    alloy::primitives::{Address, U256},
    clap::ArgAction,
    std::path::PathBuf,
    url::Url,
};

/// Executor key wrapper that never leaks into logs.
#[derive(Clone)]
pub struct Secret(pub String);

impl std::str::FromStr for Secret {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self(value.to_string()))
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[redacted]")
    }
}

#[derive(Debug, clap::Parser)]
pub struct Arguments {
    /// EVM JSON-RPC endpoint.
    #[clap(long, env = "RPC_URL")]
    pub rpc_url: Url,

    /// Expected chain id; a mismatch with the node or the chain config is
    /// fatal at startup.
    #[clap(long, env = "CHAIN_ID")]
    pub chain_id: u64,

    /// The privileged treasury vault.
    #[clap(long, env = "VAULT_ADDRESS")]
    pub vault_address: Address,

    /// Broadcast key. Only needed when actually sending transactions.
    #[clap(long, env = "EXECUTOR_PRIVATE_KEY", hide_env_values = true)]
    pub executor_private_key: Option<Secret>,

    #[clap(long, env = "CHAIN_CONFIG_PATH", default_value = "./config/chain.json")]
    pub chain_config_path: PathBuf,

    #[clap(long, env = "STATE_FILE_PATH", default_value = "./data/state.json")]
    pub state_file_path: PathBuf,

    #[clap(
        long,
        env = "EXPLORER_TX_BASE_URL",
        default_value = "https://etherscan.io/tx/"
    )]
    pub explorer_tx_base_url: String,

    /// Synthesize transaction hashes; never simulate or send.
    #[clap(long, env = "DRY_RUN", action = ArgAction::Set, default_value = "true")]
    pub dry_run: bool,

    /// Allow broadcasting when not in dry-run mode; disarmed means
    /// simulate-only.
    #[clap(long, env = "LIVE_MODE_ARMED", action = ArgAction::Set, default_value = "false")]
    pub live_mode_armed: bool,

    /// Exit after one tick instead of looping.
    #[clap(long, env = "RUN_ONCE", action = ArgAction::Set, default_value = "true")]
    pub run_once: bool,

    #[clap(long, env = "SCAN_INTERVAL_SECONDS", default_value = "300")]
    pub scan_interval_seconds: u64,

    #[clap(long, env = "SCANNER_POOL_TIMEOUT_MS", default_value = "12000")]
    pub scanner_pool_timeout_ms: u64,

    /// Target amount per enter, in deposit token base units. Zero means
    /// "whatever the vault and the movement cap allow".
    #[clap(long, env = "DEFAULT_TRADE_AMOUNT_RAW", default_value = "0")]
    pub default_trade_amount_raw: U256,

    #[clap(long, env = "MAX_ROTATIONS_PER_DAY", default_value = "1")]
    pub max_rotations_per_day: u32,

    #[clap(long, env = "COOLDOWN_SECONDS", default_value = "21600")]
    pub cooldown_seconds: i64,

    #[clap(long, env = "ENTER_ONLY", action = ArgAction::Set, default_value = "false")]
    pub enter_only: bool,

    #[clap(long, env = "TX_DEADLINE_SECONDS", default_value = "1800")]
    pub tx_deadline_seconds: i64,

    #[clap(long, env = "MIN_HOLD_SECONDS", default_value = "86400")]
    pub min_hold_seconds: i64,

    #[clap(long, env = "ROTATION_DELTA_APY_BPS", default_value = "200")]
    pub rotation_delta_apy_bps: i64,

    #[clap(long, env = "MAX_PAYBACK_HOURS", default_value = "72")]
    pub max_payback_hours: f64,

    #[clap(long, env = "DEPEG_THRESHOLD_BPS", default_value = "100")]
    pub depeg_threshold_bps: i64,

    #[clap(long, env = "MAX_PRICE_IMPACT_BPS", default_value = "30")]
    pub max_price_impact_bps: i64,

    #[clap(long, env = "APR_CLIFF_DROP_BPS", default_value = "5000")]
    pub apr_cliff_drop_bps: i64,

    /// Live price endpoint; without it the static oracle is used.
    #[clap(long, env = "PRICE_API_URL")]
    pub price_api_url: Option<Url>,

    #[clap(long, env = "PRICE_CACHE_TTL_SECONDS", default_value = "60")]
    pub price_cache_ttl_seconds: u64,

    #[clap(
        long,
        env = "STABLE_SYMBOLS",
        default_value = "USDC",
        use_value_delimiter = true
    )]
    pub stable_symbols: Vec<String>,

    #[clap(long, env = "BASE_APY_GRAPHQL_URL")]
    pub base_apy_graphql_url: Option<Url>,

    #[clap(long, env = "BASE_APY_LOOKBACK_SECONDS", default_value = "3600")]
    pub base_apy_lookback_seconds: u64,

    /// Announcement webhook; without it announcements are logged only.
    #[clap(long, env = "ANNOUNCER_WEBHOOK_URL")]
    pub announcer_webhook_url: Option<Url>,

    #[clap(long, env = "BOT_STATUS_SERVER_ENABLED", action = ArgAction::Set, default_value = "true")]
    pub bot_status_server_enabled: bool,

    /// Make a status server bind failure fatal.
    #[clap(long, env = "BOT_STATUS_SERVER_REQUIRED", action = ArgAction::Set, default_value = "false")]
    pub bot_status_server_required: bool,

    #[clap(long, env = "BOT_STATUS_HOST", default_value = "0.0.0.0")]
    pub bot_status_host: String,

    #[clap(long, env = "BOT_STATUS_PORT", default_value = "8787")]
    pub bot_status_port: u16,

    #[clap(long, env = "BOT_STATUS_AUTH_TOKEN", hide_env_values = true)]
    pub bot_status_auth_token: Option<String>,

    /// Liveness staleness window; defaults to max(3 * interval, 60).
    #[clap(long, env = "BOT_HEALTH_STALE_SECONDS")]
    pub bot_health_stale_seconds: Option<i64>,

    #[clap(long, env = "LOG_FILTER", default_value = "info,rebalancer=debug")]
    pub log_filter: String,
}

impl Arguments {
    pub fn policy(&self) -> Policy {
        Policy {
            min_hold_seconds: self.min_hold_seconds,
            rotation_delta_apy_bps: self.rotation_delta_apy_bps,
            max_payback_hours: self.max_payback_hours,
            depeg_threshold_bps: self.depeg_threshold_bps,
            max_price_impact_bps: self.max_price_impact_bps,
            apr_cliff_drop_bps: self.apr_cliff_drop_bps,
            tx_deadline_seconds: self.tx_deadline_seconds,
        }
    }

    pub fn health_stale_seconds(&self) -> i64 {
        self.bot_health_stale_seconds
            .unwrap_or_else(|| (3 * self.scan_interval_seconds as i64).max(60))
    }
}

#[cfg(test)]
mod tests {
    use {super::*, clap::Parser};

    fn parse(extra: &[&str]) -> Arguments {
        let mut args = vec![
            "rebalancer",
            "--rpc-url",
            "http://localhost:8545",
            "--chain-id",
            "8453",
            "--vault-address",
            "0x0000000000000000000000000000000000000042",
        ];
        args.extend_from_slice(extra);
        Arguments::parse_from(args)
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let args = parse(&[]);
        assert!(args.dry_run);
        assert!(!args.live_mode_armed);
        assert!(args.run_once);
        assert_eq!(args.scan_interval_seconds, 300);
        assert_eq!(args.scanner_pool_timeout_ms, 12_000);
        assert_eq!(args.max_rotations_per_day, 1);
        assert_eq!(args.cooldown_seconds, 21_600);
        assert_eq!(args.bot_status_port, 8787);
        assert_eq!(args.stable_symbols, vec!["USDC".to_string()]);
        assert_eq!(args.policy().rotation_delta_apy_bps, 200);
    }

    #[test]
    fn stale_window_defaults_to_three_intervals_with_a_floor() {
        let args = parse(&[]);
        assert_eq!(args.health_stale_seconds(), 900);
        let args = parse(&["--scan-interval-seconds", "10"]);
        assert_eq!(args.health_stale_seconds(), 60);
        let args = parse(&["--bot-health-stale-seconds", "42"]);
        assert_eq!(args.health_stale_seconds(), 42);
    }

    #[test]
    fn booleans_accept_explicit_values() {
        let args = parse(&["--dry-run", "false", "--live-mode-armed", "true"]);
        assert!(!args.dry_run);
        assert!(args.live_mode_armed);
    }

    #[test]
    fn secrets_do_not_debug_print() {
        let args = parse(&["--executor-private-key", "0xdeadbeef"]);
        assert!(!format!("{args:?}").contains("deadbeef"));
    }

    #[test]
    fn trade_amount_parses_base_units() {
        let args = parse(&["--default-trade-amount-raw", "2500000000"]);
        assert_eq!(args.default_trade_amount_raw, U256::from(2_500_000_000u64));
    }
}

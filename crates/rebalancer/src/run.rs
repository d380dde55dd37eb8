//! Process startup: parse arguments, build every component, spawn the
//! status server and hand control to the run loop. Only startup faults
//! terminate the process; everything after that is the run loop's problem.

use {
    crate::{
        announce::{Announcer, DisabledClient, SocialClient, WebhookClient},
        api::{self, ApiContext, OperatorHandle},
        arguments::Arguments,
        config::ChainConfig,
        executor::{Executor, Settings},
        infra::{
            adapter,
            oracle::{BaseApyOracle, LivePriceOracle, PriceOracle, StaticPriceOracle},
            vault::OnchainVault,
        },
        run_loop::{RunLoop, RuntimeStatus},
        scanner::Scanner,
        state::StateStore,
    },
    alloy::{
        network::EthereumWallet,
        providers::{DynProvider, Provider, ProviderBuilder},
        signers::local::PrivateKeySigner,
    },
    anyhow::Context,
    clap::Parser,
    std::{
        collections::HashMap,
        net::SocketAddr,
        sync::{Arc, RwLock},
        time::Duration,
    },
    tokio::sync::oneshot,
};

pub async fn start(args: impl Iterator<Item = String>) {
    let args = Arguments::parse_from(args);
    observe::tracing::initialize(&args.log_filter);
    observe::panic_hook::install();
    observe::metrics::setup_registry(Some("treasury_rebalancer".to_string()));
    tracing::info!("running rebalancer with {args:#?}");

    if let Err(err) = run(args).await {
        tracing::error!(?err, "startup failed");
        std::process::exit(1);
    }
}

async fn run(args: Arguments) -> anyhow::Result<()> {
    let chain = ChainConfig::load(&args.chain_config_path)?;
    anyhow::ensure!(
        chain.chain_id == args.chain_id,
        "chain config targets chain {} but CHAIN_ID is {}",
        chain.chain_id,
        args.chain_id
    );

    let signer = args
        .executor_private_key
        .as_ref()
        .map(|key| key.0.parse::<PrivateKeySigner>())
        .transpose()
        .context("parsing executor key")?;
    let has_signer = signer.is_some();
    let provider = build_provider(&args.rpc_url, signer);

    if !args.dry_run {
        // Before anything can be broadcast, make sure the node serves the
        // chain we were configured for.
        let chain_id = provider
            .get_chain_id()
            .await
            .context("reading chain id from the node")?;
        anyhow::ensure!(
            chain_id == args.chain_id,
            "node serves chain {chain_id} but CHAIN_ID is {}",
            args.chain_id
        );
    }

    let adapters = Arc::new(adapter::Registry::standard(
        Some(provider.clone()),
        chain.deposit_token.decimals,
    ));
    chain
        .validate(|id| adapters.get(id).is_some())
        .context("validating chain config")?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("building HTTP client")?;

    let price_oracle: Arc<dyn PriceOracle> = match &args.price_api_url {
        Some(url) => Arc::new(LivePriceOracle::new(
            http.clone(),
            url.clone(),
            Duration::from_secs(args.price_cache_ttl_seconds),
            args.stable_symbols.clone(),
        )),
        None => Arc::new(StaticPriceOracle::new(
            mock_reward_prices(&chain),
            args.stable_symbols.clone(),
        )),
    };

    let base_apy_oracle = Arc::new(BaseApyOracle::new(
        Some(provider.clone()),
        http.clone(),
        args.base_apy_graphql_url.clone(),
        Duration::from_secs(args.base_apy_lookback_seconds),
    ));

    let pools = Arc::new(chain.pools.clone());
    let scanner = Scanner::new(
        pools.clone(),
        adapters.clone(),
        price_oracle.clone(),
        base_apy_oracle,
        Duration::from_millis(args.scanner_pool_timeout_ms),
        args.default_trade_amount_raw,
    );

    let vault = Arc::new(OnchainVault::new(
        provider,
        args.vault_address,
        chain.deposit_token.address,
        has_signer,
    ));
    let executor = Executor::new(
        vault,
        adapters.clone(),
        pools.clone(),
        args.policy(),
        Settings {
            dry_run: args.dry_run,
            live_mode_armed: args.live_mode_armed,
            enter_only: args.enter_only,
            max_rotations_per_day: args.max_rotations_per_day,
            cooldown_seconds: args.cooldown_seconds,
            default_trade_amount_raw: args.default_trade_amount_raw,
            deposit_token: chain.deposit_token.clone(),
        },
    );

    let store = StateStore::open(&args.state_file_path)
        .await
        .context("opening state store")?;

    let social: Arc<dyn SocialClient> = match &args.announcer_webhook_url {
        Some(url) => Arc::new(WebhookClient::new(http, url.clone())),
        None => Arc::new(DisabledClient),
    };
    let announcer = Announcer::new(social, args.explorer_tx_base_url.clone());

    let status = Arc::new(RwLock::new(RuntimeStatus::new(
        chrono::Utc::now().timestamp(),
    )));
    let operator = OperatorHandle::default();

    // Keeps the status server alive until run() returns.
    let _shutdown = spawn_status_server(&args, &status, &store, &operator, &price_oracle).await?;

    let run_loop = RunLoop::new(
        scanner,
        executor,
        store,
        price_oracle,
        announcer,
        pools,
        adapters,
        args.policy(),
        chain.deposit_token,
        args.default_trade_amount_raw,
        status,
        operator,
    );
    run_loop
        .run(
            args.run_once,
            Duration::from_secs(args.scan_interval_seconds),
        )
        .await;
    Ok(())
}

async fn spawn_status_server(
    args: &Arguments,
    status: &Arc<RwLock<RuntimeStatus>>,
    store: &StateStore,
    operator: &OperatorHandle,
    price_oracle: &Arc<dyn PriceOracle>,
) -> anyhow::Result<Option<oneshot::Sender<()>>> {
    if !args.bot_status_server_enabled {
        return Ok(None);
    }
    let context = ApiContext {
        status: status.clone(),
        store: store.clone(),
        operator: operator.clone(),
        price_oracle: price_oracle.clone(),
        auth_token: args.bot_status_auth_token.clone(),
        stale_after_seconds: args.health_stale_seconds(),
    };
    let addr: SocketAddr = format!("{}:{}", args.bot_status_host, args.bot_status_port)
        .parse()
        .context("parsing status server address")?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            tokio::spawn(async move {
                if let Err(err) = api::serve(listener, context, shutdown_rx).await {
                    tracing::error!(?err, "status server terminated");
                }
            });
            Ok(Some(shutdown_tx))
        }
        Err(err) if args.bot_status_server_required => {
            Err(err).context(format!("binding required status server on {addr}"))
        }
        Err(err) => {
            tracing::warn!(?err, %addr, "status server failed to bind, continuing without");
            Ok(None)
        }
    }
}

fn build_provider(url: &url::Url, signer: Option<PrivateKeySigner>) -> DynProvider {
    match signer {
        Some(signer) => ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url.clone())
            .erased(),
        None => ProviderBuilder::new().connect_http(url.clone()).erased(),
    }
}

/// Static fallback prices assembled from the pools' mock economics.
fn mock_reward_prices(chain: &ChainConfig) -> HashMap<String, f64> {
    chain
        .pools
        .iter()
        .filter(|pool| pool.mock.reward_token_price_usd > 0.0)
        .map(|pool| {
            (
                pool.reward_token_symbol.clone(),
                pool.mock.reward_token_price_usd,
            )
        })
        .collect()
}

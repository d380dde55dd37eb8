//! The scheduler: one immediate tick, then one tick per interval, strictly
//! single-flight. A tick that fails is counted and logged but never crashes
//! the process; execution-level failures surfaced by the executor do not
//! fail the tick at all.

use {
    crate::{
        announce::Announcer,
        api::{OperatorAction, OperatorHandle},
        domain::{Action, Decision, DecisionInput, Policy, Pool, ReasonCode, Token, decide},
        executor::Executor,
        infra::{
            adapter::{self, AdapterCostModel},
            oracle::PriceOracle,
        },
        scanner::Scanner,
        state::{StateDocument, StateStore},
    },
    alloy::primitives::U256,
    prometheus::{IntCounter, IntCounterVec, IntGauge, Opts},
    serde::Serialize,
    std::sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    std::time::Duration,
    tracing::Instrument,
};

/// Tick bookkeeping, mutated only by the scheduler and read by the status
/// server through snapshot copies.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub started_at: i64,
    pub in_flight: bool,
    pub total_ticks: u64,
    pub successful_ticks: u64,
    pub failed_ticks: u64,
    pub last_tick_started_at: Option<i64>,
    pub last_tick_finished_at: Option<i64>,
    pub last_successful_tick_at: Option<i64>,
    pub last_error_at: Option<i64>,
    pub last_error_message: Option<String>,
}

impl RuntimeStatus {
    pub fn new(started_at: i64) -> Self {
        Self {
            started_at,
            in_flight: false,
            total_ticks: 0,
            successful_ticks: 0,
            failed_ticks: 0,
            last_tick_started_at: None,
            last_tick_finished_at: None,
            last_successful_tick_at: None,
            last_error_at: None,
            last_error_message: None,
        }
    }
}

struct Metrics {
    ticks_ok: IntCounter,
    ticks_failed: IntCounter,
    decisions: IntCounterVec,
    last_successful_tick: IntGauge,
}

impl Metrics {
    fn new() -> Self {
        let registry = observe::metrics::get_registry();
        let ticks_ok = IntCounter::new("ticks_ok_total", "successful ticks").unwrap();
        let ticks_failed = IntCounter::new("ticks_failed_total", "failed ticks").unwrap();
        let decisions = IntCounterVec::new(
            Opts::new("decisions_total", "decisions by action"),
            &["action"],
        )
        .unwrap();
        let last_successful_tick = IntGauge::new(
            "last_successful_tick_timestamp_seconds",
            "unix time of the last successful tick",
        )
        .unwrap();
        // Registration failures (duplicate registration in tests) keep the
        // local handles usable.
        let _ = registry.register(Box::new(ticks_ok.clone()));
        let _ = registry.register(Box::new(ticks_failed.clone()));
        let _ = registry.register(Box::new(decisions.clone()));
        let _ = registry.register(Box::new(last_successful_tick.clone()));
        Self {
            ticks_ok,
            ticks_failed,
            decisions,
            last_successful_tick,
        }
    }
}

pub struct RunLoop {
    scanner: Scanner,
    executor: Executor,
    store: StateStore,
    price_oracle: Arc<dyn PriceOracle>,
    announcer: Announcer,
    pools: Arc<Vec<Pool>>,
    adapters: Arc<adapter::Registry>,
    policy: Policy,
    deposit_token: Token,
    trade_amount: U256,
    status: Arc<RwLock<RuntimeStatus>>,
    operator: OperatorHandle,
    in_flight: AtomicBool,
    metrics: Metrics,
}

impl RunLoop {
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        scanner: Scanner,
        executor: Executor,
        store: StateStore,
        price_oracle: Arc<dyn PriceOracle>,
        announcer: Announcer,
        pools: Arc<Vec<Pool>>,
        adapters: Arc<adapter::Registry>,
        policy: Policy,
        deposit_token: Token,
        trade_amount: U256,
        status: Arc<RwLock<RuntimeStatus>>,
        operator: OperatorHandle,
    ) -> Self {
        Self {
            scanner,
            executor,
            store,
            price_oracle,
            announcer,
            pools,
            adapters,
            policy,
            deposit_token,
            trade_amount,
            status,
            operator,
            in_flight: AtomicBool::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Ticks once immediately, then per interval until shutdown. With
    /// `run_once` the first tick is the only one.
    pub async fn run(&self, run_once: bool, interval: Duration) {
        self.tick_guarded().await;
        if run_once {
            tracing::info!("run-once mode, exiting after first tick");
            return;
        }
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The immediate tick above replaces the interval's first fire.
        timer.reset();
        loop {
            tokio::select! {
                _ = timer.tick() => self.tick_guarded().await,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received");
                    return;
                }
            }
        }
    }

    /// Single-flight wrapper with status bookkeeping. A tick is successful
    /// iff it completes without error.
    pub async fn tick_guarded(&self) {
        if self.operator.paused() {
            tracing::info!("agent is paused, skipping tick");
            return;
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::warn!("previous tick still in flight, skipping");
            return;
        }

        let now_ts = chrono::Utc::now().timestamp();
        let tick_number = {
            let mut status = self.status.write().unwrap();
            status.in_flight = true;
            status.total_ticks += 1;
            status.last_tick_started_at = Some(now_ts);
            status.total_ticks
        };

        let result = self
            .tick(now_ts)
            .instrument(tracing::info_span!("tick", n = tick_number))
            .await;

        let finished_ts = chrono::Utc::now().timestamp();
        let mut status = self.status.write().unwrap();
        status.in_flight = false;
        status.last_tick_finished_at = Some(finished_ts);
        match result {
            Ok(()) => {
                status.successful_ticks += 1;
                status.last_successful_tick_at = Some(finished_ts);
                self.metrics.ticks_ok.inc();
                self.metrics.last_successful_tick.set(finished_ts);
            }
            Err(err) => {
                status.failed_ticks += 1;
                status.last_error_at = Some(finished_ts);
                status.last_error_message = Some(format!("{err:#}"));
                self.metrics.ticks_failed.inc();
                tracing::error!(?err, "tick failed");
            }
        }
        drop(status);
        self.in_flight.store(false, Ordering::SeqCst);
    }

    async fn tick(&self, now_ts: i64) -> anyhow::Result<()> {
        let prior = self.store.read().await?;

        let snapshots = self.scanner.scan(now_ts).await?;
        self.store.append_snapshots(snapshots.clone()).await?;

        let stable_prices = self
            .price_oracle
            .stable_prices_usd()
            .await
            .map_err(|err| anyhow::anyhow!(err))?;

        let decision = match self.operator.consume(now_ts) {
            Some(action) => {
                tracing::info!(?action, "applying operator command");
                self.operator_decision(action, &prior, &snapshots, now_ts)
            }
            None => decide(
                &DecisionInput {
                    now_ts,
                    position: &prior.position,
                    snapshots: &snapshots,
                    previous_snapshots: &prior.snapshots,
                    stable_prices: &stable_prices,
                    deployable_entry_pool_ids: None,
                    pools: &self.pools,
                    deposit_token: self.deposit_token.address,
                    trade_amount: self.trade_amount,
                    policy: &self.policy,
                },
                &AdapterCostModel::new(self.adapters.clone()),
            ),
        };
        tracing::info!(
            action = ?decision.action,
            code = decision.reason_code.code(),
            reason = %decision.reason,
            "decided"
        );
        self.store.append_decision(decision.clone()).await?;
        self.metrics
            .decisions
            .with_label_values(&[action_label(decision.action)])
            .inc();

        if !decision.action.actionable() {
            return Ok(());
        }

        match self
            .executor
            .execute(&decision, &prior.position, &prior.decisions, now_ts)
            .await
        {
            Ok(Some(outcome)) => {
                self.store.set_position(outcome.new_position.clone()).await?;
                if let Some(tweet) = self
                    .announcer
                    .announce(&decision, outcome.tx_hash, now_ts)
                    .await
                {
                    self.store.append_tweet(tweet).await?;
                }
                tracing::info!(
                    tx = %outcome.tx_hash,
                    pool = ?outcome.new_position.pool_id,
                    "executed"
                );
            }
            Ok(None) => {}
            Err(err) if err.is_policy_block() => {
                tracing::warn!(%err, "execution blocked by policy");
            }
            Err(err) => {
                tracing::error!(%err, code = err.code(), "execution failed");
            }
        }
        Ok(())
    }

    /// Maps an operator command onto a decision. Commands go through the
    /// same executor path as autonomous decisions, so the training wheels
    /// still apply to operator rotations.
    fn operator_decision(
        &self,
        action: OperatorAction,
        prior: &StateDocument,
        snapshots: &[crate::domain::PoolSnapshot],
        now_ts: i64,
    ) -> Decision {
        match action {
            OperatorAction::Exit => {
                if prior.position.deployed() {
                    Decision {
                        timestamp: now_ts,
                        action: Action::ExitToPark,
                        reason_code: ReasonCode::OperatorRequest,
                        reason: "operator requested exit to park".to_string(),
                        chosen_pool_id: None,
                        from_pool_id: prior.position.pool_id.clone(),
                        emergency: false,
                        old_net_apy_bps: prior.position.last_net_apy_bps,
                        new_net_apy_bps: 0,
                        estimated_payback_hours: None,
                    }
                } else {
                    self.operator_hold(now_ts, "operator exit requested but nothing is deployed")
                }
            }
            OperatorAction::Rotate { pool_id } => {
                let eligible = self
                    .pools
                    .iter()
                    .find(|pool| pool.id == pool_id)
                    .is_some_and(|pool| pool.selectable(self.deposit_token.address));
                let snapshot = snapshots.iter().find(|snapshot| snapshot.pool_id == pool_id);
                let (Some(snapshot), true) = (snapshot, eligible) else {
                    return self.operator_hold(now_ts, "operator rotation target is not eligible");
                };
                if prior.position.pool_id.as_deref() == Some(pool_id.as_str()) {
                    return self.operator_hold(now_ts, "already deployed in the requested pool");
                }
                if prior.position.deployed() {
                    Decision {
                        timestamp: now_ts,
                        action: Action::Rotate,
                        reason_code: ReasonCode::OperatorRequest,
                        reason: format!("operator requested rotation into {pool_id}"),
                        chosen_pool_id: Some(pool_id),
                        from_pool_id: prior.position.pool_id.clone(),
                        emergency: false,
                        old_net_apy_bps: prior.position.last_net_apy_bps,
                        new_net_apy_bps: snapshot.net_apy_bps,
                        estimated_payback_hours: None,
                    }
                } else {
                    Decision {
                        timestamp: now_ts,
                        action: Action::Enter,
                        reason_code: ReasonCode::OperatorRequest,
                        reason: format!("operator requested entry into {pool_id}"),
                        chosen_pool_id: Some(pool_id),
                        from_pool_id: None,
                        emergency: false,
                        old_net_apy_bps: 0,
                        new_net_apy_bps: snapshot.net_apy_bps,
                        estimated_payback_hours: None,
                    }
                }
            }
        }
    }

    fn operator_hold(&self, now_ts: i64, reason: &str) -> Decision {
        Decision {
            timestamp: now_ts,
            action: Action::Hold,
            reason_code: ReasonCode::OperatorRequest,
            reason: reason.to_string(),
            chosen_pool_id: None,
            from_pool_id: None,
            emergency: false,
            old_net_apy_bps: 0,
            new_net_apy_bps: 0,
            estimated_payback_hours: None,
        }
    }
}

fn action_label(action: Action) -> &'static str {
    match action {
        Action::Hold => "hold",
        Action::Enter => "enter",
        Action::Rotate => "rotate",
        Action::ExitToPark => "exit_to_park",
    }
}

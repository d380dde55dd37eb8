//! Turns a decision into at most one vault transaction, guarded by the
//! training wheels and the simulate-then-send protocol, and derives the
//! resulting position.

use {
    crate::{
        domain::{Action, Decision, Policy, Pool, Position, Token},
        infra::{
            adapter::{self, EnterIntent, ExitIntent},
            vault::{self, Submitted, VaultApi, VaultCall},
        },
    },
    alloy::primitives::{B256, U256, keccak256},
    std::sync::Arc,
};

const DAY_SECONDS: i64 = 86_400;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("CONFIG_ERROR: {0}")]
    Config(String),
    #[error("POLICY_BLOCKED: {0}")]
    PolicyBlocked(String),
    #[error("SIMULATION_FAILED: {0}")]
    SimulationFailed(String),
    #[error("SEND_FAILED: {0}")]
    SendFailed(String),
    #[error("ADAPTER_UNAVAILABLE: {0}")]
    Adapter(String),
    #[error("RPC read failed: {0}")]
    Read(String),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::PolicyBlocked(_) => "POLICY_BLOCKED",
            Self::SimulationFailed(_) => "SIMULATION_FAILED",
            Self::SendFailed(_) => "SEND_FAILED",
            Self::Adapter(_) => "ADAPTER_UNAVAILABLE",
            Self::Read(_) => "RPC_READ_FAILED",
        }
    }

    /// Policy blocks are expected operation, not faults.
    pub fn is_policy_block(&self) -> bool {
        matches!(self, Self::PolicyBlocked(_))
    }
}

impl From<vault::Error> for Error {
    fn from(err: vault::Error) -> Self {
        match err {
            vault::Error::Config(msg) => Self::Config(msg),
            vault::Error::SimulationFailed(msg) => Self::SimulationFailed(msg),
            vault::Error::SendFailed(msg) => Self::SendFailed(msg),
            vault::Error::Read(msg) => Self::Read(msg),
        }
    }
}

impl From<adapter::Error> for Error {
    fn from(err: adapter::Error) -> Self {
        match err {
            adapter::Error::Unavailable(msg) => Self::Adapter(msg),
        }
    }
}

/// A successfully executed (or dry-run synthesized) capital movement.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub tx_hash: B256,
    pub new_position: Position,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub dry_run: bool,
    pub live_mode_armed: bool,
    pub enter_only: bool,
    pub max_rotations_per_day: u32,
    pub cooldown_seconds: i64,
    /// Target amount per enter in token base units; zero means uncapped.
    pub default_trade_amount_raw: U256,
    pub deposit_token: Token,
}

pub struct Executor {
    vault: Arc<dyn VaultApi>,
    adapters: Arc<adapter::Registry>,
    pools: Arc<Vec<Pool>>,
    policy: Policy,
    settings: Settings,
}

impl Executor {
    pub fn new(
        vault: Arc<dyn VaultApi>,
        adapters: Arc<adapter::Registry>,
        pools: Arc<Vec<Pool>>,
        policy: Policy,
        settings: Settings,
    ) -> Self {
        Self {
            vault,
            adapters,
            pools,
            policy,
            settings,
        }
    }

    /// Executes the decision. `Ok(None)` for HOLD; state is never touched
    /// here, the caller persists the returned position.
    ///
    /// `recent_decisions` must be the decision log from *before* this
    /// decision was appended, otherwise the rotation budget would count the
    /// decision currently being executed.
    pub async fn execute(
        &self,
        decision: &Decision,
        position: &Position,
        recent_decisions: &[Decision],
        now_ts: i64,
    ) -> Result<Option<Outcome>, Error> {
        match decision.action {
            Action::Hold => Ok(None),
            Action::Enter => self.enter(decision, now_ts).await.map(Some),
            Action::Rotate => {
                if !decision.emergency {
                    self.check_training_wheels(recent_decisions, now_ts)?;
                }
                self.rotate(decision, position, now_ts).await.map(Some)
            }
            Action::ExitToPark => self.exit_to_park(position, now_ts).await.map(Some),
        }
    }

    fn check_training_wheels(
        &self,
        recent_decisions: &[Decision],
        now_ts: i64,
    ) -> Result<(), Error> {
        if self.settings.enter_only {
            return Err(Error::PolicyBlocked(
                "enter-only mode active, rotations disabled".to_string(),
            ));
        }
        let rotations_today = recent_decisions
            .iter()
            .filter(|decision| {
                decision.action == Action::Rotate
                    && now_ts - decision.timestamp <= DAY_SECONDS
            })
            .count();
        if rotations_today >= self.settings.max_rotations_per_day as usize {
            return Err(Error::PolicyBlocked(format!(
                "rotation budget exhausted: {rotations_today} in the last 24h \
                 (cap {})",
                self.settings.max_rotations_per_day
            )));
        }
        if let Some(last) = recent_decisions
            .iter()
            .rev()
            .find(|decision| decision.action == Action::Rotate)
        {
            let since = now_ts - last.timestamp;
            if since < self.settings.cooldown_seconds {
                return Err(Error::PolicyBlocked(format!(
                    "rotation cooldown active: {since}s of {}s",
                    self.settings.cooldown_seconds
                )));
            }
        }
        Ok(())
    }

    async fn enter(&self, decision: &Decision, now_ts: i64) -> Result<Outcome, Error> {
        let pool = self.pool(decision.chosen_pool_id.as_deref())?;
        let adapter = self.adapter(pool)?;
        let amount_in = self.deployable_amount().await?;
        let request = adapter
            .build_enter_request(EnterIntent {
                pool,
                amount_in,
                min_out: self.min_out(amount_in),
                deadline: self.deadline(now_ts),
                net_apy_bps: decision.new_net_apy_bps,
                intended_hold_seconds: self.policy.min_hold_seconds,
            })
            .await?;
        let min_out = request.min_out;
        let submitted = self.simulate_then_send(VaultCall::Enter(request), now_ts).await?;

        let entered_at = self.entered_at(&submitted, now_ts).await;
        let lp_balance = match submitted.block_number {
            Some(_) => self.vault.token_balance(pool.lp_token).await?,
            // Dry run: no chain state changed, estimate from the request.
            None => min_out,
        };
        Ok(Outcome {
            tx_hash: submitted.tx_hash,
            new_position: Position {
                pool_id: Some(pool.id.clone()),
                pair: Some(pool.pair.clone()),
                protocol: Some(pool.protocol.clone()),
                entered_at: Some(entered_at),
                lp_balance: lp_balance.to_string(),
                last_net_apy_bps: decision.new_net_apy_bps,
                parked_token: None,
            },
        })
    }

    async fn rotate(
        &self,
        decision: &Decision,
        position: &Position,
        now_ts: i64,
    ) -> Result<Outcome, Error> {
        let from = self.pool(decision.from_pool_id.as_deref())?;
        let to = self.pool(decision.chosen_pool_id.as_deref())?;
        let from_adapter = self.adapter(from)?;
        let to_adapter = self.adapter(to)?;

        let mut amount_in = position.lp_balance_raw();
        if amount_in.is_zero() {
            amount_in = self.settings.default_trade_amount_raw;
        }
        if amount_in.is_zero() {
            return Err(Error::PolicyBlocked(
                "no LP balance to rotate".to_string(),
            ));
        }

        let deadline = self.deadline(now_ts);
        let exit = from_adapter
            .build_exit_request(ExitIntent {
                pool: from,
                token_out: self.settings.deposit_token.address,
                amount_in,
                min_out: self.min_out(amount_in),
                deadline,
            })
            .await?;
        let enter = to_adapter
            .build_enter_request(EnterIntent {
                pool: to,
                amount_in,
                min_out: self.min_out(amount_in),
                deadline,
                net_apy_bps: decision.new_net_apy_bps,
                intended_hold_seconds: self.policy.min_hold_seconds,
            })
            .await?;
        let min_out = enter.min_out;
        let call = VaultCall::Rotate(vault::RotateRequest {
            exit,
            enter,
            old_net_apy_bps: decision.old_net_apy_bps,
            new_net_apy_bps: decision.new_net_apy_bps,
            reason_code: decision.reason_code.code(),
        });
        let submitted = self.simulate_then_send(call, now_ts).await?;

        let entered_at = self.entered_at(&submitted, now_ts).await;
        let lp_balance = match submitted.block_number {
            Some(_) => self.vault.token_balance(to.lp_token).await?,
            None => min_out,
        };
        Ok(Outcome {
            tx_hash: submitted.tx_hash,
            new_position: Position {
                pool_id: Some(to.id.clone()),
                pair: Some(to.pair.clone()),
                protocol: Some(to.protocol.clone()),
                entered_at: Some(entered_at),
                lp_balance: lp_balance.to_string(),
                last_net_apy_bps: decision.new_net_apy_bps,
                parked_token: None,
            },
        })
    }

    async fn exit_to_park(&self, position: &Position, now_ts: i64) -> Result<Outcome, Error> {
        let pool = self.pool(position.pool_id.as_deref())?;
        let adapter = self.adapter(pool)?;

        let lp_balance = position.lp_balance_raw();
        let cap_bps = self.vault.movement_cap_bps().await?;
        let amount_in = lp_balance.min(apply_bps(lp_balance, cap_bps));
        if amount_in.is_zero() {
            return Err(Error::PolicyBlocked(
                "no LP balance to exit".to_string(),
            ));
        }

        let request = adapter
            .build_exit_request(ExitIntent {
                pool,
                token_out: self.settings.deposit_token.address,
                amount_in,
                min_out: self.min_out(amount_in),
                deadline: self.deadline(now_ts),
            })
            .await?;
        let submitted = self.simulate_then_send(VaultCall::Exit(request), now_ts).await?;

        let residual = match submitted.block_number {
            Some(_) => self.vault.token_balance(pool.lp_token).await?,
            None => lp_balance - amount_in,
        };
        let new_position = if residual.is_zero() {
            Position::parked(&self.settings.deposit_token.symbol)
        } else {
            // Partial unwind: still deployed, with the remainder.
            Position {
                lp_balance: residual.to_string(),
                ..position.clone()
            }
        };
        Ok(Outcome {
            tx_hash: submitted.tx_hash,
            new_position,
        })
    }

    /// The three-mode submission protocol: dry-run synthesizes a hash,
    /// disarmed live mode simulates only, armed live mode simulates then
    /// broadcasts. A broadcast without a passing simulation is impossible
    /// by construction.
    async fn simulate_then_send(
        &self,
        call: VaultCall,
        now_ts: i64,
    ) -> Result<Submitted, Error> {
        if self.settings.dry_run {
            return Ok(Submitted {
                tx_hash: synthetic_tx_hash(now_ts),
                block_number: None,
            });
        }
        if !self.vault.can_broadcast() {
            return Err(Error::Config(
                "live execution requested but no executor key is configured".to_string(),
            ));
        }
        self.vault.simulate(&call).await?;
        if !self.settings.live_mode_armed {
            return Err(Error::PolicyBlocked(
                "broadcast blocked: live mode not armed".to_string(),
            ));
        }
        Ok(self.vault.submit(&call).await?)
    }

    /// ENTER sizing: vault balance, capped by the movement cap and by the
    /// configured trade amount.
    async fn deployable_amount(&self) -> Result<U256, Error> {
        let balance = self.vault.deposit_token_balance().await?;
        let cap_bps = self.vault.movement_cap_bps().await?;
        let mut amount = balance.min(apply_bps(balance, cap_bps));
        if !self.settings.default_trade_amount_raw.is_zero() {
            amount = amount.min(self.settings.default_trade_amount_raw);
        }
        if amount.is_zero() {
            return Err(Error::PolicyBlocked("no deployable balance".to_string()));
        }
        Ok(amount)
    }

    fn min_out(&self, amount_in: U256) -> U256 {
        let tolerated = apply_bps(
            amount_in,
            (10_000i64 - self.policy.max_price_impact_bps).max(0) as u64,
        );
        tolerated.max(U256::from(1))
    }

    fn deadline(&self, now_ts: i64) -> u64 {
        (now_ts + self.policy.tx_deadline_seconds).max(0) as u64
    }

    async fn entered_at(&self, submitted: &Submitted, now_ts: i64) -> i64 {
        if let Some(block_number) = submitted.block_number {
            match self.vault.block_timestamp(block_number).await {
                Ok(timestamp) => return i64::try_from(timestamp).unwrap_or(now_ts),
                Err(err) => {
                    tracing::debug!(?err, block_number, "block timestamp unavailable");
                }
            }
        }
        now_ts
    }

    fn pool(&self, id: Option<&str>) -> Result<&Pool, Error> {
        let id = id.ok_or_else(|| {
            Error::Config("decision does not reference a pool".to_string())
        })?;
        self.pools
            .iter()
            .find(|pool| pool.id == id)
            .ok_or_else(|| Error::Config(format!("unknown pool {id}")))
    }

    fn adapter(&self, pool: &Pool) -> Result<Arc<dyn adapter::Adapter>, Error> {
        self.adapters.get(&pool.adapter_id).ok_or_else(|| {
            Error::Adapter(format!(
                "no adapter {} for pool {}",
                pool.adapter_id, pool.id
            ))
        })
    }
}

fn apply_bps(amount: U256, bps: u64) -> U256 {
    amount * U256::from(bps.min(10_000)) / U256::from(10_000)
}

fn synthetic_tx_hash(now_ts: i64) -> B256 {
    keccak256(format!("dry-run:{now_ts}").as_bytes())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            domain::{MockEconomics, PoolTier, ReasonCode},
            infra::vault::MockVaultApi,
        },
        alloy::primitives::Address,
    };

    const DEPOSIT_TOKEN: Address = Address::repeat_byte(0x11);

    fn pool(id: &str) -> Pool {
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
            token_in: DEPOSIT_TOKEN,
            base_apy_bps: 300,
            base_apy_source: Default::default(),
            reward_token_symbol: "CRV".to_string(),
            rotation_cost_bps: 10,
            mock: MockEconomics::default(),
        }
    }

    fn policy() -> Policy {
        Policy {
            min_hold_seconds: 86_400,
            rotation_delta_apy_bps: 200,
            max_payback_hours: 72.0,
            depeg_threshold_bps: 100,
            max_price_impact_bps: 30,
            apr_cliff_drop_bps: 5_000,
            tx_deadline_seconds: 1_800,
        }
    }

    fn settings() -> Settings {
        Settings {
            dry_run: true,
            live_mode_armed: false,
            enter_only: false,
            max_rotations_per_day: 1,
            cooldown_seconds: 21_600,
            default_trade_amount_raw: U256::ZERO,
            deposit_token: Token {
                symbol: "USDC".to_string(),
                address: DEPOSIT_TOKEN,
                decimals: 6,
            },
        }
    }

    fn executor(vault: MockVaultApi, settings: Settings) -> Executor {
        Executor::new(
            Arc::new(vault),
            Arc::new(adapter::Registry::standard(None, 6)),
            Arc::new(vec![pool("a"), pool("b")]),
            policy(),
            settings,
        )
    }

    fn decision(action: Action, chosen: Option<&str>, from: Option<&str>) -> Decision {
        Decision {
            timestamp: 1_000_000,
            action,
            reason_code: match action {
                Action::Enter => ReasonCode::InitialDeploy,
                Action::Rotate => ReasonCode::ApyUpgrade,
                _ => ReasonCode::NoEligiblePool,
            },
            reason: "test".to_string(),
            chosen_pool_id: chosen.map(str::to_string),
            from_pool_id: from.map(str::to_string),
            emergency: false,
            old_net_apy_bps: 400,
            new_net_apy_bps: 700,
            estimated_payback_hours: None,
        }
    }

    fn deployed(pool_id: &str, lp_balance: &str) -> Position {
        Position {
            pool_id: Some(pool_id.to_string()),
            pair: Some("USDC/USDT".to_string()),
            protocol: Some("mock".to_string()),
            entered_at: Some(900_000),
            lp_balance: lp_balance.to_string(),
            last_net_apy_bps: 400,
            parked_token: None,
        }
    }

    fn past_rotation(timestamp: i64) -> Decision {
        Decision {
            timestamp,
            ..decision(Action::Rotate, Some("a"), Some("b"))
        }
    }

    #[tokio::test]
    async fn hold_is_a_no_op() {
        let result = executor(MockVaultApi::new(), settings())
            .execute(
                &decision(Action::Hold, None, None),
                &Position::default(),
                &[],
                1_000_000,
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn dry_run_enter_derives_position() {
        let mut vault = MockVaultApi::new();
        vault
            .expect_deposit_token_balance()
            .returning(|| Ok(U256::from(1_000_000u64)));
        vault.expect_movement_cap_bps().returning(|| Ok(10_000));
        // No simulate/submit expectations: dry run must not touch the chain.
        let outcome = executor(vault, settings())
            .execute(
                &decision(Action::Enter, Some("a"), None),
                &Position::default(),
                &[],
                1_000_000,
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.new_position.pool_id.as_deref(), Some("a"));
        assert_eq!(outcome.new_position.entered_at, Some(1_000_000));
        assert_eq!(outcome.new_position.last_net_apy_bps, 700);
        assert!(outcome.new_position.parked_token.is_none());
        // minOut = 1000000 * (10000 - 30) / 10000
        assert_eq!(outcome.new_position.lp_balance, "997000");
    }

    #[tokio::test]
    async fn movement_cap_and_trade_amount_bound_the_entry() {
        let mut vault = MockVaultApi::new();
        vault
            .expect_deposit_token_balance()
            .returning(|| Ok(U256::from(1_000_000u64)));
        vault.expect_movement_cap_bps().returning(|| Ok(5_000));
        let outcome = executor(
            vault,
            Settings {
                default_trade_amount_raw: U256::from(400_000u64),
                ..settings()
            },
        )
        .execute(
            &decision(Action::Enter, Some("a"), None),
            &Position::default(),
            &[],
            1_000_000,
        )
        .await
        .unwrap()
        .unwrap();
        // min(1000000, 500000 cap, 400000 configured) = 400000
        assert_eq!(outcome.new_position.lp_balance, "398800");
    }

    #[tokio::test]
    async fn empty_vault_blocks_entry() {
        let mut vault = MockVaultApi::new();
        vault
            .expect_deposit_token_balance()
            .returning(|| Ok(U256::ZERO));
        vault.expect_movement_cap_bps().returning(|| Ok(10_000));
        let err = executor(vault, settings())
            .execute(
                &decision(Action::Enter, Some("a"), None),
                &Position::default(),
                &[],
                1_000_000,
            )
            .await
            .unwrap_err();
        assert!(err.is_policy_block());
    }

    #[tokio::test]
    async fn enter_only_mode_blocks_rotation() {
        let err = executor(
            MockVaultApi::new(),
            Settings {
                enter_only: true,
                ..settings()
            },
        )
        .execute(
            &decision(Action::Rotate, Some("b"), Some("a")),
            &deployed("a", "1000000"),
            &[],
            1_000_000,
        )
        .await
        .unwrap_err();
        assert!(err.is_policy_block());
        assert!(err.to_string().contains("enter-only"));
    }

    #[tokio::test]
    async fn cooldown_blocks_rotation() {
        // A rotation went through 2h ago; cooldown is 6h.
        let now_ts = 1_000_000;
        let err = executor(
            MockVaultApi::new(),
            Settings {
                max_rotations_per_day: 2,
                ..settings()
            },
        )
        .execute(
            &decision(Action::Rotate, Some("b"), Some("a")),
            &deployed("a", "1000000"),
            &[past_rotation(now_ts - 2 * 3_600)],
            now_ts,
        )
        .await
        .unwrap_err();
        assert!(err.is_policy_block());
        assert!(err.to_string().contains("cooldown"));
    }

    #[tokio::test]
    async fn daily_rotation_budget_blocks() {
        let now_ts = 1_000_000;
        let err = executor(MockVaultApi::new(), settings())
            .execute(
                &decision(Action::Rotate, Some("b"), Some("a")),
                &deployed("a", "1000000"),
                &[past_rotation(now_ts - 23 * 3_600)],
                now_ts,
            )
            .await
            .unwrap_err();
        assert!(err.is_policy_block());
        assert!(err.to_string().contains("budget"));
    }

    #[tokio::test]
    async fn rotation_budget_ignores_old_rotations() {
        let now_ts = 1_000_000;
        let outcome = executor(MockVaultApi::new(), settings())
            .execute(
                &decision(Action::Rotate, Some("b"), Some("a")),
                &deployed("a", "1000000"),
                // Outside both the 24h window and the 6h cooldown.
                &[past_rotation(now_ts - 25 * 3_600)],
                now_ts,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.new_position.pool_id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn emergency_exit_bypasses_training_wheels() {
        let mut vault = MockVaultApi::new();
        vault.expect_movement_cap_bps().returning(|| Ok(10_000));
        let exit = Decision {
            emergency: true,
            ..decision(Action::ExitToPark, None, Some("a"))
        };
        let outcome = executor(
            vault,
            Settings {
                enter_only: true,
                ..settings()
            },
        )
        .execute(&exit, &deployed("a", "1000000"), &[], 1_000_000)
        .await
        .unwrap()
        .unwrap();
        assert_eq!(outcome.new_position.parked_token.as_deref(), Some("USDC"));
        assert!(outcome.new_position.pool_id.is_none());
    }

    #[tokio::test]
    async fn capped_exit_leaves_residual_position() {
        let mut vault = MockVaultApi::new();
        vault.expect_movement_cap_bps().returning(|| Ok(6_000));
        let exit = Decision {
            emergency: true,
            ..decision(Action::ExitToPark, None, Some("a"))
        };
        let outcome = executor(vault, settings())
            .execute(&exit, &deployed("a", "1000000"), &[], 1_000_000)
            .await
            .unwrap()
            .unwrap();
        // 60% unwound, 40% stays deployed.
        assert_eq!(outcome.new_position.pool_id.as_deref(), Some("a"));
        assert_eq!(outcome.new_position.lp_balance, "400000");
        assert!(outcome.new_position.parked_token.is_none());
    }

    #[tokio::test]
    async fn live_disarmed_simulates_but_never_sends() {
        let mut vault = MockVaultApi::new();
        vault
            .expect_deposit_token_balance()
            .returning(|| Ok(U256::from(1_000_000u64)));
        vault.expect_movement_cap_bps().returning(|| Ok(10_000));
        vault.expect_can_broadcast().return_const(true);
        vault.expect_simulate().times(1).returning(|_| Ok(()));
        // expect_submit is intentionally absent.
        let err = executor(
            vault,
            Settings {
                dry_run: false,
                live_mode_armed: false,
                ..settings()
            },
        )
        .execute(
            &decision(Action::Enter, Some("a"), None),
            &Position::default(),
            &[],
            1_000_000,
        )
        .await
        .unwrap_err();
        assert!(err.is_policy_block());
        assert!(err.to_string().contains("not armed"));
    }

    #[tokio::test]
    async fn live_without_key_is_a_config_error() {
        let mut vault = MockVaultApi::new();
        vault
            .expect_deposit_token_balance()
            .returning(|| Ok(U256::from(1_000_000u64)));
        vault.expect_movement_cap_bps().returning(|| Ok(10_000));
        vault.expect_can_broadcast().return_const(false);
        let err = executor(
            vault,
            Settings {
                dry_run: false,
                ..settings()
            },
        )
        .execute(
            &decision(Action::Enter, Some("a"), None),
            &Position::default(),
            &[],
            1_000_000,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn failed_simulation_is_surfaced() {
        let mut vault = MockVaultApi::new();
        vault
            .expect_deposit_token_balance()
            .returning(|| Ok(U256::from(1_000_000u64)));
        vault.expect_movement_cap_bps().returning(|| Ok(10_000));
        vault.expect_can_broadcast().return_const(true);
        vault.expect_simulate().returning(|_| {
            Err(vault::Error::SimulationFailed("vault revert".to_string()))
        });
        let err = executor(
            vault,
            Settings {
                dry_run: false,
                live_mode_armed: true,
                ..settings()
            },
        )
        .execute(
            &decision(Action::Enter, Some("a"), None),
            &Position::default(),
            &[],
            1_000_000,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::SimulationFailed(_)));
    }

    #[tokio::test]
    async fn armed_mode_simulates_then_sends_and_uses_block_timestamp() {
        let mut vault = MockVaultApi::new();
        vault
            .expect_deposit_token_balance()
            .returning(|| Ok(U256::from(1_000_000u64)));
        vault.expect_movement_cap_bps().returning(|| Ok(10_000));
        vault.expect_can_broadcast().return_const(true);
        vault.expect_simulate().times(1).returning(|_| Ok(()));
        vault.expect_submit().times(1).returning(|_| {
            Ok(Submitted {
                tx_hash: B256::repeat_byte(0xab),
                block_number: Some(123),
            })
        });
        vault
            .expect_block_timestamp()
            .with(mockall::predicate::eq(123u64))
            .returning(|_| Ok(1_000_123));
        vault
            .expect_token_balance()
            .returning(|_| Ok(U256::from(998_765u64)));

        let outcome = executor(
            vault,
            Settings {
                dry_run: false,
                live_mode_armed: true,
                ..settings()
            },
        )
        .execute(
            &decision(Action::Enter, Some("a"), None),
            &Position::default(),
            &[],
            1_000_000,
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(outcome.tx_hash, B256::repeat_byte(0xab));
        assert_eq!(outcome.new_position.entered_at, Some(1_000_123));
        assert_eq!(outcome.new_position.lp_balance, "998765");
    }

    #[tokio::test]
    async fn dry_run_hashes_are_timestamp_derived() {
        assert_eq!(synthetic_tx_hash(42), synthetic_tx_hash(42));
        assert_ne!(synthetic_tx_hash(42), synthetic_tx_hash(43));
    }
}

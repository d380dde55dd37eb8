//! The vault RPC boundary. Everything the agent does on-chain goes through
//! the [`VaultApi`] trait so the executor can be tested against a mock.

use {
    alloy::{
        primitives::{Address, B256, Bytes, U256},
        providers::{DynProvider, Provider},
    },
    contracts::{IERC20, ITreasuryVault},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("CONFIG_ERROR: {0}")]
    Config(String),
    #[error("SIMULATION_FAILED: {0}")]
    SimulationFailed(String),
    #[error("SEND_FAILED: {0}")]
    SendFailed(String),
    #[error("vault read failed: {0}")]
    Read(String),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::SimulationFailed(_) => "SIMULATION_FAILED",
            Self::SendFailed(_) => "SEND_FAILED",
            Self::Read(_) => "RPC_READ_FAILED",
        }
    }
}

/// Instruction for the vault to enter a pool. Carries the APY context so the
/// vault can emit it with its events.
#[derive(Debug, Clone, PartialEq)]
pub struct EnterRequest {
    pub target: Address,
    pub pool: Address,
    pub token_in: Address,
    pub lp_token: Address,
    pub amount_in: U256,
    pub min_out: U256,
    /// Unix seconds after which the transaction must revert.
    pub deadline: u64,
    pub data: Bytes,
    pub pair: String,
    pub protocol: String,
    pub net_apy_bps: i64,
    pub intended_hold_seconds: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitRequest {
    pub target: Address,
    pub pool: Address,
    pub lp_token: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub min_out: U256,
    pub deadline: u64,
    pub data: Bytes,
    pub pair: String,
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RotateRequest {
    pub exit: ExitRequest,
    pub enter: EnterRequest,
    pub old_net_apy_bps: i64,
    pub new_net_apy_bps: i64,
    pub reason_code: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VaultCall {
    Enter(EnterRequest),
    Exit(ExitRequest),
    Rotate(RotateRequest),
}

/// A broadcast transaction that has been mined.
#[derive(Debug, Clone, PartialEq)]
pub struct Submitted {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VaultApi: Send + Sync {
    /// Dry-executes the call against the latest state. A revert is
    /// `Error::SimulationFailed`.
    async fn simulate(&self, call: &VaultCall) -> Result<(), Error>;

    /// Broadcasts the call and waits for its receipt. Callers must have
    /// simulated first; this method does not re-check.
    async fn submit(&self, call: &VaultCall) -> Result<Submitted, Error>;

    /// Balance of the deposit token held by the vault.
    async fn deposit_token_balance(&self) -> Result<U256, Error>;

    /// Fraction of the balance the vault allows to move per action.
    async fn movement_cap_bps(&self) -> Result<u64, Error>;

    /// Vault's balance of an arbitrary (LP) token.
    async fn token_balance(&self, token: Address) -> Result<U256, Error>;

    /// `None` when the vault predates the method, which is treated as the
    /// legacy park-then-enter flow.
    async fn supports_anytime_liquidity(&self) -> Result<Option<bool>, Error>;

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, Error>;

    /// Whether a broadcast key is configured.
    fn can_broadcast(&self) -> bool;
}

/// Production implementation over an alloy provider.
pub struct OnchainVault {
    provider: DynProvider,
    vault: Address,
    deposit_token: Address,
    has_signer: bool,
}

impl OnchainVault {
    pub fn new(
        provider: DynProvider,
        vault: Address,
        deposit_token: Address,
        has_signer: bool,
    ) -> Self {
        Self {
            provider,
            vault,
            deposit_token,
            has_signer,
        }
    }

    fn instance(&self) -> ITreasuryVault::ITreasuryVaultInstance<DynProvider> {
        ITreasuryVault::new(self.vault, self.provider.clone())
    }
}

fn enter_params(request: &EnterRequest) -> ITreasuryVault::EnterParams {
    ITreasuryVault::EnterParams {
        target: request.target,
        pool: request.pool,
        tokenIn: request.token_in,
        lpToken: request.lp_token,
        amountIn: request.amount_in,
        minOut: request.min_out,
        deadline: U256::from(request.deadline),
        data: request.data.clone(),
        netApyBps: U256::from(request.net_apy_bps.max(0) as u64),
        intendedHoldSeconds: U256::from(request.intended_hold_seconds.max(0) as u64),
    }
}

fn exit_params(request: &ExitRequest) -> ITreasuryVault::ExitParams {
    ITreasuryVault::ExitParams {
        target: request.target,
        pool: request.pool,
        lpToken: request.lp_token,
        tokenOut: request.token_out,
        amountIn: request.amount_in,
        minOut: request.min_out,
        deadline: U256::from(request.deadline),
        data: request.data.clone(),
    }
}

#[async_trait::async_trait]
impl VaultApi for OnchainVault {
    async fn simulate(&self, call: &VaultCall) -> Result<(), Error> {
        let instance = self.instance();
        let result = match call {
            VaultCall::Enter(request) => instance
                .enterPool(enter_params(request))
                .call()
                .await
                .map(|_| ()),
            VaultCall::Exit(request) => instance
                .exitPool(exit_params(request))
                .call()
                .await
                .map(|_| ()),
            VaultCall::Rotate(request) => instance
                .rotate(
                    exit_params(&request.exit),
                    enter_params(&request.enter),
                    U256::from(request.old_net_apy_bps.max(0) as u64),
                    U256::from(request.new_net_apy_bps.max(0) as u64),
                    request.reason_code,
                )
                .call()
                .await
                .map(|_| ()),
        };
        result.map_err(|err| Error::SimulationFailed(err.to_string()))
    }

    async fn submit(&self, call: &VaultCall) -> Result<Submitted, Error> {
        if !self.has_signer {
            return Err(Error::Config("no executor key configured".to_string()));
        }
        let instance = self.instance();
        let pending = match call {
            VaultCall::Enter(request) => instance.enterPool(enter_params(request)).send().await,
            VaultCall::Exit(request) => instance.exitPool(exit_params(request)).send().await,
            VaultCall::Rotate(request) => {
                instance
                    .rotate(
                        exit_params(&request.exit),
                        enter_params(&request.enter),
                        U256::from(request.old_net_apy_bps.max(0) as u64),
                        U256::from(request.new_net_apy_bps.max(0) as u64),
                        request.reason_code,
                    )
                    .send()
                    .await
            }
        }
        .map_err(|err| Error::SendFailed(err.to_string()))?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|err| Error::SendFailed(format!("awaiting receipt: {err}")))?;
        if !receipt.status() {
            return Err(Error::SendFailed(format!(
                "transaction {} reverted on-chain",
                receipt.transaction_hash
            )));
        }
        Ok(Submitted {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
        })
    }

    async fn deposit_token_balance(&self) -> Result<U256, Error> {
        self.token_balance(self.deposit_token).await
    }

    async fn movement_cap_bps(&self) -> Result<u64, Error> {
        let cap = self
            .instance()
            .movementCapBps()
            .call()
            .await
            .map_err(|err| Error::Read(err.to_string()))?;
        Ok(cap.saturating_to::<u64>().min(10_000))
    }

    async fn token_balance(&self, token: Address) -> Result<U256, Error> {
        IERC20::new(token, self.provider.clone())
            .balanceOf(self.vault)
            .call()
            .await
            .map_err(|err| Error::Read(err.to_string()))
    }

    async fn supports_anytime_liquidity(&self) -> Result<Option<bool>, Error> {
        // Older vault deployments do not expose the method; a revert or
        // decode failure means "legacy".
        match self.instance().supportsAnytimeLiquidity().call().await {
            Ok(supported) => Ok(Some(supported)),
            Err(_) => Ok(None),
        }
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, Error> {
        let block = self
            .provider
            .get_block_by_number(block_number.into())
            .await
            .map_err(|err| Error::Read(err.to_string()))?
            .ok_or_else(|| Error::Read(format!("block {block_number} not found")))?;
        Ok(block.header.timestamp)
    }

    fn can_broadcast(&self) -> bool {
        self.has_signer
    }
}

//! Typed alloy bindings for the on-chain surfaces the agent talks to.
//!
//! The treasury vault is the only privileged contract; everything else is a
//! read-only view (ERC20 balances, ERC-4626 previews, Aave reserve data).

use alloy::sol;

pub use alloy::providers::DynProvider as Provider;

pub mod networks {
    pub const MAINNET: u64 = 1;
    pub const GNOSIS: u64 = 100;
    pub const SEPOLIA: u64 = 11155111;
    pub const ARBITRUM_ONE: u64 = 42161;
    pub const BASE: u64 = 8453;
}

sol! {
    /// The privileged vault the agent moves capital through. All capital
    /// stays inside the vault; the agent only instructs it.
    #[sol(rpc)]
    #[derive(Debug)]
    contract ITreasuryVault {
        struct EnterParams {
            address target;
            address pool;
            address tokenIn;
            address lpToken;
            uint256 amountIn;
            uint256 minOut;
            uint256 deadline;
            bytes data;
            uint256 netApyBps;
            uint256 intendedHoldSeconds;
        }

        struct ExitParams {
            address target;
            address pool;
            address lpToken;
            address tokenOut;
            uint256 amountIn;
            uint256 minOut;
            uint256 deadline;
            bytes data;
        }

        function enterPool(EnterParams params) external returns (uint256 lpReceived);
        function exitPool(ExitParams params) external returns (uint256 amountOut);
        function rotate(
            ExitParams exitParams,
            EnterParams enterParams,
            uint256 oldNetApyBps,
            uint256 newNetApyBps,
            uint8 reasonCode
        ) external returns (uint256 amountOut, uint256 lpReceived);

        function movementCapBps() external view returns (uint256);
        function hasOpenLpPosition() external view returns (bool);
        function supportsAnytimeLiquidity() external view returns (bool);
        function depositToken() external view returns (address);
    }

    #[sol(rpc)]
    #[derive(Debug)]
    contract IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function totalSupply() external view returns (uint256);
    }

    #[sol(rpc)]
    #[derive(Debug)]
    contract IERC4626 {
        function asset() external view returns (address);
        function totalAssets() external view returns (uint256);
        function previewDeposit(uint256 assets) external view returns (uint256 shares);
        function previewRedeem(uint256 shares) external view returns (uint256 assets);
        function convertToAssets(uint256 shares) external view returns (uint256 assets);
    }

    /// Aave v3 pool, trimmed to the reserve read the base-APY oracle needs.
    /// `currentLiquidityRate` is a ray (1e27) annualized liquidity rate.
    #[sol(rpc)]
    #[derive(Debug)]
    contract IAaveV3Pool {
        struct ReserveData {
            uint256 configuration;
            uint128 liquidityIndex;
            uint128 currentLiquidityRate;
            uint128 variableBorrowIndex;
            uint128 currentVariableBorrowRate;
            uint128 currentStableBorrowRate;
            uint40 lastUpdateTimestamp;
            uint16 id;
            address aTokenAddress;
            address stableDebtTokenAddress;
            address variableDebtTokenAddress;
            address interestRateStrategyAddress;
            uint128 accruedToTreasury;
            uint128 unbacked;
            uint128 isolationModeTotalDebt;
        }

        function getReserveData(address asset) external view returns (ReserveData data);
    }
}

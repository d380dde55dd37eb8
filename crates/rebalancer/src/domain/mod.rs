//! Pure domain types and logic. Nothing in this module performs IO; the
//! decision engine in particular is a deterministic function of its inputs.

pub mod decision;
pub mod guards;
pub mod policy;
pub mod pool;
pub mod position;
pub mod snapshot;

pub use {
    decision::{Action, CostModel, Decision, DecisionInput, ReasonCode, StaticCostModel, decide},
    policy::Policy,
    pool::{BaseApySource, MockEconomics, Pool, PoolTier, Token},
    position::Position,
    snapshot::PoolSnapshot,
};

/// Annualization basis for all APR math, in seconds.
pub const YEAR_SECONDS: i64 = 31_536_000;

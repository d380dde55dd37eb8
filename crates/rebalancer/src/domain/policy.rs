/// Rotation policy thresholds. Parsed once at startup and read-only
/// afterwards.
#[derive(Debug, Clone)]
pub struct Policy {
    /// A freshly entered position cannot be rotated out before this age.
    pub min_hold_seconds: i64,
    /// Minimum net-APY uplift (candidate minus current) to justify moving.
    pub rotation_delta_apy_bps: i64,
    /// Maximum time for the uplift to cover the rotation cost.
    pub max_payback_hours: f64,
    /// Absolute deviation from $1.00 at which a stable is considered
    /// depegged.
    pub depeg_threshold_bps: i64,
    /// Maximum tolerated price impact for any entry.
    pub max_price_impact_bps: i64,
    /// Incentive APR drop (relative, in bps of the previous value) that
    /// forces an emergency exit.
    pub apr_cliff_drop_bps: i64,
    /// On-chain transaction deadline, seconds from tick start.
    pub tx_deadline_seconds: i64,
}

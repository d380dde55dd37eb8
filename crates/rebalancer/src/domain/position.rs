use {
    alloy::primitives::U256,
    serde::{Deserialize, Serialize},
};

/// The vault's current allocation. Exactly one of three shapes holds at any
/// time: deployed (`pool_id` set), parked (`parked_token` set) or
/// uninitialized (everything `None`).
///
/// `lp_balance` is persisted as a decimal string so the durable state file
/// stays readable and independent of integer width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub pool_id: Option<String>,
    pub pair: Option<String>,
    pub protocol: Option<String>,
    /// Unix seconds of the block (or tick) that entered the pool.
    pub entered_at: Option<i64>,
    pub lp_balance: String,
    pub last_net_apy_bps: i64,
    pub parked_token: Option<String>,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            pool_id: None,
            pair: None,
            protocol: None,
            entered_at: None,
            lp_balance: "0".to_string(),
            last_net_apy_bps: 0,
            parked_token: None,
        }
    }
}

impl Position {
    pub fn deployed(&self) -> bool {
        self.pool_id.is_some()
    }

    /// The LP balance as a raw integer. An unparsable persisted value is
    /// treated as zero rather than poisoning every subsequent tick.
    pub fn lp_balance_raw(&self) -> U256 {
        U256::from_str_radix(self.lp_balance.trim(), 10).unwrap_or_default()
    }

    pub fn parked(token_symbol: &str) -> Self {
        Self {
            parked_token: Some(token_symbol.to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lp_balance_parses_decimal_strings() {
        let position = Position {
            lp_balance: "123456789000000000000".to_string(),
            ..Default::default()
        };
        assert_eq!(
            position.lp_balance_raw(),
            U256::from(123_456_789u64) * U256::from(10u64).pow(U256::from(12))
        );
    }

    #[test]
    fn garbage_lp_balance_is_zero() {
        let position = Position {
            lp_balance: "not a number".to_string(),
            ..Default::default()
        };
        assert_eq!(position.lp_balance_raw(), U256::ZERO);
    }
}

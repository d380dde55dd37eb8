//! Static chain configuration: the vault's deposit token and the pool
//! allow-list, loaded once at startup from a JSON file. Unknown keys and
//! inconsistent entries are startup errors, not warnings.

use {
    crate::domain::{Pool, Token},
    anyhow::Context,
    serde::Deserialize,
    std::{collections::HashSet, path::Path},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub deposit_token: Token,
    pub pools: Vec<Pool>,
}

impl ChainConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading chain config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing chain config {}", path.display()))?;
        Ok(config)
    }

    /// Cross-checks the allow-list: unique ids, resolvable adapters, and
    /// every selectable pool accepting the vault's deposit token.
    pub fn validate(&self, is_known_adapter: impl Fn(&str) -> bool) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for pool in &self.pools {
            anyhow::ensure!(seen.insert(&pool.id), "duplicate pool id {}", pool.id);
            anyhow::ensure!(
                is_known_adapter(&pool.adapter_id),
                "pool {} references unknown adapter {}",
                pool.id,
                pool.adapter_id
            );
            if pool.selectable(self.deposit_token.address) {
                anyhow::ensure!(
                    pool.token_in == self.deposit_token.address,
                    "pool {} does not accept the deposit token",
                    pool.id
                );
            }
        }
        Ok(())
    }
}

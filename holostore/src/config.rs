use crate::errors::{CacheError, Result};
use crate::models::ChainId;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 20;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_FAILED_CYCLES: u32 = 5;

pub const TEST_REGISTRY_CHAIN: &str = "ethereum";
pub const TEST_REGISTRY_RPC_URL: &str = "http://localhost:8545";

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChainEndpoint {
    pub chain: ChainId,
    pub rpc_url: String,
}

impl ChainEndpoint {
    /// Parses the `chain=url` form used on the command line.
    pub fn parse_pair(raw: &str) -> Result<Self> {
        let (chain, url) = raw.split_once('=').ok_or_else(|| {
            CacheError::Config(format!("expected <chain>=<rpc url>, got '{raw}'"))
        })?;
        let rpc_url = url.trim();
        if rpc_url.is_empty() {
            return Err(CacheError::Config(format!("empty RPC url for chain '{chain}'")));
        }
        Ok(Self {
            chain: ChainId::parse(chain)?,
            rpc_url: rpc_url.to_string(),
        })
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CacheConfig {
    pub db_path: PathBuf,
    #[serde(default)]
    pub chains: Vec<ChainEndpoint>,
    #[serde(default = "default_interval")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default)]
    pub use_test_registry: bool,
    #[serde(default = "default_max_failed_cycles")]
    pub max_failed_cycles: u32,
}

fn default_interval() -> u64 {
    DEFAULT_RECONCILE_INTERVAL_SECS
}

fn default_fetch_timeout() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_max_failed_cycles() -> u32 {
    DEFAULT_MAX_FAILED_CYCLES
}

impl CacheConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            chains: Vec::new(),
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            use_test_registry: false,
            max_failed_cycles: DEFAULT_MAX_FAILED_CYCLES,
        }
    }

    pub fn with_chain(mut self, endpoint: ChainEndpoint) -> Self {
        self.chains.retain(|existing| existing.chain != endpoint.chain);
        self.chains.push(endpoint);
        self
    }

    /// Swaps the production chains for the fixed local test registry.
    pub fn with_test_registry(mut self) -> Self {
        self.use_test_registry = true;
        self
    }

    /// The endpoints actually in effect, honouring `use_test_registry`.
    pub fn endpoints(&self) -> Result<Vec<ChainEndpoint>> {
        if self.use_test_registry {
            return Ok(vec![ChainEndpoint {
                chain: ChainId::parse(TEST_REGISTRY_CHAIN)?,
                rpc_url: TEST_REGISTRY_RPC_URL.to_string(),
            }]);
        }
        Ok(self.chains.clone())
    }

    pub fn chain_ids(&self) -> Result<Vec<ChainId>> {
        Ok(self.endpoints()?.into_iter().map(|e| e.chain).collect())
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoints()?.is_empty() {
            return Err(CacheError::Config(
                "no chains configured; pass at least one chain endpoint or use the test registry"
                    .to_string(),
            ));
        }
        if self.reconcile_interval_secs == 0 {
            return Err(CacheError::Config("reconcile interval must be positive".to_string()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(CacheError::Config("fetch timeout must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_overrides_configured_chains() {
        let config = CacheConfig::new("/tmp/cache.sqlite")
            .with_chain(ChainEndpoint::parse_pair("gnosis=https://rpc.example").unwrap())
            .with_test_registry();
        let endpoints = config.endpoints().unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].chain.as_str(), TEST_REGISTRY_CHAIN);
        assert_eq!(endpoints[0].rpc_url, TEST_REGISTRY_RPC_URL);
    }

    #[test]
    fn config_without_chains_is_rejected() {
        let config = CacheConfig::new("/tmp/cache.sqlite");
        assert!(matches!(config.validate(), Err(CacheError::Config(_))));
    }

    #[test]
    fn chain_pairs_parse() {
        let endpoint = ChainEndpoint::parse_pair("Mumbai=https://rpc.example/mumbai").unwrap();
        assert_eq!(endpoint.chain.as_str(), "mumbai");
        assert_eq!(endpoint.rpc_url, "https://rpc.example/mumbai");
        assert!(ChainEndpoint::parse_pair("mumbai").is_err());
        assert!(ChainEndpoint::parse_pair("mumbai=").is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: CacheConfig = serde_json::from_str(
            r#"{"db_path":"cache.sqlite","chains":[{"chain":"gnosis","rpc_url":"http://x"}]}"#,
        )
        .unwrap();
        assert_eq!(config.reconcile_interval(), Duration::from_secs(20));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_failed_cycles, DEFAULT_MAX_FAILED_CYCLES);
        assert!(config.validate().is_ok());
    }
}

use crate::errors::CaError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MAINNET_API_BASE_URL: &str = "https://aa-portkey.portkey.finance";
pub const TESTNET_API_BASE_URL: &str = "https://aa-portkey-test.portkey.finance";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    Mainnet,
    Testnet,
}

impl NetworkMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" | "main" | "prod" | "production" => Some(Self::Mainnet),
            "testnet" | "test" => Some(Self::Testnet),
            _ => None,
        }
    }
}

impl std::fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NetworkMode {
    type Err = crate::errors::CaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            crate::errors::CaError::InvalidArgument(format!(
                "network must be mainnet or testnet, got {s:?}"
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Backend REST API for mainnet chain descriptors.
    pub mainnet_base_url: String,
    /// Backend REST API for testnet chain descriptors.
    pub testnet_base_url: String,
    /// Per-request timeout for both the backend API and chain nodes.
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            mainnet_base_url: MAINNET_API_BASE_URL.into(),
            testnet_base_url: TESTNET_API_BASE_URL.into(),
            timeout_seconds: 20,
        }
    }
}

impl ApiConfig {
    pub fn base_url(&self, network: NetworkMode) -> &str {
        match network {
            NetworkMode::Mainnet => &self.mainnet_base_url,
            NetworkMode::Testnet => &self.testnet_base_url,
        }
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Transaction-result polling. Fixed count, fixed interval; there is no backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
    /// Pause between submission and the first poll.
    pub send_settle_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval_ms: 1500,
            send_settle_ms: 1000,
        }
    }
}

impl PollingConfig {
    /// Polling needs at least one attempt to ever observe a result.
    pub fn validate(&self) -> Result<(), CaError> {
        if self.max_attempts == 0 {
            return Err(CaError::InvalidArgument(
                "config polling.max_attempts must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A statically configured chain descriptor. When a network has any of these, the backend
/// lookup is skipped for that network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainOverride {
    pub chain_id: String,
    pub endpoint: String,
    pub ca_contract_address: String,
    pub token_contract_address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainOverrides {
    pub mainnet: Vec<ChainOverride>,
    pub testnet: Vec<ChainOverride>,
}

impl ChainOverrides {
    pub fn for_network(&self, network: NetworkMode) -> &[ChainOverride] {
        match network {
            NetworkMode::Mainnet => &self.mainnet,
            NetworkMode::Testnet => &self.testnet,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaConfig {
    pub network_mode: NetworkMode,
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub chains: ChainOverrides,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_poll_attempts_name_the_key() -> eyre::Result<()> {
        let cfg: CaConfig = toml::from_str("[polling]\nmax_attempts = 0\n")?;
        let err = cfg
            .polling
            .validate()
            .err()
            .ok_or_else(|| eyre::eyre!("max_attempts = 0 accepted"))?;
        assert!(err.to_string().contains("polling.max_attempts"), "{err}");
        assert!(PollingConfig::default().validate().is_ok());
        Ok(())
    }

    #[test]
    fn empty_toml_yields_defaults() -> eyre::Result<()> {
        let cfg: CaConfig = toml::from_str("")?;
        assert_eq!(cfg.network_mode, NetworkMode::Mainnet);
        assert_eq!(cfg.polling.max_attempts, 20);
        assert_eq!(cfg.polling.interval_ms, 1500);
        assert_eq!(cfg.polling.send_settle_ms, 1000);
        assert_eq!(cfg.api.base_url(NetworkMode::Testnet), TESTNET_API_BASE_URL);
        assert!(cfg.chains.for_network(NetworkMode::Mainnet).is_empty());
        Ok(())
    }

    #[test]
    fn chain_overrides_parse_from_array_tables() -> eyre::Result<()> {
        let cfg: CaConfig = toml::from_str(
            r#"
network_mode = "testnet"

[[chains.testnet]]
chain_id = "AELF"
endpoint = "http://127.0.0.1:8000"
ca_contract_address = "ca"
token_contract_address = "token"
"#,
        )?;
        assert_eq!(cfg.network_mode, NetworkMode::Testnet);
        let chains = cfg.chains.for_network(NetworkMode::Testnet);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains.first().map(|c| c.chain_id.as_str()), Some("AELF"));
        Ok(())
    }

    #[test]
    fn network_mode_parses_aliases() {
        assert_eq!(NetworkMode::parse("MAIN"), Some(NetworkMode::Mainnet));
        assert_eq!(NetworkMode::parse(" testnet "), Some(NetworkMode::Testnet));
        assert_eq!(NetworkMode::parse("devnet"), None);
    }
}

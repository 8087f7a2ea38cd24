//! Chain descriptors: where each chain's node lives and which CA and token contracts it runs.

use crate::{
    api::ApiClient,
    config::{ChainOverride, ChainOverrides, NetworkMode},
    errors::CaError,
};
use async_trait::async_trait;
use eyre::Context as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tracing::debug;

pub const CHAINS_INFO_PATH: &str = "/api/app/search/chainsinfoindex";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDescriptor {
    pub chain_id: String,
    pub endpoint: String,
    pub ca_contract_address: String,
    pub token_contract_address: String,
}

impl From<&ChainOverride> for ChainDescriptor {
    fn from(o: &ChainOverride) -> Self {
        Self {
            chain_id: o.chain_id.clone(),
            endpoint: o.endpoint.clone(),
            ca_contract_address: o.ca_contract_address.clone(),
            token_contract_address: o.token_contract_address.clone(),
        }
    }
}

#[async_trait]
pub trait ChainInfoSource: Send + Sync {
    async fn fetch(&self, network: NetworkMode) -> eyre::Result<Vec<ChainDescriptor>>;
}

/// Backend lookup, one [`ApiClient`] per network. A 404 from the index means the backend
/// knows no chains for that network and is reported as [`CaError::UnknownChain`].
#[derive(Debug, Clone)]
pub struct HttpChainInfoSource {
    mainnet: ApiClient,
    testnet: ApiClient,
}

impl HttpChainInfoSource {
    pub const fn new(mainnet: ApiClient, testnet: ApiClient) -> Self {
        Self { mainnet, testnet }
    }
}

#[async_trait]
impl ChainInfoSource for HttpChainInfoSource {
    async fn fetch(&self, network: NetworkMode) -> eyre::Result<Vec<ChainDescriptor>> {
        let api = match network {
            NetworkMode::Mainnet => &self.mainnet,
            NetworkMode::Testnet => &self.testnet,
        };
        let body = match api.get(CHAINS_INFO_PATH, &[]).await {
            Ok(body) => body,
            Err(e) if e.downcast_ref::<CaError>().is_some_and(CaError::is_not_found) => {
                return Err(CaError::UnknownChain(format!(
                    "no chain info published for {network} at {}",
                    api.base_url()
                ))
                .into());
            }
            Err(e) => return Err(e),
        };
        parse_chains_info(&body).with_context(|| format!("chains info from {}", api.base_url()))
    }
}

fn str_at<'a>(v: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(v, |cur, key| cur.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// `{items: [{chainId, endPoint, caContractAddress, defaultToken: {address}}]}`. Items missing
/// any of those are skipped.
pub fn parse_chains_info(body: &Value) -> eyre::Result<Vec<ChainDescriptor>> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| eyre::eyre!("chains info: missing items array"))?;
    Ok(items
        .iter()
        .filter_map(|item| {
            Some(ChainDescriptor {
                chain_id: str_at(item, &["chainId"])?.to_owned(),
                endpoint: str_at(item, &["endPoint"])?.to_owned(),
                ca_contract_address: str_at(item, &["caContractAddress"])?.to_owned(),
                token_contract_address: str_at(item, &["defaultToken", "address"])?.to_owned(),
            })
        })
        .collect())
}

/// Process-lifetime cache of descriptors per network. Configured overrides win outright: a
/// network with any override never hits the backend.
pub struct ChainInfoCache {
    source: Arc<dyn ChainInfoSource>,
    overrides: ChainOverrides,
    cached: Mutex<HashMap<NetworkMode, Arc<Vec<ChainDescriptor>>>>,
}

impl std::fmt::Debug for ChainInfoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainInfoCache")
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

impl ChainInfoCache {
    pub fn new(source: Arc<dyn ChainInfoSource>, overrides: ChainOverrides) -> Self {
        Self {
            source,
            overrides,
            cached: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_chain_info(
        &self,
        network: NetworkMode,
    ) -> eyre::Result<Arc<Vec<ChainDescriptor>>> {
        {
            let cached = self
                .cached
                .lock()
                .map_err(|e| eyre::eyre!("mutex poisoned: {e}"))?;
            if let Some(v) = cached.get(&network) {
                return Ok(Arc::clone(v));
            }
        }

        let statics = self.overrides.for_network(network);
        let fresh = if statics.is_empty() {
            debug!(network = %network, "fetching chain info");
            self.source.fetch(network).await?
        } else {
            statics.iter().map(ChainDescriptor::from).collect()
        };
        let fresh = Arc::new(fresh);

        let mut cached = self
            .cached
            .lock()
            .map_err(|e| eyre::eyre!("mutex poisoned: {e}"))?;
        Ok(Arc::clone(cached.entry(network).or_insert(fresh)))
    }

    pub async fn chain(&self, network: NetworkMode, chain_id: &str) -> eyre::Result<ChainDescriptor> {
        let all = self.get_chain_info(network).await?;
        all.iter()
            .find(|c| c.chain_id == chain_id.trim())
            .cloned()
            .ok_or_else(|| CaError::UnknownChain(format!("{chain_id} on {network}")).into())
    }

    /// Drop every cached network; the next lookup refetches.
    pub fn invalidate(&self) -> eyre::Result<()> {
        self.cached
            .lock()
            .map_err(|e| eyre::eyre!("mutex poisoned: {e}"))?
            .clear();
        Ok(())
    }
}

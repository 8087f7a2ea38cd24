//! The one surface every adapter drives. The CLI builds these parameter structs from flags,
//! the MCP server deserializes them from tool arguments.

use crate::{
    api::ApiClient,
    chain::{
        client::{ChainClient, ContractGateway},
        result::{SendOutcome, TransactionResult, TxReceipt},
    },
    chain_info::{ChainDescriptor, ChainInfoCache, ChainInfoSource, HttpChainInfoSource},
    config::{CaConfig, NetworkMode},
    errors::CaError,
    forward::{forward_call, ForwardCallRequest},
    guardian::{add_guardian, remove_guardian, GuardianChange},
    journal::{CrossChainRecord, JsonlJournal, TransferJournal},
    keystore::{
        resolve_signing_identity_from_env, KeystoreManager, SaveKeystoreRequest, Session,
        WalletStatus,
    },
    paths::CaPaths,
    store::ConfigStore,
    transfer::{
        cross_chain_transfer, recover_stuck_transfer, same_chain_transfer, CrossChainReceipt,
        CrossChainTransferParams, TokenAmount,
    },
    wallet::{CaHandle, WalletIdentity},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferParams {
    pub chain_id: String,
    pub to: String,
    #[serde(flatten)]
    pub token: TokenAmount,
    #[serde(default)]
    pub network: Option<NetworkMode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossChainParams {
    /// Source chain.
    pub chain_id: String,
    #[serde(flatten)]
    pub transfer: CrossChainTransferParams,
    #[serde(default)]
    pub network: Option<NetworkMode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverParams {
    pub chain_id: String,
    #[serde(flatten)]
    pub token: TokenAmount,
    #[serde(default)]
    pub network: Option<NetworkMode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianParams {
    pub chain_id: String,
    #[serde(alias = "guardianToAdd", alias = "guardianToRemove")]
    pub guardian: Value,
    #[serde(default)]
    pub guardians_approved: Vec<Value>,
    #[serde(default)]
    pub network: Option<NetworkMode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardCallParams {
    pub chain_id: String,
    pub contract_address: String,
    pub method_name: String,
    #[serde(default)]
    pub args: Value,
    /// Defaults to the signing wallet's CA hash.
    #[serde(default)]
    pub ca_hash: Option<String>,
    #[serde(default)]
    pub network: Option<NetworkMode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallViewParams {
    pub chain_id: String,
    pub contract_address: String,
    pub method_name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub network: Option<NetworkMode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceParams {
    pub chain_id: String,
    pub symbol: String,
    /// Defaults to the CA address of the current wallet.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub network: Option<NetworkMode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxResultParams {
    pub chain_id: String,
    pub transaction_id: String,
    #[serde(default)]
    pub network: Option<NetworkMode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWallet {
    pub address: String,
    pub public_key: String,
    pub private_key: String,
    pub mnemonic: Option<String>,
    pub derivation_path: &'static str,
}

pub struct Toolkit {
    paths: CaPaths,
    config: CaConfig,
    keystore: KeystoreManager,
    chains: ChainInfoCache,
    client: Arc<ChainClient>,
    gateway: Arc<dyn ContractGateway>,
    journal: Arc<dyn TransferJournal>,
}

impl std::fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolkit")
            .field("paths", &self.paths)
            .field("network_mode", &self.config.network_mode)
            .finish_non_exhaustive()
    }
}

fn opt_network(n: Option<NetworkMode>, default: NetworkMode) -> NetworkMode {
    n.unwrap_or(default)
}

impl Toolkit {
    /// Discover the home directory, load (or create) the config and wire the HTTP backends.
    pub fn open() -> eyre::Result<Self> {
        let paths = CaPaths::discover()?;
        paths.ensure_private_dirs()?;
        let config = ConfigStore::new(&paths).load_or_init_default()?;
        Self::from_config(paths, config)
    }

    pub fn from_config(paths: CaPaths, config: CaConfig) -> eyre::Result<Self> {
        config.polling.validate()?;
        let timeout = config.api.timeout();
        let client = Arc::new(ChainClient::new(config.polling.clone(), timeout)?);
        let source = HttpChainInfoSource::new(
            ApiClient::new(config.api.base_url(NetworkMode::Mainnet), timeout)?,
            ApiClient::new(config.api.base_url(NetworkMode::Testnet), timeout)?,
        );
        let journal = Arc::new(JsonlJournal::new(paths.journal_file()));
        let gateway: Arc<dyn ContractGateway> = Arc::clone(&client) as Arc<dyn ContractGateway>;
        Ok(Self::with_backends(
            paths,
            config,
            client,
            gateway,
            Arc::new(source),
            journal,
        ))
    }

    pub fn with_backends(
        paths: CaPaths,
        config: CaConfig,
        client: Arc<ChainClient>,
        gateway: Arc<dyn ContractGateway>,
        chain_source: Arc<dyn ChainInfoSource>,
        journal: Arc<dyn TransferJournal>,
    ) -> Self {
        let chains = ChainInfoCache::new(chain_source, config.chains.clone());
        Self {
            keystore: KeystoreManager::new(paths.clone()),
            paths,
            config,
            chains,
            client,
            gateway,
            journal,
        }
    }

    pub const fn config(&self) -> &CaConfig {
        &self.config
    }

    pub const fn default_network(&self) -> NetworkMode {
        self.config.network_mode
    }

    pub async fn chain(&self, network: NetworkMode, chain_id: &str) -> eyre::Result<ChainDescriptor> {
        if chain_id.trim().is_empty() {
            return Err(CaError::RequiredFieldMissing("chainId").into());
        }
        self.chains.chain(network, chain_id).await
    }

    /// The signer and the CA it acts for. An unlocked wallet must belong to `network`;
    /// without one, the environment key signs for the CA recorded in that network's keystore.
    pub fn signing_context(
        &self,
        network: NetworkMode,
        session: &Session,
    ) -> eyre::Result<(WalletIdentity, CaHandle)> {
        if let Some(w) = session.unlocked() {
            if w.network != network {
                return Err(CaError::InvalidArgument(format!(
                    "the unlocked wallet is for {}; unlock the {network} keystore first",
                    w.network
                ))
                .into());
            }
            return Ok((w.identity.clone(), w.ca.clone()));
        }
        let identity = resolve_signing_identity_from_env(session)?;
        let ca = self.keystore_ca(network, session)?;
        Ok((identity, ca))
    }

    fn keystore_ca(&self, network: NetworkMode, session: &Session) -> eyre::Result<CaHandle> {
        let status = self.keystore.status(network, session)?;
        match (status.ca_hash, status.ca_address) {
            (Some(ca_hash), Some(ca_address)) => Ok(CaHandle {
                ca_hash,
                ca_address,
                origin_chain_id: status.origin_chain_id.unwrap_or_default(),
            }),
            _ => Err(CaError::NoKeystoreFound(network.to_string()).into()),
        }
    }

    pub async fn transfer(&self, session: &Session, p: &TransferParams) -> eyre::Result<TxReceipt> {
        let network = opt_network(p.network, self.default_network());
        let (signer, ca) = self.signing_context(network, session)?;
        let chain = self.chain(network, &p.chain_id).await?;
        same_chain_transfer(self.gateway.as_ref(), &chain, &signer, &ca, &p.to, &p.token).await
    }

    pub async fn cross_chain_transfer(
        &self,
        session: &Session,
        p: &CrossChainParams,
    ) -> eyre::Result<CrossChainReceipt> {
        let network = opt_network(p.network, self.default_network());
        let (signer, ca) = self.signing_context(network, session)?;
        let source = self.chain(network, &p.chain_id).await?;
        cross_chain_transfer(
            self.gateway.as_ref(),
            self.journal.as_ref(),
            &source,
            &signer,
            &ca,
            &p.transfer,
        )
        .await
    }

    pub async fn recover_stuck_transfer(
        &self,
        session: &Session,
        p: &RecoverParams,
    ) -> eyre::Result<TxReceipt> {
        let network = opt_network(p.network, self.default_network());
        let (signer, ca) = self.signing_context(network, session)?;
        let chain = self.chain(network, &p.chain_id).await?;
        recover_stuck_transfer(self.gateway.as_ref(), &chain, &signer, &ca, &p.token).await
    }

    pub async fn change_guardian(
        &self,
        session: &Session,
        change: GuardianChange,
        p: &GuardianParams,
    ) -> eyre::Result<TxReceipt> {
        let network = opt_network(p.network, self.default_network());
        let (signer, ca) = self.signing_context(network, session)?;
        let chain = self.chain(network, &p.chain_id).await?;
        let gateway = self.gateway.as_ref();
        match change {
            GuardianChange::Add => {
                add_guardian(gateway, &chain, &signer, &ca, &p.guardian, &p.guardians_approved)
                    .await
            }
            GuardianChange::Remove => {
                remove_guardian(gateway, &chain, &signer, &ca, &p.guardian, &p.guardians_approved)
                    .await
            }
        }
    }

    pub async fn forward_call(
        &self,
        session: &Session,
        p: &ForwardCallParams,
    ) -> eyre::Result<SendOutcome> {
        let network = opt_network(p.network, self.default_network());
        let (signer, ca) = self.signing_context(network, session)?;
        let chain = self.chain(network, &p.chain_id).await?;
        let req = ForwardCallRequest {
            ca_hash: p
                .ca_hash
                .as_deref()
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map_or(ca.ca_hash, ToOwned::to_owned),
            contract_address: p.contract_address.clone(),
            method_name: p.method_name.clone(),
            args: p.args.clone(),
        };
        forward_call(self.gateway.as_ref(), &chain, &signer, &req).await
    }

    pub fn save_keystore(
        &self,
        session: &mut Session,
        mut req: SaveKeystoreRequest,
    ) -> eyre::Result<WalletStatus> {
        req.network = Some(opt_network(req.network, self.default_network()));
        self.keystore.save(&req, session)
    }

    pub fn unlock(
        &self,
        session: &mut Session,
        password: &SecretString,
        network: Option<NetworkMode>,
    ) -> eyre::Result<WalletStatus> {
        let network = opt_network(network, self.default_network());
        self.keystore.unlock(password, network, session)
    }

    /// Whether a wallet was unlocked before the call.
    pub fn lock(session: &mut Session) -> bool {
        KeystoreManager::lock(session)
    }

    pub fn wallet_status(
        &self,
        session: &Session,
        network: Option<NetworkMode>,
    ) -> eyre::Result<WalletStatus> {
        self.keystore
            .status(opt_network(network, self.default_network()), session)
    }

    pub fn keystore_exists(&self, network: Option<NetworkMode>) -> bool {
        self.keystore
            .keystore_path(opt_network(network, self.default_network()))
            .exists()
    }

    pub async fn call_view(&self, p: &CallViewParams) -> eyre::Result<Value> {
        if p.contract_address.trim().is_empty() {
            return Err(CaError::RequiredFieldMissing("contractAddress").into());
        }
        if p.method_name.trim().is_empty() {
            return Err(CaError::RequiredFieldMissing("methodName").into());
        }
        let network = opt_network(p.network, self.default_network());
        let chain = self.chain(network, &p.chain_id).await?;
        let args = if p.args.is_null() { json!({}) } else { p.args.clone() };
        self.gateway
            .call_view(&chain.endpoint, p.contract_address.trim(), &p.method_name, &args)
            .await
    }

    pub async fn balance(&self, session: &Session, p: &BalanceParams) -> eyre::Result<Value> {
        if p.symbol.trim().is_empty() {
            return Err(CaError::RequiredFieldMissing("symbol").into());
        }
        let network = opt_network(p.network, self.default_network());
        let owner = match p.owner.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
            Some(o) => o.to_owned(),
            None => match session.unlocked().filter(|w| w.network == network) {
                Some(w) => w.ca.ca_address.clone(),
                None => self.keystore_ca(network, session)?.ca_address,
            },
        };
        let chain = self.chain(network, &p.chain_id).await?;
        self.gateway
            .call_view(
                &chain.endpoint,
                &chain.token_contract_address,
                "GetBalance",
                &json!({ "symbol": p.symbol.trim(), "owner": owner }),
            )
            .await
    }

    pub async fn tx_result(&self, p: &TxResultParams) -> eyre::Result<TransactionResult> {
        if p.transaction_id.trim().is_empty() {
            return Err(CaError::RequiredFieldMissing("transactionId").into());
        }
        let network = opt_network(p.network, self.default_network());
        let chain = self.chain(network, &p.chain_id).await?;
        self.client
            .transaction_result(&chain.endpoint, p.transaction_id.trim())
            .await
    }

    pub async fn chain_info(
        &self,
        network: Option<NetworkMode>,
        refresh: bool,
    ) -> eyre::Result<Vec<ChainDescriptor>> {
        if refresh {
            self.chains.invalidate()?;
        }
        let all = self
            .chains
            .get_chain_info(opt_network(network, self.default_network()))
            .await?;
        Ok(all.as_ref().clone())
    }

    /// Cross-chain transfers whose last journal record is not `completed`.
    pub fn pending_transfers(&self) -> eyre::Result<Vec<CrossChainRecord>> {
        JsonlJournal::new(self.paths.journal_file()).unresolved()
    }

    pub fn create_wallet() -> eyre::Result<NewWallet> {
        let w = WalletIdentity::generate()?;
        Ok(NewWallet {
            address: w.address().to_owned(),
            public_key: w.public_key_hex(),
            private_key: w.private_key_hex().as_str().to_owned(),
            mnemonic: w.mnemonic().map(ToOwned::to_owned),
            derivation_path: crate::wallet::DERIVATION_PATH,
        })
    }

    pub fn paths_json(&self) -> Value {
        json!({
            "root": self.paths.root,
            "keystoreDir": self.paths.keystore_dir,
            "dataDir": self.paths.data_dir,
            "configFile": self.paths.config_file,
            "logFile": self.paths.log_file,
            "journalFile": self.paths.journal_file(),
        })
    }
}

use super::{
    http::HttpChainRpc,
    result::{extract_transaction_id, SendOutcome, TransactionResult, TxStatus},
    tx::Transaction,
    ChainRpc, ChainStatus,
};
use crate::{
    config::PollingConfig,
    errors::CaError,
    poll::{poll_fixed, PollSchedule},
    schema::{encode_message, SchemaTree},
    wallet::WalletIdentity,
};
use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tracing::{debug, info};

/// Creates a connection for an endpoint. Swapped out in tests.
pub type Connector = Arc<dyn Fn(&str) -> eyre::Result<Arc<dyn ChainRpc>> + Send + Sync>;

/// The operations higher layers compose from. [`ChainClient`] is the real implementation;
/// transfer and guardian logic is tested against fakes of this trait.
#[async_trait]
pub trait ContractGateway: Send + Sync {
    /// Encode `args` as the input of `method` on `contract`, using the schema the contract
    /// publishes on `endpoint`.
    async fn encode_args(
        &self,
        endpoint: &str,
        contract: &str,
        method: &str,
        args: &Value,
    ) -> eyre::Result<Vec<u8>>;

    async fn call_view(
        &self,
        endpoint: &str,
        contract: &str,
        method: &str,
        args: &Value,
    ) -> eyre::Result<Value>;

    /// Sign, submit, and poll to a terminal status.
    async fn call_send(
        &self,
        endpoint: &str,
        contract: &str,
        signer: &WalletIdentity,
        method: &str,
        args: &Value,
    ) -> eyre::Result<SendOutcome>;
}

/// A contract bound to one signer on one endpoint.
#[derive(Debug)]
pub struct ContractHandle {
    pub endpoint: String,
    pub contract: String,
    pub signer_address: String,
    pub schema: SchemaTree,
}

type HandleKey = (String, String, String);

pub struct ChainClient {
    connector: Connector,
    connections: Mutex<HashMap<String, Arc<dyn ChainRpc>>>,
    handles: Mutex<HashMap<HandleKey, Arc<ContractHandle>>>,
    polling: PollingConfig,
    view_identity: WalletIdentity,
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

fn poisoned<T>(e: PoisonError<T>) -> eyre::Report {
    eyre::eyre!("mutex poisoned: {e}")
}

impl ChainClient {
    /// HTTP connections with the given per-request timeout.
    pub fn new(polling: PollingConfig, timeout: Duration) -> Result<Self, CaError> {
        let connector: Connector = Arc::new(move |endpoint: &str| {
            let rpc: Arc<dyn ChainRpc> = Arc::new(HttpChainRpc::new(endpoint, timeout)?);
            Ok(rpc)
        });
        Self::with_connector(polling, connector)
    }

    pub fn with_connector(polling: PollingConfig, connector: Connector) -> Result<Self, CaError> {
        Ok(Self {
            connector,
            connections: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
            polling,
            view_identity: WalletIdentity::view_identity()?,
        })
    }

    /// Memoized by endpoint string.
    pub fn connection(&self, endpoint: &str) -> eyre::Result<Arc<dyn ChainRpc>> {
        let mut conns = self.connections.lock().map_err(poisoned)?;
        if let Some(c) = conns.get(endpoint) {
            return Ok(Arc::clone(c));
        }
        debug!(endpoint, "opening chain connection");
        let c = (self.connector)(endpoint)?;
        conns.insert(endpoint.to_owned(), Arc::clone(&c));
        Ok(c)
    }

    /// Memoized by `(endpoint, contract, signer address)`. A miss fetches and indexes the
    /// contract's descriptor set.
    pub async fn contract_handle(
        &self,
        endpoint: &str,
        contract: &str,
        signer: &WalletIdentity,
    ) -> eyre::Result<Arc<ContractHandle>> {
        let key = (
            endpoint.to_owned(),
            contract.to_owned(),
            signer.address().to_owned(),
        );
        {
            let handles = self.handles.lock().map_err(poisoned)?;
            if let Some(h) = handles.get(&key) {
                return Ok(Arc::clone(h));
            }
        }

        let rpc = self.connection(endpoint)?;
        let fds = rpc.contract_descriptor_set(contract).await?;
        let schema = SchemaTree::from_descriptor_set(&fds)?;
        let fresh = Arc::new(ContractHandle {
            endpoint: key.0.clone(),
            contract: key.1.clone(),
            signer_address: key.2.clone(),
            schema,
        });

        let mut handles = self.handles.lock().map_err(poisoned)?;
        let h = handles.entry(key).or_insert(fresh);
        Ok(Arc::clone(h))
    }

    pub async fn chain_status(&self, endpoint: &str) -> eyre::Result<ChainStatus> {
        self.connection(endpoint)?.chain_status().await
    }

    /// One lookup, no polling.
    pub async fn transaction_result(
        &self,
        endpoint: &str,
        tx_id: &str,
    ) -> eyre::Result<TransactionResult> {
        let raw = self.connection(endpoint)?.transaction_result(tx_id).await?;
        Ok(TransactionResult::from_node_json(tx_id, &raw))
    }

    /// Poll until MINED, raising [`CaError::TransactionFailed`] on FAILED and
    /// [`CaError::NotConfirmed`] when attempts run out. Transport errors end polling.
    pub async fn poll_transaction_result(
        &self,
        endpoint: &str,
        tx_id: &str,
    ) -> eyre::Result<TransactionResult> {
        let schedule = PollSchedule::from(&self.polling);
        let rpc = self.connection(endpoint)?;
        let settled = poll_fixed(schedule, |attempt| {
            let rpc = Arc::clone(&rpc);
            async move {
                let raw = rpc.transaction_result(tx_id).await?;
                let result = TransactionResult::from_node_json(tx_id, &raw);
                debug!(tx_id, attempt, status = %result.status, "polled transaction");
                match result.status {
                    TxStatus::Mined => Ok(Some(result)),
                    TxStatus::Failed => Err(CaError::TransactionFailed {
                        transaction_id: tx_id.to_owned(),
                        error: result.error.unwrap_or_else(|| "no error detail".to_owned()),
                    }
                    .into()),
                    TxStatus::Pending | TxStatus::Other(_) => Ok(None),
                }
            }
        })
        .await?;
        settled.ok_or_else(|| {
            CaError::NotConfirmed {
                transaction_id: tx_id.to_owned(),
                attempts: schedule.max_attempts,
            }
            .into()
        })
    }

    async fn signed_call(
        &self,
        endpoint: &str,
        contract: &str,
        signer: &WalletIdentity,
        method: &str,
        args: &Value,
    ) -> eyre::Result<(Arc<ContractHandle>, Transaction)> {
        let handle = self.contract_handle(endpoint, contract, signer).await?;
        let m = handle
            .schema
            .method(method)
            .ok_or_else(|| CaError::MethodNotFound {
                contract: contract.to_owned(),
                method: method.to_owned(),
            })?;
        let params = encode_message(&m.input, args)?;
        let status = self.chain_status(endpoint).await?;
        let mut tx = Transaction::build(signer.address(), contract, &m.name, params, &status)?;
        tx.sign(signer)?;
        Ok((handle, tx))
    }
}

#[async_trait]
impl ContractGateway for ChainClient {
    async fn encode_args(
        &self,
        endpoint: &str,
        contract: &str,
        method: &str,
        args: &Value,
    ) -> eyre::Result<Vec<u8>> {
        let handle = self
            .contract_handle(endpoint, contract, &self.view_identity)
            .await?;
        handle.schema.encode_input(method, args)
    }

    async fn call_view(
        &self,
        endpoint: &str,
        contract: &str,
        method: &str,
        args: &Value,
    ) -> eyre::Result<Value> {
        let (handle, tx) = self
            .signed_call(endpoint, contract, &self.view_identity, method, args)
            .await?;
        let out = self
            .connection(endpoint)?
            .execute_transaction(&tx.to_hex())
            .await?;
        handle.schema.decode_output(method, &out)
    }

    async fn call_send(
        &self,
        endpoint: &str,
        contract: &str,
        signer: &WalletIdentity,
        method: &str,
        args: &Value,
    ) -> eyre::Result<SendOutcome> {
        let (_handle, tx) = self
            .signed_call(endpoint, contract, signer, method, args)
            .await?;
        let resp = self
            .connection(endpoint)?
            .send_transaction(&tx.to_hex())
            .await?;
        let transaction_id = extract_transaction_id(&resp)?;
        info!(
            endpoint,
            contract,
            method,
            from = signer.address(),
            transaction_id = %transaction_id,
            "submitted transaction"
        );

        tokio::time::sleep(Duration::from_millis(self.polling.send_settle_ms)).await;
        let result = self
            .poll_transaction_result(endpoint, &transaction_id)
            .await?;
        Ok(SendOutcome {
            transaction_id,
            result,
        })
    }
}

pub mod address;
pub mod chain_id;
pub mod client;
pub mod http;
pub mod result;
pub mod tx;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChainStatus {
    pub chain_id: String,
    pub best_chain_height: i64,
    pub best_chain_hash: String,
}

/// One connection to a chain node. Implemented over HTTP by [`http::HttpChainRpc`] and by
/// in-memory fakes in tests.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn chain_status(&self) -> eyre::Result<ChainStatus>;

    /// Serialized `FileDescriptorSet` describing the contract's services and messages.
    async fn contract_descriptor_set(&self, contract: &str) -> eyre::Result<Vec<u8>>;

    /// Execute a signed read-only transaction and return the raw output bytes.
    /// A node-side rejection is [`crate::errors::CaError::ViewCallError`].
    async fn execute_transaction(&self, raw_tx_hex: &str) -> eyre::Result<Vec<u8>>;

    /// Broadcast a signed transaction. Returns the node's response body untouched; callers
    /// normalize it with [`result::extract_transaction_id`].
    async fn send_transaction(&self, raw_tx_hex: &str) -> eyre::Result<Value>;

    /// The node's `transactionResult` payload for `tx_id`.
    async fn transaction_result(&self, tx_id: &str) -> eyre::Result<Value>;
}

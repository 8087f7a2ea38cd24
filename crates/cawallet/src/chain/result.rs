use crate::errors::CaError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum TxStatus {
    Pending,
    Mined,
    Failed,
    /// Any status string the node reports that this client does not treat specially
    /// (e.g. `NOTEXISTED`, `PENDING_VALIDATION`). Non-terminal.
    Other(String),
}

impl TxStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "MINED" => Self::Mined,
            "FAILED" | "NODEVALIDATIONFAILED" => Self::Failed,
            "PENDING" => Self::Pending,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Mined => "MINED",
            Self::Failed => "FAILED",
            Self::Other(s) => s,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Mined | Self::Failed)
    }
}

impl From<String> for TxStatus {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<TxStatus> for String {
    fn from(s: TxStatus) -> Self {
        s.as_str().to_owned()
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    pub transaction_id: String,
    pub status: TxStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub block_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub block_hash: Option<String>,
}

impl TransactionResult {
    /// Parse the node's `transactionResult` payload (keys in Pascal case).
    pub fn from_node_json(tx_id: &str, v: &Value) -> Self {
        let status = v
            .get("Status")
            .and_then(Value::as_str)
            .map_or(TxStatus::Pending, TxStatus::parse);
        let error = v
            .get("Error")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned);
        let block_number = v.get("BlockNumber").and_then(Value::as_i64);
        let block_hash = v
            .get("BlockHash")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned);
        let transaction_id = v
            .get("TransactionId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(tx_id)
            .to_owned();
        Self {
            transaction_id,
            status,
            error,
            block_number,
            block_hash,
        }
    }
}

/// What a send call hands back: the submitted id and the polled terminal result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub transaction_id: String,
    pub result: TransactionResult,
}

impl SendOutcome {
    pub const fn status(&self) -> &TxStatus {
        &self.result.status
    }
}

/// The `{transactionId, status}` pair write commands report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_id: String,
    pub status: TxStatus,
}

impl From<SendOutcome> for TxReceipt {
    fn from(o: SendOutcome) -> Self {
        Self {
            transaction_id: o.transaction_id,
            status: o.result.status,
        }
    }
}

/// The one place submission responses are normalized. Accepted shapes, in order:
///
/// - `{"TransactionId": "<id>"}`
/// - `{"result": {"TransactionId": "<id>"}}`
///
/// Anything else (including empty ids) is [`CaError::NoTransactionId`].
pub fn extract_transaction_id(resp: &Value) -> Result<String, CaError> {
    let top = resp.get("TransactionId").and_then(Value::as_str);
    let nested = || {
        resp.get("result")
            .and_then(|r| r.get("TransactionId"))
            .and_then(Value::as_str)
    };
    top.filter(|s| !s.trim().is_empty())
        .or_else(|| nested().filter(|s| !s.trim().is_empty()))
        .map(|s| s.trim().to_owned())
        .ok_or(CaError::NoTransactionId)
}

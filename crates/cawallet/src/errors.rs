use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A structured error suitable for returning to a CLI caller or an MCP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub data: Value,
}

impl ToolError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Value::Null,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Recover the structured error carried by a report, falling back to `internal_error`.
    pub fn from_report(e: &eyre::Report) -> Self {
        e.downcast_ref::<CaError>().map_or_else(
            || Self::new("internal_error", format!("{e:#}")),
            |ce| Self::from(ce.clone()),
        )
    }
}

/// Everything the operator needs to move stranded funds back after a failed cross-chain
/// step 2. Carried verbatim by [`CaError::RecoveryNeeded`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryDetails {
    pub manager_address: String,
    pub token_contract_address: String,
    pub symbol: String,
    pub amount: i64,
    pub source_chain_id: String,
    pub to_chain_id: String,
    pub ca_hash: String,
    pub ca_address: String,
    pub step1_transaction_id: String,
    pub cause: String,
}

impl std::fmt::Display for RecoveryDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RECOVERY NEEDED: cross-chain step 2 (CrossChainTransfer to {to_chain}) failed after \
             step 1 moved the funds out of the CA wallet. {amount} {symbol} are held by manager \
             address {manager} on chain {source}. Token contract: {token}. CA hash: {ca_hash}. \
             CA address: {ca_address}. Step 1 transaction: {tx1}. Run recover-stuck-transfer \
             --chain {source} --symbol {symbol} --amount {amount} to return them. Cause: {cause}",
            to_chain = self.to_chain_id,
            amount = self.amount,
            symbol = self.symbol,
            manager = self.manager_address,
            source = self.source_chain_id,
            token = self.token_contract_address,
            ca_hash = self.ca_hash,
            ca_address = self.ca_address,
            tx1 = self.step1_transaction_id,
            cause = self.cause,
        )
    }
}

#[derive(Debug, Error, Clone)]
pub enum CaError {
    #[error("{0} is required")]
    RequiredFieldMissing(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("method {method} not found on contract {contract}")]
    MethodNotFound { contract: String, method: String },

    #[error("input type for method {0} not found in contract descriptor")]
    MethodInputTypeNotFound(String),

    #[error("view call failed: {0}")]
    ViewCallError(String),

    #[error("chain response carried no transaction id")]
    NoTransactionId,

    #[error("transaction {transaction_id} failed: {error}")]
    TransactionFailed {
        transaction_id: String,
        error: String,
    },

    #[error("transaction {transaction_id} not confirmed after {attempts} attempts (may still be pending)")]
    NotConfirmed {
        transaction_id: String,
        attempts: u32,
    },

    #[error("cross-chain step 1 (transfer to manager) failed: {0}")]
    CrossChainStep1Failed(String),

    #[error("{0}")]
    RecoveryNeeded(Box<RecoveryDetails>),

    #[error("no keystore found for {0}; run save-keystore first")]
    NoKeystoreFound(String),

    #[error("keystore decryption failed: wrong password or corrupt keystore")]
    DecryptionFailed,

    #[error(
        "no wallet available: unlock a keystore (unlock --password ...) or set CAWALLET_PRIVATE_KEY"
    )]
    NoWalletAvailable,

    #[error("password required")]
    PasswordRequired,

    #[error("guardian approvals insufficient: {provided} provided, {required} required")]
    InsufficientApprovals { required: usize, provided: usize },

    #[error("unknown chain: {0}")]
    UnknownChain(String),

    #[error("invalid chain id: {0}")]
    InvalidChainId(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("api request failed with http {status}{}: {message}", upstream_suffix(.code.as_deref()))]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("keystore busy")]
    KeystoreBusy,
}

fn upstream_suffix(code: Option<&str>) -> String {
    code.map(|c| format!(" ({c})")).unwrap_or_default()
}

impl CaError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::RequiredFieldMissing(_) => "required_field_missing",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::MethodNotFound { .. } => "method_not_found",
            Self::MethodInputTypeNotFound(_) => "method_input_type_not_found",
            Self::ViewCallError(_) => "view_call_error",
            Self::NoTransactionId => "no_transaction_id",
            Self::TransactionFailed { .. } => "transaction_failed",
            Self::NotConfirmed { .. } => "not_confirmed",
            Self::CrossChainStep1Failed(_) => "cross_chain_step1_failed",
            Self::RecoveryNeeded(_) => "recovery_needed",
            Self::NoKeystoreFound(_) => "no_keystore_found",
            Self::DecryptionFailed => "decryption_failed",
            Self::NoWalletAvailable => "no_wallet_available",
            Self::PasswordRequired => "password_required",
            Self::InsufficientApprovals { .. } => "insufficient_approvals",
            Self::UnknownChain(_) => "unknown_chain",
            Self::InvalidChainId(_) => "invalid_chain_id",
            Self::InvalidAddress(_) => "invalid_address",
            Self::Api { .. } => "api_error",
            Self::KeystoreBusy => "keystore_busy",
        }
    }

    /// True for 404-style API failures, which lookups treat as "not found".
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

impl From<CaError> for ToolError {
    fn from(e: CaError) -> Self {
        let code = e.code();
        let message = e.to_string();
        match e {
            CaError::RecoveryNeeded(details) => Self::new(code, message)
                .with_data(serde_json::to_value(&*details).unwrap_or(Value::Null)),
            CaError::Api {
                status,
                code: upstream,
                ..
            } => Self::new(code, message)
                .with_data(serde_json::json!({ "status": status, "upstreamCode": upstream })),
            _ => Self::new(code, message),
        }
    }
}

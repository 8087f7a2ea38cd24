use crate::{
    chain::{client::ContractGateway, result::TxReceipt},
    chain_info::ChainDescriptor,
    errors::CaError,
    forward::{forward_call, ForwardCallRequest},
    wallet::{CaHandle, WalletIdentity},
};
use serde_json::{json, Value};
use tracing::info;

pub const GET_HOLDER_INFO: &str = "GetHolderInfo";
pub const ADD_GUARDIAN: &str = "AddGuardian";
pub const REMOVE_GUARDIAN: &str = "RemoveGuardian";

/// Approvals needed to change a guardian set of size `n`: all of them up to three, then a
/// strict three-fifths majority.
pub const fn approval_count(n: usize) -> usize {
    if n <= 3 {
        n
    } else {
        n * 3 / 5 + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardianChange {
    Add,
    Remove,
}

impl GuardianChange {
    const fn method(self) -> &'static str {
        match self {
            Self::Add => ADD_GUARDIAN,
            Self::Remove => REMOVE_GUARDIAN,
        }
    }

    const fn guardian_field(self) -> &'static str {
        match self {
            Self::Add => "guardianToAdd",
            Self::Remove => "guardianToRemove",
        }
    }
}

pub async fn current_guardian_count(
    gateway: &dyn ContractGateway,
    chain: &ChainDescriptor,
    ca_hash: &str,
) -> eyre::Result<usize> {
    let holder = gateway
        .call_view(
            &chain.endpoint,
            &chain.ca_contract_address,
            GET_HOLDER_INFO,
            &json!({ "caHash": ca_hash }),
        )
        .await?;
    Ok(holder
        .get("guardianList")
        .and_then(|l| l.get("guardians"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len))
}

/// Check the approval threshold against the live guardian set, then forward
/// `AddGuardian`/`RemoveGuardian` to the CA contract.
async fn change_guardian(
    gateway: &dyn ContractGateway,
    chain: &ChainDescriptor,
    signer: &WalletIdentity,
    ca: &CaHandle,
    change: GuardianChange,
    guardian: &Value,
    guardians_approved: &[Value],
) -> eyre::Result<TxReceipt> {
    if ca.ca_hash.trim().is_empty() {
        return Err(CaError::RequiredFieldMissing("caHash").into());
    }
    if guardian.is_null() {
        return Err(CaError::RequiredFieldMissing(change.guardian_field()).into());
    }

    let count = current_guardian_count(gateway, chain, &ca.ca_hash).await?;
    let required = approval_count(count);
    if guardians_approved.len() < required {
        return Err(CaError::InsufficientApprovals {
            required,
            provided: guardians_approved.len(),
        }
        .into());
    }

    let mut args = serde_json::Map::new();
    args.insert("caHash".to_owned(), json!(ca.ca_hash));
    args.insert(change.guardian_field().to_owned(), guardian.clone());
    args.insert("guardiansApproved".to_owned(), json!(guardians_approved));
    let req = ForwardCallRequest {
        ca_hash: ca.ca_hash.clone(),
        contract_address: chain.ca_contract_address.clone(),
        method_name: change.method().to_owned(),
        args: Value::Object(args),
    };
    let out = forward_call(gateway, chain, signer, &req).await?;
    info!(
        chain_id = %chain.chain_id,
        method = change.method(),
        guardians = count,
        approvals = guardians_approved.len(),
        transaction_id = %out.transaction_id,
        "guardian change submitted"
    );
    Ok(out.into())
}

pub async fn add_guardian(
    gateway: &dyn ContractGateway,
    chain: &ChainDescriptor,
    signer: &WalletIdentity,
    ca: &CaHandle,
    guardian_to_add: &Value,
    guardians_approved: &[Value],
) -> eyre::Result<TxReceipt> {
    change_guardian(
        gateway,
        chain,
        signer,
        ca,
        GuardianChange::Add,
        guardian_to_add,
        guardians_approved,
    )
    .await
}

pub async fn remove_guardian(
    gateway: &dyn ContractGateway,
    chain: &ChainDescriptor,
    signer: &WalletIdentity,
    ca: &CaHandle,
    guardian_to_remove: &Value,
    guardians_approved: &[Value],
) -> eyre::Result<TxReceipt> {
    change_guardian(
        gateway,
        chain,
        signer,
        ca,
        GuardianChange::Remove,
        guardian_to_remove,
        guardians_approved,
    )
    .await
}

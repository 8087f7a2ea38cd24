//! Token transfers out of a CA wallet.
//!
//! A cross-chain transfer is two transactions that cannot be made atomic:
//!
//! 1. `ManagerForwardCall(Transfer)` moves the funds from the CA address to the manager's own
//!    address on the source chain.
//! 2. A direct `CrossChainTransfer` signed by the manager sends them to the destination chain.
//!
//! Between the two the funds sit at the manager address. The journal gets a
//! `step1_confirmed` record before step 2 is tried, and a failed step 2 surfaces as
//! [`CaError::RecoveryNeeded`] carrying everything `recover_stuck_transfer` needs.

use crate::{
    chain::{
        chain_id::chain_id_to_number,
        client::ContractGateway,
        result::{TxReceipt, TxStatus},
    },
    chain_info::ChainDescriptor,
    errors::{CaError, RecoveryDetails},
    forward::{forward_call, ForwardCallRequest},
    journal::{utc_now_iso, CrossChainRecord, TransferJournal, TransferPhase},
    wallet::{CaHandle, WalletIdentity},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

pub const TRANSFER: &str = "Transfer";
pub const CROSS_CHAIN_TRANSFER: &str = "CrossChainTransfer";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossChainReceipt {
    pub transfer_id: String,
    /// Step 2's transaction.
    pub transaction_id: String,
    pub status: TxStatus,
    pub step1_transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAmount {
    pub symbol: String,
    pub amount: i64,
    #[serde(default)]
    pub memo: String,
}

impl TokenAmount {
    fn validate(&self) -> Result<(), CaError> {
        if self.symbol.trim().is_empty() {
            return Err(CaError::RequiredFieldMissing("symbol"));
        }
        if self.amount <= 0 {
            return Err(CaError::InvalidArgument(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossChainTransferParams {
    pub to: String,
    pub to_chain_id: String,
    #[serde(flatten)]
    pub token: TokenAmount,
    /// Defaults to the source chain.
    #[serde(default)]
    pub issue_chain_id: Option<String>,
}

fn transfer_args(to: &str, token: &TokenAmount) -> serde_json::Value {
    json!({
        "to": to,
        "symbol": token.symbol.trim(),
        "amount": token.amount,
        "memo": token.memo,
    })
}

fn require_to(to: &str) -> Result<(), CaError> {
    if to.trim().is_empty() {
        return Err(CaError::RequiredFieldMissing("to"));
    }
    Ok(())
}

/// One forwarded `Transfer` from the CA address to `to`. The forward call's status is
/// reported, not interpreted.
pub async fn same_chain_transfer(
    gateway: &dyn ContractGateway,
    chain: &ChainDescriptor,
    signer: &WalletIdentity,
    ca: &CaHandle,
    to: &str,
    token: &TokenAmount,
) -> eyre::Result<TxReceipt> {
    require_to(to)?;
    token.validate()?;
    let req = ForwardCallRequest {
        ca_hash: ca.ca_hash.clone(),
        contract_address: chain.token_contract_address.clone(),
        method_name: TRANSFER.to_owned(),
        args: transfer_args(to, token),
    };
    let out = forward_call(gateway, chain, signer, &req).await?;
    info!(
        chain_id = %chain.chain_id,
        transaction_id = %out.transaction_id,
        status = %out.status(),
        "same-chain transfer finished"
    );
    Ok(out.into())
}

pub async fn cross_chain_transfer(
    gateway: &dyn ContractGateway,
    journal: &dyn TransferJournal,
    source: &ChainDescriptor,
    signer: &WalletIdentity,
    ca: &CaHandle,
    params: &CrossChainTransferParams,
) -> eyre::Result<CrossChainReceipt> {
    require_to(&params.to)?;
    params.token.validate()?;
    if params.to_chain_id.trim().is_empty() {
        return Err(CaError::RequiredFieldMissing("toChainId").into());
    }
    let to_chain_id = params.to_chain_id.trim();
    if to_chain_id == source.chain_id {
        return Err(CaError::InvalidArgument(format!(
            "destination chain equals source chain {to_chain_id}; use a same-chain transfer"
        ))
        .into());
    }
    let issue_chain_id = params
        .issue_chain_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(&source.chain_id);
    // Both conversions happen before any funds move.
    let to_chain_num = chain_id_to_number(to_chain_id)?;
    let issue_chain_num = chain_id_to_number(issue_chain_id)?;

    let manager = signer.address().to_owned();
    let token = &params.token;

    let step1 = ForwardCallRequest {
        ca_hash: ca.ca_hash.clone(),
        contract_address: source.token_contract_address.clone(),
        method_name: TRANSFER.to_owned(),
        args: transfer_args(&manager, token),
    };
    let step1_out = match forward_call(gateway, source, signer, &step1).await {
        Ok(o) => o,
        Err(e) => return Err(CaError::CrossChainStep1Failed(format!("{e:#}")).into()),
    };
    if step1_out.status() != &TxStatus::Mined {
        let detail = step1_out
            .result
            .error
            .as_deref()
            .map(|d| format!(": {d}"))
            .unwrap_or_default();
        return Err(CaError::CrossChainStep1Failed(format!(
            "transaction {} ended with status {}{detail}",
            step1_out.transaction_id,
            step1_out.status()
        ))
        .into());
    }

    let record = CrossChainRecord {
        ts: utc_now_iso(),
        transfer_id: uuid::Uuid::new_v4().to_string(),
        phase: TransferPhase::Step1Confirmed,
        source_chain_id: source.chain_id.clone(),
        to_chain_id: to_chain_id.to_owned(),
        symbol: token.symbol.trim().to_owned(),
        amount: token.amount,
        to: params.to.trim().to_owned(),
        manager_address: manager.clone(),
        token_contract_address: source.token_contract_address.clone(),
        ca_hash: ca.ca_hash.clone(),
        ca_address: ca.ca_address.clone(),
        step1_transaction_id: step1_out.transaction_id.clone(),
        step2_transaction_id: None,
        error: None,
    };
    let recovery = |cause: String| -> eyre::Report {
        CaError::RecoveryNeeded(Box::new(RecoveryDetails {
            manager_address: record.manager_address.clone(),
            token_contract_address: record.token_contract_address.clone(),
            symbol: record.symbol.clone(),
            amount: record.amount,
            source_chain_id: record.source_chain_id.clone(),
            to_chain_id: record.to_chain_id.clone(),
            ca_hash: record.ca_hash.clone(),
            ca_address: record.ca_address.clone(),
            step1_transaction_id: record.step1_transaction_id.clone(),
            cause,
        }))
        .into()
    };

    if let Err(e) = journal.append(&record) {
        warn!(
            transfer_id = %record.transfer_id,
            step1_transaction_id = %record.step1_transaction_id,
            error = %format!("{e:#}"),
            "could not journal step 1; not attempting step 2"
        );
        return Err(recovery(format!("step 2 not attempted: journal write failed: {e:#}")));
    }
    info!(
        transfer_id = %record.transfer_id,
        step1_transaction_id = %record.step1_transaction_id,
        manager = %manager,
        "cross-chain step 1 confirmed"
    );

    let step2_args = json!({
        "to": params.to.trim(),
        "symbol": record.symbol,
        "amount": token.amount,
        "memo": token.memo,
        "toChainId": to_chain_num,
        "issueChainId": issue_chain_num,
    });
    let step2 = gateway
        .call_send(
            &source.endpoint,
            &source.token_contract_address,
            signer,
            CROSS_CHAIN_TRANSFER,
            &step2_args,
        )
        .await
        .and_then(|out| {
            if out.status() == &TxStatus::Mined {
                Ok(out)
            } else {
                Err(eyre::eyre!(
                    "transaction {} ended with status {}",
                    out.transaction_id,
                    out.status()
                ))
            }
        });

    match step2 {
        Ok(out) => {
            let mut done = record.at_phase(TransferPhase::Completed);
            done.step2_transaction_id = Some(out.transaction_id.clone());
            if let Err(e) = journal.append(&done) {
                warn!(
                    transfer_id = %done.transfer_id,
                    error = %format!("{e:#}"),
                    "could not journal completed transfer"
                );
            }
            info!(
                transfer_id = %done.transfer_id,
                transaction_id = %out.transaction_id,
                "cross-chain transfer submitted to destination"
            );
            Ok(CrossChainReceipt {
                transfer_id: done.transfer_id,
                transaction_id: out.transaction_id,
                status: out.result.status,
                step1_transaction_id: done.step1_transaction_id,
            })
        }
        Err(e) => {
            let cause = format!("{e:#}");
            let mut stuck = record.at_phase(TransferPhase::RecoveryNeeded);
            stuck.error = Some(cause.clone());
            if let Err(je) = journal.append(&stuck) {
                warn!(
                    transfer_id = %stuck.transfer_id,
                    error = %format!("{je:#}"),
                    "could not journal recovery-needed transfer"
                );
            }
            warn!(
                transfer_id = %stuck.transfer_id,
                manager = %stuck.manager_address,
                step1_transaction_id = %stuck.step1_transaction_id,
                cause = %cause,
                "cross-chain step 2 failed; funds held by manager"
            );
            Err(recovery(cause))
        }
    }
}

/// Direct `Transfer` signed by the manager, returning funds from the manager address to the
/// CA address. Nothing checks whether anything is actually stuck; with no balance the chain
/// rejects it.
pub async fn recover_stuck_transfer(
    gateway: &dyn ContractGateway,
    chain: &ChainDescriptor,
    signer: &WalletIdentity,
    ca: &CaHandle,
    token: &TokenAmount,
) -> eyre::Result<TxReceipt> {
    token.validate()?;
    if ca.ca_address.trim().is_empty() {
        return Err(CaError::RequiredFieldMissing("caAddress").into());
    }
    let out = gateway
        .call_send(
            &chain.endpoint,
            &chain.token_contract_address,
            signer,
            TRANSFER,
            &transfer_args(ca.ca_address.trim(), token),
        )
        .await?;
    info!(
        chain_id = %chain.chain_id,
        transaction_id = %out.transaction_id,
        to = %ca.ca_address,
        "returned stuck funds to CA address"
    );
    Ok(out.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain_info::tests::descriptor,
        forward::{
            tests::{outcome, RecordingGateway},
            MANAGER_FORWARD_CALL,
        },
        journal::tests::MemoryJournal,
    };

    fn ca() -> CaHandle {
        CaHandle {
            ca_hash: "ca-hash-1".to_owned(),
            ca_address: "2wRDbyVF28VBQoSPgdSEFaL4x7CaXz8TCBujYhgWc9qTMxBE3n".to_owned(),
            origin_chain_id: "AELF".to_owned(),
        }
    }

    fn elf(amount: i64) -> TokenAmount {
        TokenAmount {
            symbol: "ELF".to_owned(),
            amount,
            memo: String::new(),
        }
    }

    fn params() -> CrossChainTransferParams {
        CrossChainTransferParams {
            to: "recipient-addr".to_owned(),
            to_chain_id: "AELF".to_owned(),
            token: elf(150_000_000),
            issue_chain_id: None,
        }
    }

    fn err_of<T: std::fmt::Debug>(r: eyre::Result<T>) -> eyre::Result<eyre::Report> {
        match r {
            Ok(v) => eyre::bail!("expected an error, got {v:?}"),
            Err(e) => Ok(e),
        }
    }

    #[tokio::test]
    async fn same_chain_reports_forward_call_result() -> eyre::Result<()> {
        let gw = RecordingGateway::default();
        gw.script_send(MANAGER_FORWARD_CALL, Ok(outcome("t1", "MINED")));
        let receipt = same_chain_transfer(
            &gw,
            &descriptor("AELF"),
            &WalletIdentity::generate()?,
            &ca(),
            "recipient-addr",
            &elf(10),
        )
        .await?;
        assert_eq!(
            serde_json::to_value(&receipt)?,
            json!({"transactionId": "t1", "status": "MINED"})
        );

        let sent = gw.sent();
        let send = sent.first().ok_or_else(|| eyre::eyre!("nothing sent"))?;
        assert_eq!(send.args.get("methodName"), Some(&json!("Transfer")));
        assert_eq!(send.args.get("contractAddress"), Some(&json!("token-AELF")));
        Ok(())
    }

    #[tokio::test]
    async fn step1_failure_never_attempts_step2() -> eyre::Result<()> {
        let gw = RecordingGateway::default();
        gw.script_send(
            MANAGER_FORWARD_CALL,
            Err(CaError::TransactionFailed {
                transaction_id: "t1".to_owned(),
                error: "Insufficient balance".to_owned(),
            }),
        );
        let journal = MemoryJournal::default();
        let err = err_of(
            cross_chain_transfer(
                &gw,
                &journal,
                &descriptor("tDVV"),
                &WalletIdentity::generate()?,
                &ca(),
                &params(),
            )
            .await,
        )?;
        assert!(err.to_string().to_lowercase().contains("step 1"), "{err}");
        assert!(matches!(
            err.downcast_ref::<CaError>(),
            Some(CaError::CrossChainStep1Failed(_))
        ));
        assert!(gw.calls().iter().all(|c| c.method != CROSS_CHAIN_TRANSFER));
        assert!(journal.phases().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn step1_transport_error_is_step1_failure() -> eyre::Result<()> {
        let gw = RecordingGateway::default();
        gw.script_send(MANAGER_FORWARD_CALL, Err(CaError::NoTransactionId));
        let err = err_of(
            cross_chain_transfer(
                &gw,
                &MemoryJournal::default(),
                &descriptor("tDVV"),
                &WalletIdentity::generate()?,
                &ca(),
                &params(),
            )
            .await,
        )?;
        assert!(matches!(
            err.downcast_ref::<CaError>(),
            Some(CaError::CrossChainStep1Failed(_))
        ));
        assert!(gw.calls().iter().all(|c| c.method != CROSS_CHAIN_TRANSFER));
        Ok(())
    }

    #[tokio::test]
    async fn step2_failure_needs_recovery_with_full_details() -> eyre::Result<()> {
        let gw = RecordingGateway::default();
        gw.script_send(MANAGER_FORWARD_CALL, Ok(outcome("step1-tx", "MINED")));
        gw.script_send(
            CROSS_CHAIN_TRANSFER,
            Err(CaError::TransactionFailed {
                transaction_id: "step2-tx".to_owned(),
                error: "bridge paused".to_owned(),
            }),
        );
        let journal = MemoryJournal::default();
        let signer = WalletIdentity::generate()?;
        let source = descriptor("tDVV");
        let err = err_of(
            cross_chain_transfer(&gw, &journal, &source, &signer, &ca(), &params()).await,
        )?;
        let msg = err.to_string();
        assert!(msg.contains("RECOVERY NEEDED"), "{msg}");
        for needle in [
            signer.address(),
            source.token_contract_address.as_str(),
            "ELF",
            "150000000",
            "step1-tx",
            "ca-hash-1",
            "tDVV",
        ] {
            assert!(msg.contains(needle), "message lacks {needle}: {msg}");
        }
        assert!(matches!(
            err.downcast_ref::<CaError>(),
            Some(CaError::RecoveryNeeded(_))
        ));
        assert_eq!(
            journal.phases(),
            vec![TransferPhase::Step1Confirmed, TransferPhase::RecoveryNeeded]
        );
        Ok(())
    }

    #[tokio::test]
    async fn success_returns_step2_id_and_encodes_chain_ids() -> eyre::Result<()> {
        let gw = RecordingGateway::default();
        gw.script_send(MANAGER_FORWARD_CALL, Ok(outcome("step1-tx", "MINED")));
        gw.script_send(CROSS_CHAIN_TRANSFER, Ok(outcome("step2-tx", "MINED")));
        let journal = MemoryJournal::default();
        let signer = WalletIdentity::generate()?;
        let receipt = cross_chain_transfer(
            &gw,
            &journal,
            &descriptor("tDVV"),
            &signer,
            &ca(),
            &params(),
        )
        .await?;
        assert_eq!(receipt.transaction_id, "step2-tx");
        assert_eq!(receipt.step1_transaction_id, "step1-tx");
        assert_eq!(
            journal.phases(),
            vec![TransferPhase::Step1Confirmed, TransferPhase::Completed]
        );

        let sent = gw.sent();
        let [step1, step2] = sent.as_slice() else {
            eyre::bail!("expected two sends, got {sent:?}");
        };
        let inner: serde_json::Value = serde_json::from_slice(
            &base64::Engine::decode(
                &base64::engine::general_purpose::STANDARD,
                step1
                    .args
                    .get("args")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default(),
            )?,
        )?;
        assert_eq!(inner.get("to"), Some(&json!(signer.address())));

        assert_eq!(step2.method, CROSS_CHAIN_TRANSFER);
        assert_eq!(step2.contract, "token-tDVV");
        assert_eq!(step2.signer.as_deref(), Some(signer.address()));
        assert_eq!(step2.args.get("to"), Some(&json!("recipient-addr")));
        assert_eq!(step2.args.get("toChainId"), Some(&json!(9_992_731)));
        assert_eq!(step2.args.get("issueChainId"), Some(&json!(1_866_392)));
        Ok(())
    }

    #[tokio::test]
    async fn journal_failure_stops_before_step2() -> eyre::Result<()> {
        let gw = RecordingGateway::default();
        let err = err_of(
            cross_chain_transfer(
                &gw,
                &MemoryJournal::failing(),
                &descriptor("tDVV"),
                &WalletIdentity::generate()?,
                &ca(),
                &params(),
            )
            .await,
        )?;
        assert!(matches!(
            err.downcast_ref::<CaError>(),
            Some(CaError::RecoveryNeeded(_))
        ));
        assert!(gw.calls().iter().all(|c| c.method != CROSS_CHAIN_TRANSFER));
        Ok(())
    }

    #[tokio::test]
    async fn bad_chain_ids_fail_before_funds_move() -> eyre::Result<()> {
        let gw = RecordingGateway::default();
        let mut p = params();
        p.to_chain_id = "AELFAELF".to_owned();
        let err = err_of(
            cross_chain_transfer(
                &gw,
                &MemoryJournal::default(),
                &descriptor("tDVV"),
                &WalletIdentity::generate()?,
                &ca(),
                &p,
            )
            .await,
        )?;
        assert!(matches!(
            err.downcast_ref::<CaError>(),
            Some(CaError::InvalidChainId(_))
        ));
        assert!(gw.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn recovery_sends_direct_transfer_to_ca_address() -> eyre::Result<()> {
        let gw = RecordingGateway::default();
        let signer = WalletIdentity::generate()?;
        let receipt =
            recover_stuck_transfer(&gw, &descriptor("tDVV"), &signer, &ca(), &elf(5)).await?;
        assert_eq!(receipt.transaction_id, "tx-Transfer");

        let sent = gw.sent();
        let [send] = sent.as_slice() else {
            eyre::bail!("expected one send, got {sent:?}");
        };
        assert_eq!(send.method, TRANSFER);
        assert_eq!(send.contract, "token-tDVV");
        assert_eq!(send.args.get("to"), Some(&json!(ca().ca_address)));
        assert_ne!(send.args.get("to"), Some(&json!(signer.address())));
        assert!(gw.calls().iter().all(|c| c.method != MANAGER_FORWARD_CALL));
        Ok(())
    }
}

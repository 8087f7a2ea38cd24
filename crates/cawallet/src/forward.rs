use crate::{
    chain::{client::ContractGateway, result::SendOutcome},
    chain_info::ChainDescriptor,
    errors::CaError,
    wallet::WalletIdentity,
};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

pub const MANAGER_FORWARD_CALL: &str = "ManagerForwardCall";

/// A call the CA contract makes on the CA wallet's behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardCallRequest {
    pub ca_hash: String,
    pub contract_address: String,
    pub method_name: String,
    #[serde(default)]
    pub args: Value,
}

fn required(field: &'static str, v: &str) -> Result<(), CaError> {
    if v.trim().is_empty() {
        return Err(CaError::RequiredFieldMissing(field));
    }
    Ok(())
}

impl ForwardCallRequest {
    pub fn validate(&self) -> Result<(), CaError> {
        required("caHash", &self.ca_hash)?;
        required("contractAddress", &self.contract_address)?;
        required("methodName", &self.method_name)?;
        if self.args.is_null() {
            return Err(CaError::RequiredFieldMissing("args"));
        }
        Ok(())
    }
}

/// Encode `args` against the target contract on `chain`, then have `signer` submit
/// `ManagerForwardCall` to the chain's CA contract.
///
/// Returns once the forward is MINED. A FAILED forward surfaces as
/// [`CaError::TransactionFailed`] and an unsettled one as [`CaError::NotConfirmed`]. The
/// inner call's own return value is not interpreted.
pub async fn forward_call(
    gateway: &dyn ContractGateway,
    chain: &ChainDescriptor,
    signer: &WalletIdentity,
    req: &ForwardCallRequest,
) -> eyre::Result<SendOutcome> {
    req.validate()?;
    let encoded = gateway
        .encode_args(
            &chain.endpoint,
            &req.contract_address,
            &req.method_name,
            &req.args,
        )
        .await?;
    let envelope = json!({
        "caHash": req.ca_hash,
        "contractAddress": req.contract_address,
        "methodName": req.method_name,
        "args": base64::engine::general_purpose::STANDARD.encode(encoded),
    });
    info!(
        chain_id = %chain.chain_id,
        contract = %req.contract_address,
        method = %req.method_name,
        "forwarding call through CA contract"
    );
    gateway
        .call_send(
            &chain.endpoint,
            &chain.ca_contract_address,
            signer,
            MANAGER_FORWARD_CALL,
            &envelope,
        )
        .await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        chain::{
            address::{decode_address, encode_address},
            client::tests::{client_over, fast_polling, FakeRpc},
            result::{TransactionResult, TxStatus},
            tx::{Address, Hash},
        },
        chain_info::tests::descriptor,
        schema::testutil::ca_descriptor_set,
    };
    use async_trait::async_trait;
    use prost::Message as _;
    use std::{
        collections::{HashMap, VecDeque},
        sync::{Arc, Mutex},
    };

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum CallKind {
        Encode,
        View,
        Send,
    }

    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub kind: CallKind,
        pub endpoint: String,
        pub contract: String,
        pub method: String,
        pub args: Value,
        pub signer: Option<String>,
    }

    /// Records every call. Sends answer from a per-method script (default: MINED with id
    /// `tx-<method>`); views answer from `views`; encoding returns the args' JSON bytes.
    #[derive(Default)]
    pub struct RecordingGateway {
        pub calls: Mutex<Vec<RecordedCall>>,
        pub sends: Mutex<HashMap<String, VecDeque<Result<SendOutcome, CaError>>>>,
        pub views: Mutex<HashMap<String, Value>>,
    }

    pub fn outcome(tx_id: &str, status: &str) -> SendOutcome {
        SendOutcome {
            transaction_id: tx_id.to_owned(),
            result: TransactionResult {
                transaction_id: tx_id.to_owned(),
                status: TxStatus::parse(status),
                error: None,
                block_number: None,
                block_hash: None,
            },
        }
    }

    impl RecordingGateway {
        pub fn script_send(&self, method: &str, result: Result<SendOutcome, CaError>) {
            if let Ok(mut sends) = self.sends.lock() {
                sends.entry(method.to_owned()).or_default().push_back(result);
            }
        }

        pub fn script_view(&self, method: &str, out: Value) {
            if let Ok(mut views) = self.views.lock() {
                views.insert(method.to_owned(), out);
            }
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        pub fn sent(&self) -> Vec<RecordedCall> {
            self.calls()
                .into_iter()
                .filter(|c| c.kind == CallKind::Send)
                .collect()
        }

        fn record(&self, call: RecordedCall) -> eyre::Result<()> {
            self.calls
                .lock()
                .map_err(|e| eyre::eyre!("mutex poisoned: {e}"))?
                .push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl ContractGateway for RecordingGateway {
        async fn encode_args(
            &self,
            endpoint: &str,
            contract: &str,
            method: &str,
            args: &Value,
        ) -> eyre::Result<Vec<u8>> {
            self.record(RecordedCall {
                kind: CallKind::Encode,
                endpoint: endpoint.to_owned(),
                contract: contract.to_owned(),
                method: method.to_owned(),
                args: args.clone(),
                signer: None,
            })?;
            Ok(serde_json::to_vec(args)?)
        }

        async fn call_view(
            &self,
            endpoint: &str,
            contract: &str,
            method: &str,
            args: &Value,
        ) -> eyre::Result<Value> {
            self.record(RecordedCall {
                kind: CallKind::View,
                endpoint: endpoint.to_owned(),
                contract: contract.to_owned(),
                method: method.to_owned(),
                args: args.clone(),
                signer: None,
            })?;
            let views = self
                .views
                .lock()
                .map_err(|e| eyre::eyre!("mutex poisoned: {e}"))?;
            Ok(views.get(method).cloned().unwrap_or(Value::Null))
        }

        async fn call_send(
            &self,
            endpoint: &str,
            contract: &str,
            signer: &WalletIdentity,
            method: &str,
            args: &Value,
        ) -> eyre::Result<SendOutcome> {
            self.record(RecordedCall {
                kind: CallKind::Send,
                endpoint: endpoint.to_owned(),
                contract: contract.to_owned(),
                method: method.to_owned(),
                args: args.clone(),
                signer: Some(signer.address().to_owned()),
            })?;
            let scripted = self
                .sends
                .lock()
                .map_err(|e| eyre::eyre!("mutex poisoned: {e}"))?
                .get_mut(method)
                .and_then(VecDeque::pop_front);
            match scripted {
                Some(r) => Ok(r?),
                None => Ok(outcome(&format!("tx-{method}"), "MINED")),
            }
        }
    }

    fn request() -> ForwardCallRequest {
        ForwardCallRequest {
            ca_hash: "ca-hash".to_owned(),
            contract_address: "token-AELF".to_owned(),
            method_name: "Transfer".to_owned(),
            args: json!({"symbol": "ELF", "amount": 5}),
        }
    }

    #[tokio::test]
    async fn each_missing_field_is_named() -> eyre::Result<()> {
        let cases: [(&str, fn(&mut ForwardCallRequest)); 4] = [
            ("caHash", |r: &mut ForwardCallRequest| r.ca_hash.clear()),
            ("contractAddress", |r: &mut ForwardCallRequest| {
                r.contract_address = "  ".to_owned();
            }),
            ("methodName", |r: &mut ForwardCallRequest| r.method_name.clear()),
            ("args", |r: &mut ForwardCallRequest| r.args = Value::Null),
        ];
        let gw = RecordingGateway::default();
        let signer = WalletIdentity::generate()?;
        for (field, blank) in cases {
            let mut req = request();
            blank(&mut req);
            let err = forward_call(&gw, &descriptor("AELF"), &signer, &req)
                .await
                .err()
                .ok_or_else(|| eyre::eyre!("{field} blank must fail"))?;
            assert_eq!(err.to_string(), format!("{field} is required"));
        }
        assert!(gw.calls().is_empty(), "validation runs before any chain call");
        Ok(())
    }

    #[tokio::test]
    async fn envelope_goes_to_the_ca_contract_with_base64_args() -> eyre::Result<()> {
        let gw = RecordingGateway::default();
        let signer = WalletIdentity::generate()?;
        let chain = descriptor("AELF");
        let out = forward_call(&gw, &chain, &signer, &request()).await?;
        assert_eq!(out.transaction_id, "tx-ManagerForwardCall");

        let calls = gw.calls();
        let [encode, send] = calls.as_slice() else {
            eyre::bail!("expected encode then send, got {calls:?}");
        };
        assert_eq!(encode.kind, CallKind::Encode);
        assert_eq!(encode.contract, "token-AELF");
        assert_eq!(encode.endpoint, chain.endpoint);

        assert_eq!(send.contract, chain.ca_contract_address);
        assert_eq!(send.method, MANAGER_FORWARD_CALL);
        assert_eq!(send.signer.as_deref(), Some(signer.address()));
        let expected_args = base64::engine::general_purpose::STANDARD
            .encode(serde_json::to_vec(&request().args)?);
        assert_eq!(
            send.args,
            json!({
                "caHash": "ca-hash",
                "contractAddress": "token-AELF",
                "methodName": "Transfer",
                "args": expected_args,
            })
        );
        Ok(())
    }

    fn forwarding_chain() -> ChainDescriptor {
        ChainDescriptor {
            chain_id: "AELF".to_owned(),
            endpoint: "http://aelf.node".to_owned(),
            ca_contract_address: encode_address(&[3_u8; 32]),
            token_contract_address: encode_address(&[4_u8; 32]),
        }
    }

    fn node_publishing_ca_schema(
        chain: &ChainDescriptor,
        results: Vec<Value>,
    ) -> eyre::Result<Arc<FakeRpc>> {
        let rpc = Arc::new(FakeRpc::with_results(results));
        rpc.descriptors
            .lock()
            .map_err(|e| eyre::eyre!("mutex poisoned: {e}"))?
            .insert(chain.ca_contract_address.clone(), ca_descriptor_set());
        Ok(rpc)
    }

    /// `ManagerForwardCallInput` as the CA contract numbers it.
    #[derive(Clone, PartialEq, Eq, prost::Message)]
    struct ForwardEnvelope {
        #[prost(message, optional, tag = "1")]
        ca_hash: Option<Hash>,
        #[prost(message, optional, tag = "2")]
        contract_address: Option<Address>,
        #[prost(string, tag = "3")]
        method_name: String,
        #[prost(bytes = "vec", tag = "4")]
        args: Vec<u8>,
    }

    #[derive(Clone, PartialEq, Eq, prost::Message)]
    struct TokenTransfer {
        #[prost(message, optional, tag = "1")]
        to: Option<Address>,
        #[prost(string, tag = "2")]
        symbol: String,
        #[prost(int64, tag = "3")]
        amount: i64,
        #[prost(string, tag = "4")]
        memo: String,
    }

    #[tokio::test]
    async fn submitted_params_decode_to_the_forward_envelope() -> eyre::Result<()> {
        let chain = forwarding_chain();
        let rpc = node_publishing_ca_schema(&chain, vec![])?;
        let (client, _) = client_over(Arc::clone(&rpc), fast_polling(1))?;
        let signer = WalletIdentity::generate()?;
        let recipient = encode_address(&[9_u8; 32]);
        let req = ForwardCallRequest {
            ca_hash: "ab".repeat(32),
            contract_address: chain.token_contract_address.clone(),
            method_name: "Transfer".to_owned(),
            args: json!({"to": recipient, "symbol": "ELF", "amount": 5, "memo": "rent"}),
        };
        let out = forward_call(&client, &chain, &signer, &req).await?;

        let sent = rpc
            .sent
            .lock()
            .map_err(|e| eyre::eyre!("mutex poisoned: {e}"))?
            .clone();
        let [tx] = sent.as_slice() else {
            eyre::bail!("expected one submitted transaction, got {}", sent.len());
        };
        assert_eq!(tx.method_name, MANAGER_FORWARD_CALL);
        assert_eq!(
            tx.to.as_ref().map(|a| a.value.clone()),
            Some(decode_address(&chain.ca_contract_address)?)
        );
        assert_eq!(tx.id(), out.transaction_id);

        let envelope = ForwardEnvelope::decode(tx.params.as_slice())?;
        assert_eq!(
            envelope.ca_hash.map(|h| h.value),
            Some(hex::decode("ab".repeat(32))?)
        );
        assert_eq!(
            envelope.contract_address.map(|a| a.value),
            Some(decode_address(&chain.token_contract_address)?)
        );
        assert_eq!(envelope.method_name, "Transfer");

        let inner = TokenTransfer::decode(envelope.args.as_slice())?;
        assert_eq!(
            inner,
            TokenTransfer {
                to: Some(Address {
                    value: decode_address(&recipient)?,
                }),
                symbol: "ELF".to_owned(),
                amount: 5,
                memo: "rent".to_owned(),
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_forward_is_raised_with_the_chain_error() -> eyre::Result<()> {
        let chain = forwarding_chain();
        let rpc = node_publishing_ca_schema(
            &chain,
            vec![json!({"Status": "FAILED", "Error": "Insufficient allowance"})],
        )?;
        let (client, _) = client_over(rpc, fast_polling(3))?;
        let req = ForwardCallRequest {
            ca_hash: "ab".repeat(32),
            contract_address: chain.token_contract_address.clone(),
            method_name: "Transfer".to_owned(),
            args: json!({"symbol": "ELF", "amount": 1}),
        };
        let err = forward_call(&client, &chain, &WalletIdentity::generate()?, &req)
            .await
            .err()
            .ok_or_else(|| eyre::eyre!("FAILED forward must not succeed"))?;
        match err.downcast_ref::<CaError>() {
            Some(CaError::TransactionFailed { error, .. }) => {
                assert_eq!(error, "Insufficient allowance");
            }
            other => eyre::bail!("unexpected error: {other:?}"),
        }
        Ok(())
    }
}

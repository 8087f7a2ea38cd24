use super::{ChainRpc, ChainStatus};
use crate::errors::CaError;
use async_trait::async_trait;
use base64::Engine as _;
use eyre::Context as _;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A chain node's REST API (`/api/blockChain/*`).
#[derive(Debug, Clone)]
pub struct HttpChainRpc {
    endpoint: String,
    http: Client,
}

impl HttpChainRpc {
    pub fn new(endpoint: &str, timeout: Duration) -> eyre::Result<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/').to_owned();
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(CaError::InvalidArgument(format!(
                "chain endpoint must be an http(s) url: {endpoint}"
            ))
            .into());
        }
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("build http client")?;
        Ok(Self { endpoint, http })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/blockChain/{path}", self.endpoint)
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> eyre::Result<Value> {
        let resp = self
            .http
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .with_context(|| format!("chain {path} request"))?
            .error_for_status()
            .with_context(|| format!("chain {path} status"))?;
        resp.json::<Value>()
            .await
            .with_context(|| format!("chain {path} json"))
    }
}

/// Pull `Error.Message` (and `Error.Details`) out of a node error body.
fn node_error_message(body: &Value) -> Option<String> {
    let err = body.get("Error")?;
    let msg = err.get("Message").and_then(Value::as_str).unwrap_or("");
    let details = err.get("Details").and_then(Value::as_str).unwrap_or("");
    let joined = match (msg.is_empty(), details.is_empty()) {
        (true, true) => return None,
        (false, true) => msg.to_owned(),
        (true, false) => details.to_owned(),
        (false, false) => format!("{msg}: {details}"),
    };
    Some(joined)
}

async fn read_body(resp: Response) -> eyre::Result<(u16, Value)> {
    let status = resp.status().as_u16();
    let text = resp.text().await.context("read chain response body")?;
    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
    Ok((status, body))
}

#[async_trait]
impl ChainRpc for HttpChainRpc {
    async fn chain_status(&self) -> eyre::Result<ChainStatus> {
        let v = self.get_json("chainStatus", &[]).await?;
        serde_json::from_value(v).context("parse chainStatus")
    }

    async fn contract_descriptor_set(&self, contract: &str) -> eyre::Result<Vec<u8>> {
        let v = self
            .get_json("contractFileDescriptorSet", &[("address", contract)])
            .await?;
        let b64 = v
            .as_str()
            .ok_or_else(|| eyre::eyre!("contractFileDescriptorSet: expected base64 string"))?;
        base64::engine::general_purpose::STANDARD
            .decode(b64)
            .context("decode contract descriptor set")
    }

    async fn execute_transaction(&self, raw_tx_hex: &str) -> eyre::Result<Vec<u8>> {
        let resp = self
            .http
            .post(self.url("executeTransaction"))
            .json(&json!({ "RawTransaction": raw_tx_hex }))
            .send()
            .await
            .context("chain executeTransaction request")?;
        let (status, body) = read_body(resp).await?;
        if !(200..300).contains(&status) {
            let msg = node_error_message(&body).unwrap_or_else(|| format!("http {status}: {body}"));
            return Err(CaError::ViewCallError(msg).into());
        }
        let out = body.as_str().ok_or_else(|| {
            CaError::ViewCallError(format!("unexpected executeTransaction body: {body}"))
        })?;
        hex::decode(out.trim()).context("decode executeTransaction output")
    }

    async fn send_transaction(&self, raw_tx_hex: &str) -> eyre::Result<Value> {
        let resp = self
            .http
            .post(self.url("sendTransaction"))
            .json(&json!({ "RawTransaction": raw_tx_hex }))
            .send()
            .await
            .context("chain sendTransaction request")?;
        let (status, body) = read_body(resp).await?;
        if !(200..300).contains(&status) {
            let msg = node_error_message(&body).unwrap_or_else(|| body.to_string());
            eyre::bail!("chain sendTransaction rejected (http {status}): {msg}");
        }
        Ok(body)
    }

    async fn transaction_result(&self, tx_id: &str) -> eyre::Result<Value> {
        self.get_json("transactionResult", &[("transactionId", tx_id)])
            .await
    }
}

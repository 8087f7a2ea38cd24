use crate::errors::CaError;
use eyre::Context as _;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON client for the wallet backend's REST API. Non-2xx responses become
/// [`CaError::Api`] so callers can tell "not found" from other failures.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> eyre::Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(CaError::InvalidArgument(format!(
                "api base url must be an http(s) url: {base_url}"
            ))
            .into());
        }
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("build http client")?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> eyre::Result<Value> {
        let resp = self
            .http
            .get(self.url(path))
            .query(params)
            .send()
            .await
            .with_context(|| format!("api GET {path}"))?;
        parse_response(path, resp).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> eyre::Result<Value> {
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("api POST {path}"))?;
        parse_response(path, resp).await
    }
}

async fn parse_response(path: &str, resp: Response) -> eyre::Result<Value> {
    let status = resp.status().as_u16();
    let text = resp
        .text()
        .await
        .with_context(|| format!("read api {path} body"))?;
    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
    if !(200..300).contains(&status) {
        return Err(api_error(status, &body).into());
    }
    Ok(body)
}

/// Accepts `{error: {code, message}}` and flat `{code, message}` bodies.
pub fn api_error(status: u16, body: &Value) -> CaError {
    let inner = body.get("error").filter(|e| e.is_object()).unwrap_or(body);
    let code = inner.get("code").and_then(|c| match c {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(_) | Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => {
            None
        }
    });
    let message = inner
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .or_else(|| body.as_str().map(str::to_owned))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("http {status}"));
    CaError::Api {
        status,
        code,
        message,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use tokio::{
        io::{AsyncReadExt as _, AsyncWriteExt as _},
        net::TcpListener,
    };

    /// Serves one canned HTTP response per connection, forever.
    pub async fn canned_server(status_line: &'static str, body: String) -> eyre::Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                read_request(&mut sock).await;
                let resp = format!(
                    "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _written = sock.write_all(resp.as_bytes()).await;
                let _shutdown = sock.shutdown().await;
            }
        });
        Ok(format!("http://{addr}"))
    }

    async fn read_request(sock: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0_u8; 4096];
        loop {
            let Ok(n) = sock.read(&mut chunk).await else {
                return;
            };
            if n == 0 {
                return;
            }
            buf.extend_from_slice(chunk.get(..n).unwrap_or_default());
            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + content_length {
                    return;
                }
            }
        }
    }

    #[test]
    fn nested_error_body_carries_upstream_code() -> eyre::Result<()> {
        let e = api_error(
            404,
            &json!({"error": {"code": "3002", "message": "holder not exist"}}),
        );
        assert!(e.is_not_found());
        match e {
            CaError::Api { code, message, .. } => {
                assert_eq!(code.as_deref(), Some("3002"));
                assert_eq!(message, "holder not exist");
            }
            other => eyre::bail!("unexpected error: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn plain_text_body_is_the_message() -> eyre::Result<()> {
        match api_error(502, &Value::String("bad gateway".to_owned())) {
            CaError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 502);
                assert!(code.is_none());
                assert_eq!(message, "bad gateway");
            }
            other => eyre::bail!("unexpected error: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn non_2xx_is_structured_api_error() -> eyre::Result<()> {
        let url = canned_server(
            "404 Not Found",
            json!({"error": {"code": 3002, "message": "nope"}}).to_string(),
        )
        .await?;
        let api = ApiClient::new(&url, Duration::from_secs(5))?;
        let err = api
            .get("/api/app/account/guardianIdentifiers", &[("caHash", "x")])
            .await
            .err()
            .ok_or_else(|| eyre::eyre!("expected failure"))?;
        let ce = err
            .downcast_ref::<CaError>()
            .ok_or_else(|| eyre::eyre!("expected CaError, got {err:#}"))?;
        assert!(ce.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn success_returns_parsed_json() -> eyre::Result<()> {
        let url = canned_server("200 OK", json!({"items": [1, 2]}).to_string()).await?;
        let api = ApiClient::new(&format!("{url}/"), Duration::from_secs(5))?;
        let v = api.post("api/echo", &json!({"a": 1})).await?;
        assert_eq!(v.get("items"), Some(&json!([1, 2])));
        Ok(())
    }
}

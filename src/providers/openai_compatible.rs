use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::conversation::ToolCall;
use crate::providers::UpstreamError;
use crate::utils::truncate_str;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Total timeout for buffered calls. Streaming calls deliberately carry no
/// total timeout — it would sever long SSE relays mid-stream.
const BUFFERED_TIMEOUT: Duration = Duration::from_secs(120);

/// One parsed assistant turn from a buffered upstream call, plus the raw
/// response body so the final turn can be relayed to the client verbatim.
#[derive(Debug, Clone)]
pub struct BufferedTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub raw: Value,
}

type RelayBody =
    Pin<Box<dyn Stream<Item = Result<Bytes, Box<dyn std::error::Error + Send + Sync>>> + Send>>;

/// A streaming upstream response: status and headers for the adapter to
/// rewrite, and the body as an opaque byte stream. SSE frames are never
/// parsed — the bytes are relayed unchanged.
pub struct UpstreamStream {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: RelayBody,
}

/// Seam between the reasoning loop and the LLM endpoint. The production
/// implementation is `UpstreamClient`; tests script turns with a mock.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// One buffered (`stream:false`) chat-completions call.
    async fn chat(
        &self,
        model: &str,
        messages: &[Value],
        tools: &[Value],
        temperature: Option<f64>,
    ) -> anyhow::Result<BufferedTurn>;

    /// One streaming (`stream:true`) call, no tools advertised. Used only for
    /// the final turn handed back to a streaming client.
    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Value],
        temperature: Option<f64>,
    ) -> anyhow::Result<UpstreamStream>;
}

/// Startup check on the upstream base URL: the bearer key rides on every
/// request, so remote upstreams must be https. Plain http is tolerated only
/// when the host is loopback (a local LLM server).
fn validate_base_url(base_url: &str) -> Result<(), String> {
    let parsed = reqwest::Url::parse(base_url)
        .map_err(|e| format!("Invalid upstream base URL '{}': {}", base_url, e))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" if is_loopback_host(&parsed) => {
            warn!(
                url = base_url,
                "Upstream uses plain HTTP; the API key is sent in cleartext to this local server"
            );
            Ok(())
        }
        "http" => Err(format!(
            "Refusing plain HTTP for non-local upstream '{}'; use https:// (http is only accepted for loopback hosts)",
            base_url
        )),
        other => Err(format!(
            "Upstream base URL '{}' must be http or https, got '{}'",
            base_url, other
        )),
    }
}

/// Whether the URL's host is `localhost` or a loopback address. Parses the
/// host as an IP so the whole 127.0.0.0/8 range and `::1` qualify, not just
/// the literal spellings.
fn is_loopback_host(url: &reqwest::Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    // IPv6 hosts serialize in brackets.
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    bare.parse::<std::net::IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

pub struct UpstreamClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl UpstreamClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, String> {
        validate_base_url(base_url)?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request_body(
        model: &str,
        messages: &[Value],
        tools: &[Value],
        temperature: Option<f64>,
        stream: bool,
    ) -> Value {
        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        if let Some(t) = temperature {
            body["temperature"] = json!(t);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    /// Extract `choices[0].message` from a buffered response body.
    fn parse_buffered(raw: Value) -> Result<BufferedTurn, UpstreamError> {
        let message = raw
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| UpstreamError::malformed("no choices[0].message"))?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .map(|s| s.to_string());

        let tool_calls = match message.get("tool_calls") {
            Some(Value::Array(calls)) => serde_json::from_value::<Vec<ToolCall>>(Value::Array(
                calls.clone(),
            ))
            .map_err(|e| UpstreamError::malformed(&format!("bad tool_calls: {}", e)))?,
            _ => Vec::new(),
        };

        Ok(BufferedTurn {
            content,
            tool_calls,
            raw,
        })
    }
}

#[async_trait]
impl ChatBackend for UpstreamClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[Value],
        tools: &[Value],
        temperature: Option<f64>,
    ) -> anyhow::Result<BufferedTurn> {
        let body = Self::build_request_body(model, messages, tools, temperature, false);
        let url = self.completions_url();
        info!(model, url = %url, tools = tools.len(), "Calling upstream LLM (buffered)");

        let resp = self
            .client
            .post(&url)
            .timeout(BUFFERED_TIMEOUT)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Upstream request failed: {}", e);
                UpstreamError::network(&e)
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| UpstreamError::network(&e))?;

        if !status.is_success() {
            error!(status = %status, "Upstream API error: {}", truncate_str(&text, 2000));
            return Err(UpstreamError::from_status(status.as_u16(), &text).into());
        }
        debug!("Upstream response: {}", truncate_str(&text, 2000));

        let raw: Value = serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse upstream response JSON: {}", e);
            UpstreamError::malformed(&format!("JSON parse error: {}", e))
        })?;
        Ok(Self::parse_buffered(raw)?)
    }

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Value],
        temperature: Option<f64>,
    ) -> anyhow::Result<UpstreamStream> {
        let body = Self::build_request_body(model, messages, &[], temperature, true);
        let url = self.completions_url();
        info!(model, url = %url, "Calling upstream LLM (streaming)");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Upstream streaming request failed: {}", e);
                UpstreamError::network(&e)
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .map_err(|e| UpstreamError::network(&e))?;
            error!(status = %status, "Upstream streaming error: {}", truncate_str(&text, 2000));
            return Err(UpstreamError::from_status(status.as_u16(), &text).into());
        }

        let headers = resp.headers().clone();
        let body = resp
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            })
            .boxed();

        Ok(UpstreamStream {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

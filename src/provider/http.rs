//! HTTP transport for the Responses endpoint: bearer auth, status mapping
//! and SSE framing.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use serde_json::Value;

use super::transport::{AsyncTransport, RawEventIter, RawEventStream, Transport};
use crate::config::TesseraConfig;
use crate::error::{Result, TesseraError};
use crate::util::RetryPolicy;

#[cfg(feature = "openai")]
use super::openai::{DEFAULT_BASE_URL, PROVIDER_NAME};

#[cfg(not(feature = "openai"))]
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
#[cfg(not(feature = "openai"))]
const PROVIDER_NAME: &str = "openai";

struct BlockingRuntime {
    runtime: Arc<tokio::runtime::Runtime>,
    client: reqwest::Client,
}

/// reqwest-backed transport speaking to `{base_url}/responses`.
///
/// The async side runs on the caller's runtime. The blocking side lazily
/// builds a private current-thread runtime and must not be called from
/// inside an async context.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    organization: Option<String>,
    project: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
    blocking: OnceLock<std::result::Result<BlockingRuntime, String>>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let timeout = crate::config::DEFAULT_TIMEOUT;
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            organization: None,
            project: None,
            timeout,
            retry: RetryPolicy::default(),
            blocking: OnceLock::new(),
        })
    }

    /// Build from configuration; fails when no API key is configured.
    pub fn from_config(config: &TesseraConfig) -> Result<Self> {
        let api_key = config.require_api_key(PROVIDER_NAME)?;
        let base_url = config
            .get_base_url(PROVIDER_NAME)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut transport = Self::with_base_url(api_key, base_url)?;
        transport.organization = config.organization.clone();
        transport.project = config.project.clone();
        transport.retry = RetryPolicy::with_max_retries(config.max_retries);
        if config.timeout != transport.timeout {
            transport.client = build_client(config.timeout)?;
            transport.timeout = config.timeout;
        }
        Ok(transport)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.base_url)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| TesseraError::Configuration("API key is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, bearer);
        for (name, value) in [
            ("openai-organization", &self.organization),
            ("openai-project", &self.project),
        ] {
            if let Some(value) = value {
                let value = HeaderValue::from_str(value).map_err(|_| {
                    TesseraError::Configuration(format!("{name} is not a valid header value"))
                })?;
                headers.insert(name, value);
            }
        }
        Ok(headers)
    }

    async fn post(&self, client: &reqwest::Client, body: &Value) -> Result<reqwest::Response> {
        let resp = client
            .post(self.endpoint())
            .headers(self.headers()?)
            .json(body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(|secs| (secs * 1000.0) as u64);
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text, retry_after));
        }
        Ok(resp)
    }

    async fn send_with(&self, client: &reqwest::Client, body: &Value) -> Result<Value> {
        tracing::debug!(url = %self.endpoint(), "sending responses request");
        self.retry
            .execute(|| async {
                let resp = self.post(client, body).await?;
                resp.json::<Value>()
                    .await
                    .map_err(|e| map_reqwest_error(e, self.timeout))
            })
            .await
    }

    async fn open_stream_with(&self, client: &reqwest::Client, body: &Value) -> Result<RawEventStream> {
        tracing::debug!(url = %self.endpoint(), "opening responses stream");
        let resp = self.retry.execute(|| self.post(client, body)).await?;
        if let Some(content_type) = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !content_type.starts_with("text/event-stream") {
                return Err(TesseraError::Stream(format!(
                    "expected an event stream, got content-type '{content_type}'"
                )));
            }
        }
        let timeout = self.timeout;
        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::default();
            futures::pin_mut!(byte_stream);

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(map_reqwest_error(e, timeout));
                        return;
                    }
                };
                for record in decoder.push(&chunk) {
                    yield record;
                }
                if decoder.is_done() {
                    return;
                }
            }
            for record in decoder.finish() {
                yield record;
            }
        };
        Ok(Box::pin(stream))
    }

    fn blocking_runtime(&self) -> Result<&BlockingRuntime> {
        let slot = self.blocking.get_or_init(|| {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| format!("failed to start blocking runtime: {e}"))?;
            let client = build_client(self.timeout).map_err(|e| e.to_string())?;
            Ok(BlockingRuntime {
                runtime: Arc::new(runtime),
                client,
            })
        });
        slot.as_ref()
            .map_err(|message| TesseraError::Configuration(message.clone()))
    }
}

#[async_trait]
impl AsyncTransport for HttpTransport {
    async fn send(&self, body: &Value) -> Result<Value> {
        self.send_with(&self.client, body).await
    }

    async fn open_stream(&self, body: &Value) -> Result<RawEventStream> {
        self.open_stream_with(&self.client, body).await
    }
}

impl Transport for HttpTransport {
    fn send(&self, body: &Value) -> Result<Value> {
        let blocking = self.blocking_runtime()?;
        blocking
            .runtime
            .block_on(self.send_with(&blocking.client, body))
    }

    fn open_stream(&self, body: &Value) -> Result<RawEventIter> {
        let blocking = self.blocking_runtime()?;
        let stream = blocking
            .runtime
            .block_on(self.open_stream_with(&blocking.client, body))?;
        Ok(Box::new(BlockingEvents {
            runtime: Arc::clone(&blocking.runtime),
            stream,
        }))
    }
}

/// Drives an async event stream from blocking code.
struct BlockingEvents {
    runtime: Arc<tokio::runtime::Runtime>,
    stream: RawEventStream,
}

impl Iterator for BlockingEvents {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.stream.next())
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| TesseraError::Configuration(format!("failed to build HTTP client: {e}")))
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> TesseraError {
    if err.is_timeout() {
        TesseraError::Timeout(timeout.as_millis() as u64)
    } else if err.is_connect() {
        TesseraError::Connection(err.to_string())
    } else if err.is_decode() {
        TesseraError::parsing(format!("undecodable response body: {err}"), None)
    } else {
        TesseraError::Network(err)
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
pub fn status_to_error(status: u16, body: &str, retry_after_ms: Option<u64>) -> TesseraError {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());

    match status {
        401 | 403 => TesseraError::Authentication(message),
        429 => TesseraError::RateLimited {
            retry_after_ms: retry_after_ms.or_else(|| parsed.as_ref().and_then(body_retry_after)),
        },
        400 | 404 | 422 => TesseraError::InvalidRequest(message),
        _ => TesseraError::Api { status, message },
    }
}

fn body_retry_after(body: &Value) -> Option<u64> {
    body.get("error")?
        .get("retry_after")?
        .as_f64()
        .map(|s| (s * 1000.0) as u64)
}

/// Incremental Server-Sent Events decoder yielding one JSON value per record.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    /// Undecoded bytes; a line is only decoded once its `\n` has arrived.
    buffer: Vec<u8>,
    data: Vec<String>,
    done: bool,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<Result<Value>> {
        self.buffer.extend_from_slice(chunk);
        let mut records = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            if let Some(record) = self.line(line.trim_end_matches(['\n', '\r'])) {
                records.push(record);
            }
            if self.done {
                break;
            }
        }
        records
    }

    /// Flush a final record not terminated by a blank line.
    pub(crate) fn finish(&mut self) -> Vec<Result<Value>> {
        let mut records = Vec::new();
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw);
            if let Some(record) = self.line(line.trim_end_matches('\r')) {
                records.push(record);
            }
        }
        if let Some(record) = self.dispatch() {
            records.push(record);
        }
        records
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    fn line(&mut self, line: &str) -> Option<Result<Value>> {
        if self.done {
            return None;
        }
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(data) = line.strip_prefix("data:") {
            self.data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
        // `event:`, `id:` and `retry:` carry nothing the JSON payload lacks.
        None
    }

    fn dispatch(&mut self) -> Option<Result<Value>> {
        if self.data.is_empty() {
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        if data == "[DONE]" {
            self.done = true;
            return None;
        }
        Some(serde_json::from_str::<Value>(&data).map_err(|e| TesseraError::Parsing {
            message: format!("undecodable stream record: {e}"),
            raw: Some(Value::String(data)),
            source: Some(e),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ok_values(records: Vec<Result<Value>>) -> Vec<Value> {
        records.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn decodes_records_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        let mut out = decoder.push("event: response.created\ndata: {\"type\":\"respo".as_bytes());
        assert!(out.is_empty());
        out.extend(decoder.push("nse.created\"}\n\ndata: {\"type\":\"x\"}\r\n\r\n".as_bytes()));
        assert_eq!(
            ok_values(out),
            vec![json!({"type": "response.created"}), json!({"type": "x"})]
        );
    }

    #[test]
    fn multibyte_characters_split_across_chunks_survive() {
        let record = "data: {\"delta\":\"café\"}\n\n".as_bytes();
        let split = record.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&record[..split]).is_empty());
        let out = ok_values(decoder.push(&record[split..]));
        assert_eq!(out, vec![json!({"delta": "café"})]);
    }

    #[test]
    fn comments_are_ignored_and_done_stops() {
        let mut decoder = SseDecoder::default();
        let out = decoder.push(": keep-alive\n\ndata: {\"a\":1}\n\ndata: [DONE]\n\ndata: {\"b\":2}\n\n".as_bytes());
        assert_eq!(ok_values(out), vec![json!({"a": 1})]);
        assert!(decoder.is_done());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn unterminated_final_record_is_flushed() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push("data: {\"a\":1}".as_bytes()).is_empty());
        assert_eq!(ok_values(decoder.finish()), vec![json!({"a": 1})]);
    }

    #[test]
    fn undecodable_record_is_a_parsing_error() {
        let mut decoder = SseDecoder::default();
        let out = decoder.push("data: {nope\n\n".as_bytes());
        assert!(matches!(
            out.as_slice(),
            [Err(TesseraError::Parsing { raw: Some(_), .. })]
        ));
    }

    #[test]
    fn statuses_map_to_taxonomy() {
        let body = r#"{"error":{"message":"bad key"}}"#;
        assert!(matches!(
            status_to_error(401, body, None),
            TesseraError::Authentication(m) if m == "bad key"
        ));
        assert!(matches!(
            status_to_error(429, "{}", Some(1500)),
            TesseraError::RateLimited { retry_after_ms: Some(1500) }
        ));
        assert!(matches!(
            status_to_error(429, r#"{"error":{"retry_after":2}}"#, None),
            TesseraError::RateLimited { retry_after_ms: Some(2000) }
        ));
        assert!(matches!(
            status_to_error(400, "plain text", None),
            TesseraError::InvalidRequest(m) if m == "plain text"
        ));
        assert!(matches!(
            status_to_error(503, "", None),
            TesseraError::Api { status: 503, .. }
        ));
    }

    #[test]
    fn from_config_requires_a_key() {
        let config = TesseraConfig::new();
        assert!(matches!(
            HttpTransport::from_config(&config),
            Err(TesseraError::Authentication(_))
        ));
        config.set_api_key("openai", "sk-test");
        config.set_base_url("openai", "http://localhost:9999/v1/");
        let transport = HttpTransport::from_config(&config).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:9999/v1");
        assert_eq!(transport.endpoint(), "http://localhost:9999/v1/responses");
    }
}

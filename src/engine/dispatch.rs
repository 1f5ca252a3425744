// Upstream transport and the prod/daily endpoint fallback walk.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::GenerationResult;

use super::normalize::{normalize_buffered, normalize_stream};

const PROD_ENDPOINT: &str = "https://cloudcode-pa.googleapis.com/v1internal";
const DAILY_ENDPOINT: &str = "https://daily-cloudcode-pa.sandbox.googleapis.com/v1internal";

const USER_AGENT: &str = "antigravity/1.11.9 windows/amd64";

pub struct UpstreamReply {
    pub status: u16,
    pub body: String,
}

/// Transport seam: one authenticated POST, body already serialized by the
/// caller. `sse` asks for the whole event stream collected into the reply
/// body.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        access_token: &str,
        body: &Value,
        sse: bool,
    ) -> AppResult<UpstreamReply>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(20))
            .timeout(std::time::Duration::from_secs(600))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .tcp_keepalive(std::time::Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamTransport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        access_token: &str,
        body: &Value,
        sse: bool,
    ) -> AppResult<UpstreamReply> {
        let mut request = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(body);
        if sse {
            request = request.header("Accept", "text/event-stream");
        }
        let response = request.send().await?;
        let status = response.status().as_u16();

        let body = if sse && (200..300).contains(&status) {
            let mut collected = bytes::BytesMut::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                collected.extend_from_slice(&chunk?);
            }
            String::from_utf8_lossy(&collected).into_owned()
        } else {
            response.text().await?
        };

        Ok(UpstreamReply { status, body })
    }
}

fn build_url(base: &str, method: &str, query: Option<&str>) -> String {
    match query {
        Some(q) => format!("{}:{}?{}", base, method, q),
        None => format!("{}:{}", base, method),
    }
}

/// Walks the endpoint list in order. Retryable failures (429, 5xx, transport
/// errors) move on to the next endpoint; any other non-2xx aborts the walk.
pub struct Dispatcher<T> {
    transport: T,
    endpoints: Vec<String>,
}

impl<T: UpstreamTransport> Dispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            endpoints: vec![PROD_ENDPOINT.to_string(), DAILY_ENDPOINT.to_string()],
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends one generation payload. Thinking-capable models stream and get
    /// the stream collapsed; everything else goes buffered.
    pub async fn dispatch(
        &self,
        access_token: &str,
        payload: &Value,
        model: &str,
        thinking_model: bool,
    ) -> AppResult<GenerationResult> {
        let (method, query, sse) = if thinking_model {
            ("streamGenerateContent", Some("alt=sse"), true)
        } else {
            ("generateContent", None, false)
        };

        let reply = self
            .post_with_fallback(method, query, sse, access_token, payload)
            .await?;
        if sse {
            Ok(normalize_stream(model, &reply.body))
        } else {
            normalize_buffered(model, &reply.body)
        }
    }

    /// Raw model catalog from `fetchAvailableModels`, same fallback walk.
    pub async fn fetch_available_models(&self, access_token: &str) -> AppResult<Value> {
        let reply = self
            .post_with_fallback("fetchAvailableModels", None, false, access_token, &json!({}))
            .await?;
        serde_json::from_str(&reply.body)
            .map_err(|e| AppError::Parse(format!("model list is not JSON: {}", e)))
    }

    async fn post_with_fallback(
        &self,
        method: &str,
        query: Option<&str>,
        sse: bool,
        access_token: &str,
        payload: &Value,
    ) -> AppResult<UpstreamReply> {
        let mut last_error: Option<AppError> = None;
        for base in &self.endpoints {
            let url = build_url(base, method, query);
            match self.transport.post(&url, access_token, payload, sse).await {
                Ok(reply) if (200..300).contains(&reply.status) => return Ok(reply),
                Ok(reply) if AppError::retryable_status(reply.status) => {
                    tracing::warn!("{} returned {}, trying next endpoint", base, reply.status);
                    last_error = Some(AppError::UpstreamRetryable(format!(
                        "{} -> {}: {}",
                        base, reply.status, reply.body
                    )));
                }
                Ok(reply) => {
                    return Err(AppError::UpstreamClient {
                        status: reply.status,
                        body: reply.body,
                    });
                }
                Err(e) => {
                    tracing::warn!("{} unreachable: {}, trying next endpoint", base, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| AppError::UpstreamRetryable("all endpoints failed".into())))
    }
}

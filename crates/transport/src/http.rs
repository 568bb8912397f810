//! HTTP transport: the real API over `ureq`.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` to avoid
//! blocking the async runtime. Request bodies are streamed through a
//! counting reader so progress can be reported per chunk and a cancelled
//! transfer stops at the next chunk boundary.

use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::TransportError;
use crate::request::{ApiRequest, ApiResponse, CancelToken, Method, ProgressFn, SendOptions};
use crate::traits::ApiTransport;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default size of one body chunk handed to the socket.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Largest response body accepted (CSV exports can be large).
const MAX_RESPONSE_BYTES: u64 = 64 * 1024 * 1024;

/// Transport that talks to the API over HTTP.
///
/// - every request carries the session cookie when one is configured
/// - every request fails with [`TransportError::Timeout`] after `timeout`
/// - non-2xx statuses are returned as responses, not errors
#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    session_cookie: Option<String>,
    timeout: Duration,
    chunk_size: usize,
    agent: ureq::Agent,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("session_cookie", &self.session_cookie.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        HttpTransport {
            base_url: base_url.trim_end_matches('/').to_string(),
            session_cookie: None,
            timeout,
            chunk_size: DEFAULT_CHUNK_SIZE,
            agent: build_agent(timeout),
        }
    }

    /// Attach a session cookie (`name=value`) to every request.
    pub fn session_cookie(mut self, cookie: impl Into<String>) -> Self {
        let cookie = cookie.into();
        self.session_cookie = if cookie.trim().is_empty() {
            None
        } else {
            Some(cookie)
        };
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url_for(&self, request: &ApiRequest) -> String {
        format!("{}{}", self.base_url, request.target())
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    ureq::Agent::new_with_config(config)
}

/// Sets the cancel flag if the owning future is dropped mid-transfer.
struct CancelOnDrop {
    token: CancelToken,
    armed: bool,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.token.cancel();
        }
    }
}

/// Reader over a request body that reports progress and honours cancellation.
struct ProgressReader {
    data: Vec<u8>,
    pos: usize,
    chunk_size: usize,
    progress: Option<ProgressFn>,
    cancel: CancelToken,
}

impl Read for ProgressReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(std::io::Error::other("transfer cancelled"));
        }
        let remaining = self.data.len() - self.pos;
        let n = remaining.min(buf.len()).min(self.chunk_size);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        if n > 0 {
            if let Some(progress) = &self.progress {
                progress(self.pos as u64, self.data.len() as u64);
            }
        }
        Ok(n)
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn send_with(
        &self,
        request: ApiRequest,
        options: SendOptions,
    ) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(&request);
        let body = request.body.encode()?;
        let cancel = options.cancel.clone().unwrap_or_default();
        let mut guard = CancelOnDrop {
            token: cancel.clone(),
            armed: true,
        };

        debug!(method = %request.method, url = %url, "sending request");

        let agent = self.agent.clone();
        let cookie = self.session_cookie.clone();
        let timeout = self.timeout;
        let chunk_size = self.chunk_size;
        let method = request.method;
        let progress = options.progress.clone();
        let task_url = url.clone();

        let result = tokio::task::spawn_blocking(move || {
            let url = task_url;
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            let response = match (method, body) {
                (Method::Get, _) => with_headers(agent.get(&url), cookie.as_deref(), None).call(),
                (Method::Delete, _) => {
                    with_headers(agent.delete(&url), cookie.as_deref(), None).call()
                }
                (method, body) => {
                    let builder = match method {
                        Method::Put => agent.put(&url),
                        Method::Patch => agent.patch(&url),
                        _ => agent.post(&url),
                    };
                    let (content_type, data) =
                        body.unwrap_or_else(|| ("application/json".to_string(), Vec::new()));
                    let mut reader = ProgressReader {
                        data,
                        pos: 0,
                        chunk_size,
                        progress,
                        cancel: cancel.clone(),
                    };
                    with_headers(builder, cookie.as_deref(), Some(&content_type))
                        .send(ureq::SendBody::from_reader(&mut reader))
                }
            }
            .map_err(|e| classify_error(e, &url, timeout, &cancel))?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
                })
                .collect();
            let body = response
                .into_body()
                .with_config()
                .limit(MAX_RESPONSE_BYTES)
                .read_to_vec()
                .map_err(|e| classify_error(e, &url, timeout, &cancel))?;

            Ok(ApiResponse {
                status,
                headers,
                body,
            })
        })
        .await
        .map_err(|e| TransportError::Io(format!("task join error: {}", e)))?;

        guard.armed = false;

        if let Ok(response) = &result {
            debug!(url = %url, status = response.status, bytes = response.body.len(), "response received");
        }
        result
    }

    fn transport_id(&self) -> &str {
        "http"
    }
}

fn with_headers<B>(
    builder: ureq::RequestBuilder<B>,
    cookie: Option<&str>,
    content_type: Option<&str>,
) -> ureq::RequestBuilder<B> {
    let mut builder = builder.header("Accept", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header("Cookie", cookie);
    }
    if let Some(content_type) = content_type {
        builder = builder.header("Content-Type", content_type);
    }
    builder
}

/// Map a ureq failure onto the transport taxonomy.
fn classify_error(
    err: ureq::Error,
    url: &str,
    timeout: Duration,
    cancel: &CancelToken,
) -> TransportError {
    if cancel.is_cancelled() {
        return TransportError::Cancelled;
    }
    let timed_out = || TransportError::Timeout {
        url: url.to_string(),
        timeout_ms: timeout.as_millis() as u64,
    };
    match err {
        ureq::Error::Timeout(_) => timed_out(),
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            TransportError::Unreachable {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
        ureq::Error::Io(io) => match io.kind() {
            std::io::ErrorKind::TimedOut => timed_out(),
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::AddrNotAvailable => TransportError::Unreachable {
                url: url.to_string(),
                message: io.to_string(),
            },
            _ => TransportError::Io(io.to_string()),
        },
        other => TransportError::InvalidResponse {
            message: other.to_string(),
        },
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

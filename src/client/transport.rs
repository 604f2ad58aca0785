use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use log::{info, trace, warn};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use thiserror::Error;

/// HTTP verb subset the CA API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }

    fn sends_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

/// Which API key accompanies a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    Admin,
    Requestor,
}

/// One CA API call, ready for the transport.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Resource path relative to the endpoint, e.g. `services/v2/domain`.
    pub resource: String,
    /// Pre-built query string, appended for GET-style calls only.
    pub query: Option<String>,
    /// Serialized JSON body, sent for POST/PUT only.
    pub body: Option<String>,
    pub credential: Credential,
}

/// Raw outcome of a transport round trip. Non-success responses keep the
/// body verbatim so the caller can parse a structured error payload.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub success: bool,
    pub body: String,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("unable to establish connection to the CA web service: {0}")]
    Connection(String),
    #[error("CA rate limit not lifted after {attempts} attempts")]
    RateLimited { attempts: u32 },
    #[error("requestor API key not configured")]
    MissingRequestorKey,
}

pub trait Transport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError>;
}

/// Retry schedule for rate-limited calls: exponential backoff from the
/// initial delay, bounded by a fixed attempt cap.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay.saturating_mul(1u32 << attempt.min(10))
    }
}

/// Blocking transport over the shared reqwest client. Authenticates with
/// the `X-DC-DEVKEY` header, carrying either the admin key or the lesser
/// requestor key.
pub struct HttpTransport {
    endpoint: String,
    api_key: String,
    requestor_key: Option<String>,
    backoff: BackoffPolicy,
}

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

fn shared_client() -> &'static Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        let timeout = resolve_timeout();
        Client::builder().timeout(timeout).build().unwrap_or_else(|err| {
            warn!("[ca-http] failed to build shared client: {err}");
            Client::new()
        })
    })
}

fn resolve_timeout() -> Duration {
    const DEFAULT_TIMEOUT_SECS: u64 = 60;
    let timeout = std::env::var("CA_GATEWAY_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout == 0 {
        warn!("[ca-http] invalid timeout value; using default");
        return Duration::from_secs(DEFAULT_TIMEOUT_SECS);
    }
    Duration::from_secs(timeout)
}

impl HttpTransport {
    pub fn new(endpoint: String, api_key: String, requestor_key: Option<String>) -> Self {
        Self {
            endpoint,
            api_key,
            requestor_key,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    fn target_url(&self, request: &ApiRequest) -> String {
        if request.method.sends_body() {
            format!("{}{}", self.endpoint, request.resource)
        } else {
            match request.query.as_deref() {
                Some(query) if !query.is_empty() => {
                    format!("{}{}?{}", self.endpoint, request.resource, query)
                }
                _ => format!("{}{}", self.endpoint, request.resource),
            }
        }
    }

    fn api_key_for(&self, credential: Credential) -> Result<&str, TransportError> {
        match credential {
            Credential::Admin => Ok(&self.api_key),
            Credential::Requestor => self
                .requestor_key
                .as_deref()
                .ok_or(TransportError::MissingRequestorKey),
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let request_id = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let url = self.target_url(request);
        let key = self.api_key_for(request.credential)?;

        let mut attempt: u32 = 0;
        loop {
            trace!(
                "[ca-http] Request {} {} {} (attempt {})",
                request_id,
                request.method.as_str(),
                url,
                attempt + 1
            );

            let builder = match request.method {
                Method::Get => shared_client().get(&url),
                Method::Post => shared_client().post(&url),
                Method::Put => shared_client().put(&url),
            };
            let mut builder = builder
                .header("X-DC-DEVKEY", key)
                .header("Content-Type", "application/json");
            if request.method.sends_body() {
                if let Some(body) = &request.body {
                    builder = builder.body(body.clone());
                }
            }

            let response = builder
                .send()
                .map_err(|err| TransportError::Connection(err.to_string()))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                attempt += 1;
                if attempt >= self.backoff.max_attempts {
                    warn!(
                        "[ca-http] Request {} still rate-limited after {} attempts, giving up",
                        request_id, attempt
                    );
                    return Err(TransportError::RateLimited { attempts: attempt });
                }
                let delay = self.backoff.delay_for(attempt - 1);
                info!(
                    "[ca-http] Request {} was rate-limited. Trying again in {}s",
                    request_id,
                    delay.as_secs()
                );
                thread::sleep(delay);
                continue;
            }

            let body = response
                .text()
                .map_err(|err| TransportError::Connection(err.to_string()))?;
            trace!(
                "[ca-http] Request {} returned {}: {}",
                request_id,
                status,
                body
            );
            return Ok(RawResponse {
                status: status.as_u16(),
                success: status.is_success(),
                body,
            });
        }
    }
}

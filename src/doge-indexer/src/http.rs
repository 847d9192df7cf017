//! Transport abstraction and the shared bounded-retry request path.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Attempt bound for a single logical request.
pub const MAX_REQUEST_ATTEMPTS: u32 = 3;

/// Fixed delay between attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("indexer responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed request: {0}")]
    BadRequest(String),
    #[error("failed to decode indexer response: {0}")]
    Decode(String),
}

impl NetworkError {
    /// Transport failures and server-side statuses are worth another
    /// attempt. Client statuses (a 404 on an inscription lookup is the
    /// common clean-output case), request construction, and decode failures
    /// surface immediately.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::BadRequest(_) | Self::Decode(_) => false,
        }
    }

    /// HTTP status of the final response, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for a generic HTTP transport, so tests can substitute canned
/// responses for the network.
pub trait HttpClient: Send + Sync {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, NetworkError>> + Send;
}

/// `reqwest`-backed transport used outside of tests.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| NetworkError::BadRequest(err.to_string()))?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => {
                let builder = self.client.post(&request.url);
                match request.body {
                    Some(body) => builder
                        .header("Content-Type", "application/json")
                        .body(body),
                    None => builder,
                }
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|err| NetworkError::Transport(err.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|err| NetworkError::Transport(err.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            body,
            content_type,
        })
    }
}

/// Shared request path with bounded retry. Every indexer query goes through
/// here, so the retry policy is uniform across endpoints.
pub struct RemoteClient<C> {
    pub(crate) transport: C,
    base_url: String,
}

impl<C: HttpClient> RemoteClient<C> {
    pub fn new(transport: C, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            transport,
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse, NetworkError> {
        let url = self.url(path);
        let mut last_failure = NetworkError::Transport("request was never attempted".to_string());

        for attempt in 1..=MAX_REQUEST_ATTEMPTS {
            log::trace!("{method:?} {url}, attempt {attempt}/{MAX_REQUEST_ATTEMPTS}");

            let result = self
                .transport
                .send(HttpRequest {
                    method,
                    url: url.clone(),
                    body: body.clone(),
                })
                .await;

            let failure = match result {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => NetworkError::Status {
                    status: response.status,
                    message: String::from_utf8_lossy(&response.body).into_owned(),
                },
                Err(err) => err,
            };

            if !failure.is_retryable() {
                return Err(failure);
            }

            log::warn!("{method:?} {url} failed on attempt {attempt}/{MAX_REQUEST_ATTEMPTS}: {failure}");
            last_failure = failure;

            if attempt < MAX_REQUEST_ATTEMPTS {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        log::error!("{method:?} {url} exhausted {MAX_REQUEST_ATTEMPTS} attempts: {last_failure}");
        Err(last_failure)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, NetworkError> {
        let response = self.request(HttpMethod::Get, path, None).await?;
        serde_json::from_slice(&response.body).map_err(|err| NetworkError::Decode(err.to_string()))
    }

    pub async fn get_text(&self, path: &str) -> Result<String, NetworkError> {
        let response = self.request(HttpMethod::Get, path, None).await?;
        String::from_utf8(response.body).map_err(|err| NetworkError::Decode(err.to_string()))
    }

    pub async fn get_raw(&self, path: &str) -> Result<HttpResponse, NetworkError> {
        self.request(HttpMethod::Get, path, None).await
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, NetworkError> {
        let body =
            serde_json::to_vec(body).map_err(|err| NetworkError::BadRequest(err.to_string()))?;
        let response = self.request(HttpMethod::Post, path, Some(body)).await?;
        serde_json::from_slice(&response.body).map_err(|err| NetworkError::Decode(err.to_string()))
    }
}

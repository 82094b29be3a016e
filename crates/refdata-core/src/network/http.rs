//! reqwest-backed transport.
//!
//! Provides a wrapper around reqwest with:
//! - Base URL handling for resource paths
//! - Caller-supplied credentials, replaceable at runtime
//! - Configurable timeouts
//! - User-agent management

use super::transport::{Method, Transport, TransportFailure, TransportRequest, TransportResponse};
use crate::config::NetworkConfig;
use crate::error::{RefDataError, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

/// Authorization credential attached to every request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Sent as `Authorization: Bearer <token>`.
    Bearer(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Bearer(_) => write!(f, "Bearer(<redacted>)"),
        }
    }
}

impl Credential {
    fn header_value(&self) -> String {
        match self {
            Credential::Bearer(token) => format!("Bearer {}", token),
        }
    }
}

/// HTTP transport against one backend.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    credential: RwLock<Option<Credential>>,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport with the default request timeout.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a transport with a custom request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        url::Url::parse(base_url).map_err(|e| RefDataError::InvalidUrl {
            url: base_url.to_string(),
            message: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT.min(timeout))
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| RefDataError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credential: RwLock::new(None),
            timeout,
        })
    }

    /// Attach a credential at construction time.
    pub fn with_credential(self, credential: Credential) -> Self {
        self.set_credential(Some(credential));
        self
    }

    /// Replace (or clear) the credential used for subsequent requests.
    pub fn set_credential(&self, credential: Option<Credential>) {
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = credential;
    }

    pub fn has_credential(&self) -> bool {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Absolute URL for a resource path.
    pub fn url_for(&self, path: &str) -> String {
        if path.is_empty() {
            self.base_url.clone()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn authorization(&self) -> Option<String> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Credential::header_value)
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> std::result::Result<TransportResponse, TransportFailure> {
        let url = self.url_for(&request.path);
        debug!("{} {}", request.method, url);

        let mut builder = self.client.request(reqwest_method(request.method), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(authorization) = self.authorization() {
            builder = builder.header(header::AUTHORIZATION, authorization);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                TransportFailure::invalid_request(format!("{} {}: {}", request.method, url, e))
            } else {
                TransportFailure::connection(format!("{} {} failed: {}", request.method, url, e))
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportFailure::connection(format!("Failed to read body from {}: {}", url, e)))?
            .to_vec();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

//! Stored HTTP requests and the collaborators that resolve and send them.
//!
//! The HTTP node never talks to the network directly. It looks a request up
//! through a [`RequestStore`] and hands it to a [`RequestSender`], so tests
//! and embedders can swap either side.

use async_trait::async_trait;
use relaycore::FlowError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A request saved by the user, addressed by `id` from node parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl HttpRequestDefinition {
    pub fn new(id: impl Into<String>, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            method: method.into(),
            url: url.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub elapsed: Duration,
}

impl HttpResponse {
    /// 1xx, 2xx and 3xx responses feed the success branch
    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SendError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request cancelled")]
    Cancelled,
}

/// Sends one request, giving up as soon as `cancel` fires
#[async_trait]
pub trait RequestSender: Send + Sync {
    async fn send(
        &self,
        request: &HttpRequestDefinition,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, SendError>;
}

/// Resolves stored request ids
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn find(&self, id: &str) -> Option<HttpRequestDefinition>;
}

/// Request store backed by a map, typically loaded from a JSON file
#[derive(Debug, Clone, Default)]
pub struct InMemoryRequestStore {
    requests: HashMap<String, HttpRequestDefinition>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later definitions replace earlier ones with the same id
    pub fn from_requests(requests: impl IntoIterator<Item = HttpRequestDefinition>) -> Self {
        let mut store = Self::new();
        for request in requests {
            store.insert(request);
        }
        store
    }

    /// Load a JSON array of request definitions
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let raw = std::fs::read_to_string(path)?;
        let requests: Vec<HttpRequestDefinition> = serde_json::from_str(&raw)?;
        Ok(Self::from_requests(requests))
    }

    pub fn insert(&mut self, request: HttpRequestDefinition) {
        if self.requests.contains_key(&request.id) {
            tracing::warn!("Replacing stored request {}", request.id);
        }
        self.requests.insert(request.id.clone(), request);
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.requests.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn find(&self, id: &str) -> Option<HttpRequestDefinition> {
        self.requests.get(id).cloned()
    }
}

/// [`RequestSender`] over a shared `reqwest` client
#[derive(Debug, Clone, Default)]
pub struct ReqwestSender {
    client: reqwest::Client,
}

impl ReqwestSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn perform(&self, request: &HttpRequestDefinition) -> Result<HttpResponse, SendError> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| {
                SendError::InvalidRequest(format!("unsupported method: {}", request.method))
            })?;

        let mut builder = self.client.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                SendError::InvalidRequest(e.to_string())
            } else {
                SendError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| SendError::Transport(format!("failed to read response: {}", e)))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
            elapsed: started.elapsed(),
        })
    }
}

#[async_trait]
impl RequestSender for ReqwestSender {
    async fn send(
        &self,
        request: &HttpRequestDefinition,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, SendError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SendError::Cancelled),
            result = self.perform(request) => result,
        }
    }
}

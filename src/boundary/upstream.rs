use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, Method};
use reqwest::Client;
use std::fmt;

use crate::cache::CachedResponse;

#[derive(Debug)]
pub enum BoundaryError {
    /// The request never produced a response.
    Network(String),
}

impl fmt::Display for BoundaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryError::Network(msg) => write!(f, "Network error: {}", msg),
        }
    }
}

impl std::error::Error for BoundaryError {}

/// A request as seen by the boundary.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    pub fn get(path_and_query: &str) -> Self {
        Self {
            method: Method::GET,
            path_and_query: path_and_query.to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn accept(&self) -> Option<&str> {
        self.headers.get(header::ACCEPT).and_then(|v| v.to_str().ok())
    }

    /// Same request, told to skip every HTTP cache on the way.
    pub fn no_store(&self) -> Self {
        let mut request = self.clone();
        request
            .headers
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        request
    }
}

/// The network side of the boundary.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Any HTTP answer, whatever its status, is `Ok`. `Err` means the
    /// network could not be reached.
    async fn fetch(&self, request: &ProxyRequest) -> Result<CachedResponse, BoundaryError>;
}

// Hop-by-hop headers, plus the ones the response body rewrites.
const SKIPPED_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
    "host",
    "upgrade",
];

fn forwardable(name: &str) -> bool {
    !SKIPPED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h))
}

pub struct HttpUpstream {
    client: Client,
    origin: String,
}

impl HttpUpstream {
    pub fn new(client: Client, origin: &str) -> Self {
        Self {
            client,
            origin: origin.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: &ProxyRequest) -> Result<CachedResponse, BoundaryError> {
        let url = format!("{}{}", self.origin, request.path_and_query);

        let mut headers = HeaderMap::new();
        for (name, value) in request.headers.iter() {
            if forwardable(name.as_str()) {
                headers.append(name.clone(), value.clone());
            }
        }

        let response = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| BoundaryError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| forwardable(name.as_str()))
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
            .map_err(|e| BoundaryError::Network(e.to_string()))?;

        Ok(CachedResponse {
            status,
            headers,
            body,
        })
    }
}

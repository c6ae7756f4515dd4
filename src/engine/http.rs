use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Proxy};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::TransportError;

/// Fully resolved request, ready for the wire.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
    pub proxy_url: Option<String>,
    pub verify_ssl: bool,
}

impl Default for WireRequest {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            url: String::new(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
            proxy_url: None,
            verify_ssl: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub size: u64,
    pub elapsed_ms: u64,
}

impl WireResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Seam between the runner and the network. Tests drive the pipeline through
/// a scripted implementation of this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: WireRequest,
        cancel_rx: &mut broadcast::Receiver<()>,
    ) -> Result<WireResponse, TransportError>;
}

pub(crate) fn header_map(input: &HashMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();

    for (key, value) in input {
        if key.is_empty() {
            continue;
        }

        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|err| {
            TransportError::InvalidHeader {
                name: key.clone(),
                reason: err.to_string(),
            }
        })?;
        let value = HeaderValue::from_str(value).map_err(|err| TransportError::InvalidHeader {
            name: key.clone(),
            reason: err.to_string(),
        })?;
        headers.insert(name, value);
    }

    Ok(headers)
}

/// Reqwest-backed transport. A client is built per send because timeout and
/// proxy settings travel with the request.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport;

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: WireRequest,
        cancel_rx: &mut broadcast::Receiver<()>,
    ) -> Result<WireResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::InvalidMethod(request.method.clone()))?;
        let headers = header_map(&request.headers)?;

        let mut builder = Client::builder().redirect(reqwest::redirect::Policy::limited(10));
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(proxy_url) = request.proxy_url.as_deref().filter(|url| !url.is_empty()) {
            let proxy =
                Proxy::all(proxy_url).map_err(|err| TransportError::InvalidProxy(err.to_string()))?;
            builder = builder.proxy(proxy);
        }
        if !request.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|err| TransportError::Client(err.to_string()))?;

        let mut outgoing = client.request(method.clone(), &request.url).headers(headers);
        if let Some(body) = request.body {
            if !matches!(method, Method::GET | Method::HEAD | Method::OPTIONS) {
                outgoing = outgoing.body(body);
            }
        }

        debug!(method = %method, url = %request.url, "sending");
        let start = Instant::now();

        let response = tokio::select! {
            result = outgoing.send() => {
                result.map_err(|err| TransportError::Send(err.to_string()))?
            }
            _ = cancel_rx.recv() => return Err(TransportError::Cancelled),
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or("Unknown").to_string();

        let mut response_headers = HashMap::new();
        for (key, value) in response.headers() {
            response_headers.insert(
                key.to_string(),
                value.to_str().unwrap_or_default().to_string(),
            );
        }

        let bytes = tokio::select! {
            result = response.bytes() => {
                result.map_err(|err| TransportError::Read(err.to_string()))?
            }
            _ = cancel_rx.recv() => return Err(TransportError::Cancelled),
        };

        Ok(WireResponse {
            status: status.as_u16(),
            status_text,
            headers: response_headers,
            body: String::from_utf8_lossy(&bytes).to_string(),
            size: bytes.len() as u64,
            elapsed_ms,
        })
    }
}

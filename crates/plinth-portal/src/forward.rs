use std::fmt;
use std::time::Duration;

use anyhow::Context as _;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::Response;
use thiserror::Error;

// End-to-end deadline for one backend round trip, body included.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

// Request headers the transport recomputes on the outbound leg.
const REQUEST_DROP: [HeaderName; 3] = [header::HOST, header::CONNECTION, header::CONTENT_LENGTH];

// Response headers that describe the backend connection, not the payload.
const RESPONSE_DROP: [HeaderName; 3] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::CONTENT_ENCODING,
];

#[derive(Debug, Clone)]
pub struct ProxyTarget {
    pub host: String,
    pub port: u16,
}

impl ProxyTarget {
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("backend unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("backend round trip timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    #[error("forwarding failed: {0}")]
    Internal(#[source] reqwest::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Unreachable(_) | ProxyError::Internal(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn client_message(&self) -> &'static str {
        match self {
            ProxyError::Unreachable(_) => "Backend service unavailable",
            ProxyError::Timeout(_) => "Backend service timeout",
            ProxyError::Internal(_) => "Proxy error",
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::Timeout(err)
        } else if err.is_connect() {
            ProxyError::Unreachable(err)
        } else {
            ProxyError::Internal(err)
        }
    }
}

pub struct Forwarder {
    client: reqwest::Client,
    target: ProxyTarget,
    host_header: HeaderValue,
}

impl Forwarder {
    pub fn new(target: ProxyTarget) -> anyhow::Result<Self> {
        Self::with_timeout(target, FORWARD_TIMEOUT)
    }

    fn with_timeout(target: ProxyTarget, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build proxy http client")?;
        let host_header = HeaderValue::from_str(&target.authority())
            .with_context(|| format!("backend address {target} is not header-safe"))?;
        Ok(Self {
            client,
            target,
            host_header,
        })
    }

    // A `None` body stays absent, so bodyless GETs do not pick up a spurious
    // `Content-Length: 0`.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Option<Bytes>,
    ) -> Result<Response, ProxyError> {
        let url = format!("http://{}{}", self.target.authority(), path_and_query);
        let mut request = self
            .client
            .request(method, url)
            .headers(outbound_headers(headers, &self.host_header));
        if let Some(body) = body {
            request = request.body(body);
        }

        let upstream = request.send().await.map_err(ProxyError::from_reqwest)?;

        let status = upstream.status();
        let headers = response_headers(upstream.headers());
        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn outbound_headers(headers: &HeaderMap, host: &HeaderValue) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len() + 1);
    for (name, value) in headers {
        if REQUEST_DROP.contains(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out.insert(header::HOST, host.clone());
    out
}

fn response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if RESPONSE_DROP.contains(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

//! Upstream forwarding
//!
//! Uses hyper's pooled client, so keep-alive connections to an instance
//! are reused across requests. Redirects are relayed, never followed.

use crate::ProxyError;
use bytes::Bytes;
use http::header::HeaderName;
use http::{HeaderMap, Method, Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::debug;

/// Hop-by-hop and framing headers never copied between client and instance
pub const EXCLUDED_HEADERS: [&str; 5] = [
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
    "host",
];

/// Remove every excluded header from a header map
pub fn strip_excluded_headers(headers: &mut HeaderMap) {
    for name in EXCLUDED_HEADERS {
        headers.remove(HeaderName::from_static(name));
    }
}

/// Pooled HTTP/1.1 client for instance traffic
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client, timeout }
    }

    /// Send one request and return the instance's response unchanged
    pub async fn forward(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response<Incoming>, ProxyError> {
        let mut builder = Request::builder().method(method).uri(url);
        if let Some(outgoing) = builder.headers_mut() {
            outgoing.extend(headers.clone());
            strip_excluded_headers(outgoing);
            // content-encoding is dropped from the response, so ask for identity
            outgoing.remove(http::header::ACCEPT_ENCODING);
        }
        let request = builder.body(Full::new(body))?;

        debug!("Forwarding {} {}", request.method(), url);

        match tokio::time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(ProxyError::Upstream(e.to_string())),
            Err(_) => Err(ProxyError::UpstreamTimeout(self.timeout.as_secs())),
        }
    }
}

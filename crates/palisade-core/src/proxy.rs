//! Forwarding admitted requests to the origin.
//!
//! The fetch itself sits behind [`OriginFetch`] so tests and caching layers
//! can interpose; [`HttpOriginFetch`] is the real reqwest-backed
//! implementation. The stage owns the hop-header and forwarded-for
//! discipline: the proxy emits its own framing, so client framing headers
//! never reach the origin.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method};
use serde_json::json;

use palisade_error::{ProxyError, Result};

use crate::{
    admission::ParsedRequest,
    http::{ClientRequest, OriginResponse},
};

/// A request on its way to the origin.
#[derive(Debug, Clone)]
pub struct OriginRequest {
    /// Request method.
    pub method: Method,

    /// Rewritten headers.
    pub headers: HeaderMap,

    /// Request body.
    pub body: Bytes,
}

/// The downstream fetch collaborator.
#[async_trait]
pub trait OriginFetch: Send + Sync {
    /// Issue `request` against `url`.
    ///
    /// # Errors
    ///
    /// Transport-level failures surface as [`ProxyError::Transport`].
    async fn fetch(&self, url: &str, request: OriginRequest) -> Result<OriginResponse>;
}

/// Production fetch implementation over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpOriginFetch {
    client: reqwest::Client,
}

impl HttpOriginFetch {
    /// Build the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Configuration`] when the TLS backend cannot be
    /// initialized.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProxyError::config(format!("cannot build http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl OriginFetch for HttpOriginFetch {
    async fn fetch(&self, url: &str, request: OriginRequest) -> Result<OriginResponse> {
        let response = self
            .client
            .request(request.method, url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| ProxyError::transport(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::transport(e.to_string()))?;

        Ok(OriginResponse {
            status,
            headers,
            body,
        })
    }
}

/// The proxy stage: rewrite headers, forward, classify.
pub struct ProxyStage {
    origin_url:    reqwest::Url,
    origin_header: HeaderValue,
    fetch:         Arc<dyn OriginFetch>,
}

impl std::fmt::Debug for ProxyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyStage")
            .field("origin_url", &self.origin_url.as_str())
            .finish()
    }
}

impl ProxyStage {
    /// Create a stage targeting `origin_url` through `fetch`.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Configuration`] when the origin URL does not
    /// parse.
    pub fn new(origin_url: &str, fetch: Arc<dyn OriginFetch>) -> Result<Self> {
        let url = reqwest::Url::parse(origin_url)
            .map_err(|e| ProxyError::config(format!("invalid origin url: {e}")))?;
        let origin = url.origin().ascii_serialization();
        let origin_header = HeaderValue::from_str(&origin)
            .map_err(|e| ProxyError::config(format!("origin not header-safe: {e}")))?;

        Ok(Self {
            origin_url: url,
            origin_header,
            fetch,
        })
    }

    /// Forward an admitted operation as a GraphQL POST.
    ///
    /// # Errors
    ///
    /// Propagates [`ProxyError::Transport`] from the fetch collaborator.
    pub async fn forward(&self, parsed: &ParsedRequest) -> Result<OriginResponse> {
        let mut headers = self.rewrite_headers(&parsed.headers);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let body = json!({
            "query": parsed.query,
            "variables": parsed.variables,
            "operationName": parsed.operation_name,
        });
        let encoded = serde_json::to_vec(&body)
            .map_err(|e| ProxyError::internal(format!("cannot encode origin body: {e}")))?;

        self.fetch
            .fetch(
                self.origin_url.as_str(),
                OriginRequest {
                    method:  Method::POST,
                    headers,
                    body:    encoded.into(),
                },
            )
            .await
    }

    /// Forward a bypass request verbatim: original method and body, hop
    /// headers rewritten, no policy.
    ///
    /// # Errors
    ///
    /// Propagates [`ProxyError::Transport`] from the fetch collaborator.
    pub async fn forward_raw(&self, request: &ClientRequest) -> Result<OriginResponse> {
        let headers = self.rewrite_headers(&request.headers);

        self.fetch
            .fetch(
                self.origin_url.as_str(),
                OriginRequest {
                    method:  request.method.clone(),
                    headers,
                    body:    request.body.clone(),
                },
            )
            .await
    }

    /// Hop-header policy and forwarded-for discipline.
    fn rewrite_headers(&self, incoming: &HeaderMap) -> HeaderMap {
        let mut headers = incoming.clone();

        headers.insert(header::ORIGIN, self.origin_header.clone());
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::CONTENT_ENCODING);
        headers.remove(header::TRANSFER_ENCODING);
        let host = headers.remove(header::HOST);

        if !headers.contains_key("x-forwarded-proto") {
            headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        }
        if let Some(host) = host {
            headers.insert("x-forwarded-host", host);
        }

        // Never overwrite a client-supplied X-Forwarded-For.
        if !headers.contains_key("x-forwarded-for") {
            let client_ip = incoming
                .get("cf-connecting-ip")
                .or_else(|| incoming.get("x-real-ip"))
                .cloned();
            if let Some(ip) = client_ip {
                headers.insert("x-forwarded-for", ip);
            }
        }

        headers
    }
}

//! Request and response envelopes exchanged with the hosting runtime.
//!
//! The pipeline never touches a socket; the listener hands it a fully read
//! [`ClientRequest`] and receives a [`ClientResponse`] back. Header maps are
//! `http::HeaderMap`, which gives case-insensitive lookup and ordered
//! multi-value entries by construction.

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use palisade_error::ProxyError;

/// An incoming request as seen by the admission stage.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    /// Request method.
    pub method: Method,

    /// Request URI (query string is consulted in store mode).
    pub uri: Uri,

    /// Request headers.
    pub headers: HeaderMap,

    /// Fully read request body.
    pub body: Bytes,
}

impl ClientRequest {
    /// Create a new request envelope.
    #[must_use]
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
        }
    }

    /// Read a header as UTF-8, if present and decodable.
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Decode the query string into key/value pairs.
    ///
    /// Percent-encoding is resolved and `+` is treated as a space, matching
    /// form-urlencoded conventions. Undecodable pairs are passed through raw
    /// rather than dropped.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let Some(query) = self.uri.query() else {
            return Vec::new();
        };

        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_component(key), decode_component(value))
            })
            .collect()
    }
}

fn decode_component(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    match urlencoding::decode(&plus_decoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => plus_decoded,
    }
}

/// The response returned to the client.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    /// Response status.
    pub status: StatusCode,

    /// Response headers.
    pub headers: HeaderMap,

    /// Response body.
    pub body: Bytes,
}

impl ClientResponse {
    /// Build the JSON error response for a pipeline failure:
    /// `{"message": "..."}` with the taxonomy-defined status.
    #[must_use]
    pub fn from_error(error: &ProxyError) -> Self {
        let status = StatusCode::from_u16(error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_vec(&error.client_body()).unwrap_or_default();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        Self {
            status,
            headers,
            body: body.into(),
        }
    }
}

/// The origin's answer to a forwarded request, prior to shaping.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    /// Origin status.
    pub status: StatusCode,

    /// Origin headers.
    pub headers: HeaderMap,

    /// Fully read origin body.
    pub body: Bytes,
}

impl OriginResponse {
    /// Whether the origin response carries a JSON GraphQL payload.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|content_type| {
                let mime = content_type
                    .split(';')
                    .next()
                    .unwrap_or(content_type)
                    .trim();
                mime.eq_ignore_ascii_case("application/json")
                    || mime.eq_ignore_ascii_case("application/graphql-response+json")
            })
    }

    /// Forward the origin response to the client unchanged.
    #[must_use]
    pub fn into_client_response(self) -> ClientResponse {
        ClientResponse {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

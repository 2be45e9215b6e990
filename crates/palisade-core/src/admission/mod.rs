//! Request admission: authenticate a request and resolve its operation.
//!
//! Two interchangeable implementations exist, selected by configuration:
//! [`StoreAdmission`] resolves a named, preregistered operation, and
//! [`SignatureAdmission`] verifies an HMAC over the canonical query (or a
//! preshared passthrough token). Both yield a [`ParsedRequest`], the
//! normalized unit of work for the rest of the pipeline, or an in-band
//! admission error.

use std::sync::Arc;

use http::HeaderMap;
use serde_json::Value as JsonValue;

use palisade_error::Result;

use crate::{http::ClientRequest, ops::OperationDefinition};

mod signature;
mod store;

pub use signature::SignatureAdmission;
pub use store::StoreAdmission;

/// Header carrying the hex HMAC over the canonical query.
pub const OP_HASH_HEADER: &str = "x-proxy-op-hash";

/// Header carrying the preshared passthrough token.
pub const PASSTHROUGH_HEADER: &str = "x-proxy-pass-secret";

/// The normalized unit of work produced by admission.
///
/// Read-only after construction. At least one of `query` or `operation` is
/// populated: signature mode copies the client's query text, store mode
/// installs the registered definition's text.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    /// GraphQL source text forwarded to the origin.
    pub query: String,

    /// Operation name, when one was given or resolved.
    pub operation_name: Option<String>,

    /// Operation variables.
    pub variables: Option<JsonValue>,

    /// The original request headers.
    pub headers: HeaderMap,

    /// Resolved store entry, in store mode.
    pub operation: Option<Arc<OperationDefinition>>,

    /// Whether the request was admitted via the passthrough token.
    pub passthrough: bool,
}

impl ParsedRequest {
    /// UTF-8 byte length of the JSON-serialized variables; 0 when absent.
    #[must_use]
    pub fn input_size(&self) -> u64 {
        self.variables
            .as_ref()
            .and_then(|variables| serde_json::to_vec(variables).ok())
            .map_or(0, |encoded| encoded.len() as u64)
    }
}

/// What admission decided for a request.
#[derive(Debug)]
pub enum AdmitOutcome {
    /// The request was admitted; run the policy pipeline.
    Operation(Box<ParsedRequest>),

    /// The request is outside the policy surface (signature-mode non-POST);
    /// forward it verbatim with no policy and no report.
    Bypass,
}

/// An admission strategy.
pub trait Admission: Send + Sync {
    /// Admit or reject a request.
    ///
    /// # Errors
    ///
    /// Any rejection is an in-band [`palisade_error::ProxyError`] whose
    /// status is in 400–499.
    fn admit(&self, request: &ClientRequest) -> Result<AdmitOutcome>;
}

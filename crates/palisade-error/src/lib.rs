//! Error types for the Palisade edge proxy.
//!
//! Every stage of the proxy pipeline carries its failure in-band as a
//! [`ProxyError`] variant; no stage escapes with a panic. Client-facing
//! messages are fixed strings (or templates interpolating only the operation
//! name) so that parser, network, and crypto internals never leak to callers.
//!
//! # Error taxonomy
//!
//! ```text
//! ProxyError
//! ├── MethodNotSupported   - request method not accepted        (404)
//! ├── Extraction           - operation could not be extracted   (404)
//! ├── MissingOperation     - no operation named in the request  (404)
//! ├── OperationNotFound    - operation not registered           (404)
//! ├── Validation           - per-operation validator rejected   (400)
//! ├── SignatureMissing     - no credentials presented           (403)
//! ├── SignatureInvalid     - op-hash verification failed        (403)
//! ├── InvalidBody          - request body not decodable         (403)
//! ├── MissingQuery         - body carries no query              (403)
//! ├── QueryParse           - query unparseable / over token cap (403)
//! ├── Transport            - origin fetch failed                (500)
//! ├── ResponseDecode       - origin response not decodable      (406)
//! ├── Configuration        - invalid proxy configuration        (500)
//! └── Internal             - unexpected internal errors         (500)
//! ```

use serde_json::json;
use thiserror::Error;

#[cfg(feature = "axum-compat")]
mod http;

/// Result type alias for Palisade operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Main error type for the proxy pipeline.
///
/// The `Display` form is the internal (log-facing) message; the string sent
/// to clients comes from [`ProxyError::client_message`].
#[derive(Error, Debug)]
pub enum ProxyError {
    // ========================================================================
    // Routing errors (404)
    // ========================================================================
    /// The request method is not accepted in the current admission mode.
    #[error("method not supported")]
    MethodNotSupported,

    /// The request body or query string could not be decoded into an
    /// operation lookup.
    #[error("cannot extract request: {message}")]
    Extraction {
        /// Decoder failure description.
        message: String,
    },

    /// The request named no operation at all.
    #[error("no operation defined")]
    MissingOperation,

    /// The named operation is not registered in the operation store.
    #[error("operation {name} not found")]
    OperationNotFound {
        /// The operation name the client asked for.
        name: String,
    },

    // ========================================================================
    // Validation errors (400)
    // ========================================================================
    /// A per-operation validator rejected the request.
    #[error("validation failed: {message}")]
    Validation {
        /// Message produced by the validator; forwarded to the client.
        message: String,
    },

    // ========================================================================
    // Admission errors (403)
    // ========================================================================
    /// The request presented neither a signature nor a passthrough token.
    #[error("signature not defined")]
    SignatureMissing,

    /// The operation hash header did not verify against the canonical query.
    #[error("invalid operation hash header")]
    SignatureInvalid,

    /// The request body was not valid JSON.
    #[error("request body not decodable: {message}")]
    InvalidBody {
        /// Decoder failure description, kept for logs only.
        message: String,
    },

    /// The request body carried no `query` field.
    #[error("missing query in body")]
    MissingQuery,

    /// The query text failed to parse or exceeded the token cap.
    ///
    /// Token-limit and syntax failures deliberately collapse into one
    /// client-visible message so parser internals are not probeable.
    #[error("cannot parse query: {reason}")]
    QueryParse {
        /// Parser failure detail, kept for logs only.
        reason: String,
    },

    // ========================================================================
    // Proxy transport errors (500)
    // ========================================================================
    /// The origin fetch failed at the transport level.
    #[error("origin fetch failed: {message}")]
    Transport {
        /// Transport failure description; preserved in reports, never sent
        /// to clients.
        message: String,
    },

    // ========================================================================
    // Downstream shape errors (406)
    // ========================================================================
    /// The origin response declared JSON but could not be decoded.
    #[error("origin response not decodable: {message}")]
    ResponseDecode {
        /// Decoder failure description, kept for logs only.
        message: String,
    },

    // ========================================================================
    // Configuration and internal errors (500)
    // ========================================================================
    /// The proxy configuration is invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// Error message.
        message: String,
    },

    /// Unexpected internal error. Should be rare.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl ProxyError {
    // ========================================================================
    // Constructor helpers
    // ========================================================================

    /// Create an extraction error (404 family).
    #[must_use]
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    /// Create an operation-not-found error.
    #[must_use]
    pub fn operation_not_found(name: impl Into<String>) -> Self {
        Self::OperationNotFound { name: name.into() }
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an invalid-body error.
    #[must_use]
    pub fn invalid_body(message: impl Into<String>) -> Self {
        Self::InvalidBody {
            message: message.into(),
        }
    }

    /// Create a query-parse error.
    #[must_use]
    pub fn query_parse(reason: impl Into<String>) -> Self {
        Self::QueryParse {
            reason: reason.into(),
        }
    }

    /// Create a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a response-decode error.
    #[must_use]
    pub fn response_decode(message: impl Into<String>) -> Self {
        Self::ResponseDecode {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    // ========================================================================
    // Error classification
    // ========================================================================

    /// HTTP status code emitted to the client for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::MethodNotSupported
            | Self::Extraction { .. }
            | Self::MissingOperation
            | Self::OperationNotFound { .. } => 404,
            Self::Validation { .. } => 400,
            Self::SignatureMissing
            | Self::SignatureInvalid
            | Self::InvalidBody { .. }
            | Self::MissingQuery
            | Self::QueryParse { .. } => 403,
            Self::ResponseDecode { .. } => 406,
            Self::Transport { .. } | Self::Configuration { .. } | Self::Internal { .. } => 500,
        }
    }

    /// Machine-readable error code for logs and diagnostics.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            Self::Extraction { .. } => "EXTRACTION_FAILED",
            Self::MissingOperation => "NO_OPERATION",
            Self::OperationNotFound { .. } => "OPERATION_NOT_FOUND",
            Self::Validation { .. } => "VALIDATION_FAILED",
            Self::SignatureMissing => "SIGNATURE_MISSING",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::InvalidBody { .. } => "BODY_NOT_DECODABLE",
            Self::MissingQuery => "QUERY_MISSING",
            Self::QueryParse { .. } => "QUERY_PARSE_FAILED",
            Self::Transport { .. } => "ORIGIN_UNREACHABLE",
            Self::ResponseDecode { .. } => "RESPONSE_NOT_DECODABLE",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// The fixed message sent to clients.
    ///
    /// Decoder, network, and crypto details never appear here; the only
    /// interpolation is the operation name on [`ProxyError::OperationNotFound`]
    /// and the validator's own message on [`ProxyError::Validation`].
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::MethodNotSupported => "method not supported".to_string(),
            Self::Extraction { message } => message.clone(),
            Self::MissingOperation => "no operation defined".to_string(),
            Self::OperationNotFound { name } => format!("operation {name} not found"),
            Self::Validation { message } => message.clone(),
            Self::SignatureMissing => "signature not defined".to_string(),
            Self::SignatureInvalid => "Invalid x-proxy-op-hash header".to_string(),
            Self::InvalidBody { .. } => "not valid body".to_string(),
            Self::MissingQuery => "Missing query in body".to_string(),
            Self::QueryParse { .. } => "cannot parse query".to_string(),
            Self::ResponseDecode { .. } => "cannot parse response".to_string(),
            Self::Transport { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "internal error".to_string()
            },
        }
    }

    /// Render the client-facing JSON body `{"message": "..."}`.
    #[must_use]
    pub fn client_body(&self) -> serde_json::Value {
        json!({ "message": self.client_message() })
    }

    /// Check if this is a client error (4xx).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        let status = self.status_code();
        status >= 400 && status < 500
    }
}

// ============================================================================
// Tests
// ============================================================================

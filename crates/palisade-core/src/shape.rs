//! Post-origin response shaping.
//!
//! Only successful JSON responses are shaped; anything else passes through
//! unchanged. Shaping masks schema-suggestion text in error messages (which
//! would otherwise leak field names to probing clients), optionally strips
//! the `extensions` key, and rewrites framing headers since the proxy emits
//! its own body.

// Reason: the suggestion pattern below is a compile-time literal; Regex::new
// on it can only fail from a programmer error, the workspace convention for
// regex statics.
#![allow(clippy::unwrap_used)]

use http::{header, HeaderMap, HeaderValue};
use lazy_static::lazy_static;
use regex::{NoExpand, Regex};
use serde_json::Value as JsonValue;

use palisade_error::{ProxyError, Result};

use crate::{config::ResponseRules, http::OriginResponse};

lazy_static! {
    // Matches graphql's "Did you mean" suggestions, quoted field included.
    static ref SUGGESTION_REGEX: Regex = Regex::new(r#"Did you mean ".+""#).unwrap();
}

/// The response shaper.
#[derive(Debug, Clone)]
pub struct ResponseShaper {
    rules: ResponseRules,
}

impl ResponseShaper {
    /// Create a shaper from response rules.
    #[must_use]
    pub fn new(rules: ResponseRules) -> Self {
        Self { rules }
    }

    /// Whether shaping applies to passthrough-admitted requests.
    #[must_use]
    pub fn shapes_passthrough(&self) -> bool {
        self.rules.shape_passthrough
    }

    /// Whether this origin response is subject to shaping at all.
    #[must_use]
    pub fn wants_shaping(&self, response: &OriginResponse) -> bool {
        response.status.is_success() && response.is_json()
    }

    /// Decode the origin payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::ResponseDecode`] (406 to the client) when the
    /// declared-JSON body does not decode.
    pub fn decode(&self, response: &OriginResponse) -> Result<JsonValue> {
        serde_json::from_slice(&response.body)
            .map_err(|e| ProxyError::response_decode(e.to_string()))
    }

    /// Apply masking and extensions stripping in place.
    ///
    /// Idempotent: applying twice yields the same payload as applying once,
    /// because the mask text itself never matches the suggestion pattern.
    pub fn apply(&self, payload: &mut JsonValue) {
        if let Some(mask) = &self.rules.error_masking {
            mask_suggestions(payload, mask);
        }

        if self.rules.remove_extensions {
            if let Some(object) = payload.as_object_mut() {
                object.remove("extensions");
            }
        }
    }

    /// Rewrite response framing headers: the shaped body is re-serialized,
    /// so origin framing no longer applies. All other headers are preserved.
    pub fn rewrite_headers(headers: &mut HeaderMap) {
        headers.remove(header::CONTENT_ENCODING);
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::TRANSFER_ENCODING);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
    }
}

fn mask_suggestions(payload: &mut JsonValue, mask: &str) {
    let Some(errors) = payload.get_mut("errors").and_then(JsonValue::as_array_mut) else {
        return;
    };

    for error in errors {
        let Some(message) = error.get("message").and_then(JsonValue::as_str) else {
            continue;
        };
        if SUGGESTION_REGEX.is_match(message) {
            let masked = SUGGESTION_REGEX.replace_all(message, NoExpand(mask)).into_owned();
            error["message"] = JsonValue::String(masked);
        }
    }
}

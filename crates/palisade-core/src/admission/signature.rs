//! Signature-mode admission: verify an HMAC over the canonical query.
//!
//! A request is admitted when it either presents the preshared passthrough
//! token (whose SHA-256 must match configuration) or an `x-proxy-op-hash`
//! header equal to the HMAC of the canonical document under the configured
//! secret. All verification steps run for any request that presented
//! credentials, so rejection timing does not depend on which check failed;
//! only credential-less requests take the fast path out (header presence is
//! not a secret).

use serde_json::Value as JsonValue;

use palisade_error::{ProxyError, Result};

use crate::{
    admission::{AdmitOutcome, Admission, ParsedRequest, OP_HASH_HEADER, PASSTHROUGH_HEADER},
    config::{ProxyConfig, SignSecret},
    crypto,
    document::CanonicalCache,
    http::ClientRequest,
};

/// Admission backed by signature verification.
#[derive(Debug)]
pub struct SignatureAdmission {
    pass_through_hash: Option<String>,
    sign_secret:       Option<SignSecret>,
    max_tokens:        usize,
    cache:             CanonicalCache,
}

impl SignatureAdmission {
    /// Create signature-mode admission from configuration.
    #[must_use]
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            pass_through_hash: config.pass_through_hash.clone(),
            sign_secret:       config.sign_secret.clone(),
            max_tokens:        config.max_tokens,
            cache:             CanonicalCache::new(config.cache_entries),
        }
    }

    fn is_passthrough(&self, request: &ClientRequest) -> bool {
        let (Some(token), Some(expected)) = (
            request.header_str(PASSTHROUGH_HEADER),
            self.pass_through_hash.as_deref(),
        ) else {
            return false;
        };

        let presented = crypto::sha256_hex(token.as_bytes());
        crypto::constant_time_eq(presented.as_bytes(), expected.as_bytes())
    }
}

impl Admission for SignatureAdmission {
    fn admit(&self, request: &ClientRequest) -> Result<AdmitOutcome> {
        // Only POST is under policy; everything else is forwarded verbatim.
        if request.method != http::Method::POST {
            return Ok(AdmitOutcome::Bypass);
        }

        let passthrough = self.is_passthrough(request);
        let op_hash = request.header_str(OP_HASH_HEADER);

        // A request that presented no credentials at all is rejected before
        // any body work; one that attempted either credential runs the full
        // verification sequence below.
        if self.sign_secret.is_some()
            && !passthrough
            && op_hash.is_none()
            && request.header_str(PASSTHROUGH_HEADER).is_none()
        {
            return Err(ProxyError::SignatureMissing);
        }

        let body: JsonValue = serde_json::from_slice(&request.body)
            .map_err(|e| ProxyError::invalid_body(e.to_string()))?;
        let query = body
            .get("query")
            .and_then(JsonValue::as_str)
            .ok_or(ProxyError::MissingQuery)?;

        let canonical = self
            .cache
            .canonical(query, self.max_tokens)
            .map_err(|e| ProxyError::query_parse(e.to_string()))?;

        if let Some(secret) = &self.sign_secret {
            if !passthrough {
                let expected = crypto::hmac_hex(
                    secret.secret().as_bytes(),
                    canonical.as_bytes(),
                    secret.algorithm(),
                )?;
                let presented = op_hash.unwrap_or("");
                if !crypto::constant_time_eq(expected.as_bytes(), presented.as_bytes()) {
                    return Err(ProxyError::SignatureInvalid);
                }
            }
        }

        let parsed = ParsedRequest {
            query: query.to_string(),
            operation_name: body
                .get("operationName")
                .and_then(JsonValue::as_str)
                .map(ToString::to_string),
            variables: body
                .get("variables")
                .filter(|value| !value.is_null())
                .cloned(),
            headers: request.headers.clone(),
            operation: None,
            passthrough,
        };

        Ok(AdmitOutcome::Operation(Box::new(parsed)))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue, Method, Uri};

    use super::*;
    use crate::{config::ProxyConfig, crypto::HashAlgorithm, document};

    const PASS_TOKEN: &str = "pass";
    const SIGN_SECRET: &str = "signature";

    fn config() -> ProxyConfig {
        let mut config = ProxyConfig::new("https://origin.example/graphql");
        config.pass_through_hash = Some(crypto::sha256_hex(PASS_TOKEN.as_bytes()));
        config.sign_secret = Some(SignSecret::Plain(SIGN_SECRET.to_string()));
        config
    }

    fn request(body: &str, headers: &[(&str, &str)]) -> ClientRequest {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            header_map.insert(
                http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        ClientRequest::new(
            Method::POST,
            Uri::from_static("/graphql"),
            header_map,
            Bytes::from(body.to_string()),
        )
    }

    fn sign(query: &str) -> String {
        let document = document::parse_document(query, 2000).unwrap();
        let canonical = document::canonical_print(&document);
        crypto::hmac_hex(SIGN_SECRET.as_bytes(), canonical.as_bytes(), HashAlgorithm::Sha256)
            .unwrap()
    }

    fn admitted(outcome: AdmitOutcome) -> ParsedRequest {
        match outcome {
            AdmitOutcome::Operation(parsed) => *parsed,
            AdmitOutcome::Bypass => panic!("expected an admitted operation"),
        }
    }

    #[test]
    fn test_signed_request_is_admitted() {
        let admission = SignatureAdmission::new(&config());
        let signature = sign("query me {me}");
        let parsed = admitted(
            admission
                .admit(&request(
                    r#"{"query": "query me {me}"}"#,
                    &[(OP_HASH_HEADER, &signature)],
                ))
                .unwrap(),
        );
        assert_eq!(parsed.query, "query me {me}");
        assert!(!parsed.passthrough);
    }

    #[test]
    fn test_signature_survives_reformatting() {
        let admission = SignatureAdmission::new(&config());
        // Signed over the compact form, sent with different whitespace.
        let signature = sign("query me {me}");
        let outcome = admission.admit(&request(
            r#"{"query": "query me {\n  me\n}"}"#,
            &[(OP_HASH_HEADER, &signature)],
        ));
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_bit_flipped_signature_is_rejected() {
        let admission = SignatureAdmission::new(&config());
        let mut signature = sign("query me {me}");
        // Flip the last hex digit.
        let flipped = if signature.ends_with('0') { "1" } else { "0" };
        signature.truncate(signature.len() - 1);
        signature.push_str(flipped);

        let err = admission
            .admit(&request(
                r#"{"query": "query me {me}"}"#,
                &[(OP_HASH_HEADER, &signature)],
            ))
            .unwrap_err();
        assert_eq!(err.client_message(), "Invalid x-proxy-op-hash header");
    }

    #[test]
    fn test_passthrough_token_bypasses_signature() {
        let admission = SignatureAdmission::new(&config());
        let parsed = admitted(
            admission
                .admit(&request(
                    r#"{"query": "query me { me }"}"#,
                    &[(PASSTHROUGH_HEADER, PASS_TOKEN)],
                ))
                .unwrap(),
        );
        assert!(parsed.passthrough);
    }

    #[test]
    fn test_wrong_passthrough_fails_signature_check() {
        let admission = SignatureAdmission::new(&config());
        let err = admission
            .admit(&request(
                r#"{"query": "query me { me }"}"#,
                &[(PASSTHROUGH_HEADER, "KABOOM")],
            ))
            .unwrap_err();
        // A failed passthrough attempt falls through to signature
        // verification against the (absent) op-hash header.
        assert_eq!(err.client_message(), "Invalid x-proxy-op-hash header");
    }

    #[test]
    fn test_no_credentials_at_all() {
        let admission = SignatureAdmission::new(&config());
        let err = admission
            .admit(&request(r#"{"query": "query me { me }"}"#, &[]))
            .unwrap_err();
        assert_eq!(err.client_message(), "signature not defined");
    }

    #[test]
    fn test_invalid_body() {
        let admission = SignatureAdmission::new(&config());
        let signature = sign("query me {me}");
        let err = admission
            .admit(&request("not json", &[(OP_HASH_HEADER, &signature)]))
            .unwrap_err();
        assert_eq!(err.client_message(), "not valid body");
    }

    #[test]
    fn test_missing_query_field() {
        let admission = SignatureAdmission::new(&config());
        let signature = sign("query me {me}");
        let err = admission
            .admit(&request(r#"{"variables": {}}"#, &[(OP_HASH_HEADER, &signature)]))
            .unwrap_err();
        assert_eq!(err.client_message(), "Missing query in body");
    }

    #[test]
    fn test_token_cap_rejects_before_verification() {
        let mut config = config();
        config.max_tokens = 5;
        let admission = SignatureAdmission::new(&config);
        let err = admission
            .admit(&request(
                r#"{"query": "query me {me b a c d}"}"#,
                &[(OP_HASH_HEADER, "irrelevant")],
            ))
            .unwrap_err();
        assert_eq!(err.client_message(), "cannot parse query");
    }

    #[test]
    fn test_unparseable_query() {
        let admission = SignatureAdmission::new(&config());
        let err = admission
            .admit(&request(
                r#"{"query": "query me {"}"#,
                &[(OP_HASH_HEADER, "irrelevant")],
            ))
            .unwrap_err();
        assert_eq!(err.client_message(), "cannot parse query");
    }

    #[test]
    fn test_no_sign_secret_admits_parseable_bodies() {
        let mut config = ProxyConfig::new("https://origin.example/graphql");
        config.pass_through_hash = None;
        config.sign_secret = None;
        let admission = SignatureAdmission::new(&config);

        let parsed = admitted(
            admission
                .admit(&request(r#"{"query": "query me { me }"}"#, &[]))
                .unwrap(),
        );
        assert!(!parsed.passthrough);

        let err = admission
            .admit(&request(r#"{"query": "query me {"}"#, &[]))
            .unwrap_err();
        assert_eq!(err.client_message(), "cannot parse query");
    }

    #[test]
    fn test_non_post_bypasses_policy() {
        let admission = SignatureAdmission::new(&config());
        let request = ClientRequest::new(
            Method::GET,
            Uri::from_static("/graphql"),
            HeaderMap::new(),
            Bytes::new(),
        );
        assert!(matches!(admission.admit(&request).unwrap(), AdmitOutcome::Bypass));
    }

    #[test]
    fn test_operation_name_and_variables_are_copied() {
        let admission = SignatureAdmission::new(&config());
        let signature = sign("query me($id: ID!) {me(id: $id)}");
        let parsed = admitted(
            admission
                .admit(&request(
                    r#"{"query": "query me($id: ID!) {me(id: $id)}",
                        "operationName": "me", "variables": {"id": "4"}}"#,
                    &[(OP_HASH_HEADER, &signature)],
                ))
                .unwrap(),
        );
        assert_eq!(parsed.operation_name.as_deref(), Some("me"));
        assert_eq!(parsed.variables, Some(serde_json::json!({"id": "4"})));
    }
}

//! Store-mode admission: resolve a named, preregistered operation.
//!
//! The client only ever names an entry; the query text forwarded upstream is
//! the registered one, so arbitrary queries cannot be injected through this
//! mode.

use std::{panic, panic::AssertUnwindSafe, sync::Arc};

use http::Method;
use serde_json::Value as JsonValue;

use palisade_error::{ProxyError, Result};

use crate::{
    admission::{AdmitOutcome, Admission, ParsedRequest},
    http::ClientRequest,
    ops::{OperationDefinition, OperationStore, Validator},
};

/// Candidate body keys for the operation name, in priority order.
const BODY_NAME_KEYS: [&str; 4] = ["op", "operationName", "operation", "query"];

/// Candidate query-string keys for the operation name, in priority order.
const QUERY_NAME_KEYS: [&str; 3] = ["op", "operation", "query"];

/// Candidate keys for variables, in priority order.
const VARIABLE_KEYS: [&str; 2] = ["v", "variables"];

/// Admission backed by an [`OperationStore`].
#[derive(Debug, Clone)]
pub struct StoreAdmission {
    store: Arc<OperationStore>,
}

impl StoreAdmission {
    /// Create store-mode admission over a shared store.
    #[must_use]
    pub fn new(store: Arc<OperationStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<OperationStore> {
        &self.store
    }

    fn extract(&self, request: &ClientRequest) -> Result<(Option<String>, Option<JsonValue>)> {
        if request.method == Method::POST {
            extract_from_body(request)
        } else if request.method == Method::GET {
            extract_from_query(request)
        } else {
            Err(ProxyError::MethodNotSupported)
        }
    }
}

impl Admission for StoreAdmission {
    fn admit(&self, request: &ClientRequest) -> Result<AdmitOutcome> {
        let (name, variables) = self.extract(request)?;
        let name = name.ok_or(ProxyError::MissingOperation)?;
        let definition = self
            .store
            .get(&name)
            .ok_or_else(|| ProxyError::operation_not_found(&name))?;

        let parsed = ParsedRequest {
            query:          definition.query.clone(),
            operation_name: Some(definition.name.clone()),
            variables,
            headers:        request.headers.clone(),
            operation:      Some(definition.clone()),
            passthrough:    false,
        };

        if let Some(validator) = self.store.validator(&definition.name) {
            run_validator(&validator, &definition, &parsed, request)?;
        }

        Ok(AdmitOutcome::Operation(Box::new(parsed)))
    }
}

fn extract_from_body(request: &ClientRequest) -> Result<(Option<String>, Option<JsonValue>)> {
    let decoded: JsonValue = serde_json::from_slice(&request.body)
        .map_err(|e| ProxyError::extraction(e.to_string()))?;
    let body = decoded
        .as_object()
        .ok_or_else(|| ProxyError::extraction("cannot extract request"))?;

    let name = BODY_NAME_KEYS
        .iter()
        .find_map(|key| body.get(*key).and_then(JsonValue::as_str))
        .map(ToString::to_string);

    let variables = VARIABLE_KEYS
        .iter()
        .find_map(|key| body.get(*key))
        .filter(|value| !value.is_null())
        .cloned();

    Ok((name, variables))
}

fn extract_from_query(request: &ClientRequest) -> Result<(Option<String>, Option<JsonValue>)> {
    let pairs = request.query_pairs();

    let name = QUERY_NAME_KEYS.iter().find_map(|key| {
        pairs
            .iter()
            .find(|(pair_key, _)| pair_key == key)
            .map(|(_, value)| value.clone())
    });

    let raw_variables = VARIABLE_KEYS.iter().find_map(|key| {
        pairs
            .iter()
            .find(|(pair_key, _)| pair_key == key)
            .map(|(_, value)| value.clone())
    });

    let variables = match raw_variables {
        Some(raw) if !raw.is_empty() => Some(
            serde_json::from_str(&raw).map_err(|e| ProxyError::extraction(e.to_string()))?,
        ),
        _ => None,
    };

    Ok((name, variables))
}

fn run_validator(
    validator: &Validator,
    definition: &OperationDefinition,
    parsed: &ParsedRequest,
    request: &ClientRequest,
) -> Result<()> {
    let outcome =
        panic::catch_unwind(AssertUnwindSafe(|| validator(definition, parsed, request)));

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(rejection)) => Err(ProxyError::validation(rejection.message)),
        Err(_) => {
            tracing::warn!(operation = %definition.name, "validator panicked");
            Err(ProxyError::validation("input validation"))
        },
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::{HeaderMap, Uri};
    use serde_json::json;

    use super::*;
    use crate::ops::{Behaviour, OperationKind, ValidationError};

    fn me_store() -> Arc<OperationStore> {
        Arc::new(OperationStore::from_definitions(vec![OperationDefinition {
            name:      "me".to_string(),
            kind:      OperationKind::Query,
            query:     "query me { me }".to_string(),
            behaviour: Behaviour::default(),
        }]))
    }

    fn post(body: &str) -> ClientRequest {
        ClientRequest::new(
            Method::POST,
            Uri::from_static("/graphql"),
            HeaderMap::new(),
            Bytes::from(body.to_string()),
        )
    }

    fn get(uri: &'static str) -> ClientRequest {
        ClientRequest::new(Method::GET, Uri::from_static(uri), HeaderMap::new(), Bytes::new())
    }

    fn admitted(outcome: AdmitOutcome) -> ParsedRequest {
        match outcome {
            AdmitOutcome::Operation(parsed) => *parsed,
            AdmitOutcome::Bypass => panic!("expected an admitted operation"),
        }
    }

    #[test]
    fn test_post_admits_registered_operation() {
        let admission = StoreAdmission::new(me_store());
        let parsed = admitted(admission.admit(&post(r#"{"op": "me"}"#)).unwrap());

        // The query comes from the registry, never the request.
        assert_eq!(parsed.query, "query me { me }");
        assert_eq!(parsed.operation_name.as_deref(), Some("me"));
        assert!(parsed.operation.is_some());
        assert!(!parsed.passthrough);
    }

    #[test]
    fn test_post_name_key_priority() {
        let admission = StoreAdmission::new(me_store());
        // `op` wins over `operationName`.
        let parsed = admitted(
            admission
                .admit(&post(r#"{"operationName": "ghost", "op": "me"}"#))
                .unwrap(),
        );
        assert_eq!(parsed.operation_name.as_deref(), Some("me"));

        // Fallback chain reaches `query`.
        let parsed = admitted(admission.admit(&post(r#"{"query": "me"}"#)).unwrap());
        assert_eq!(parsed.operation_name.as_deref(), Some("me"));
    }

    #[test]
    fn test_post_variables_key_priority() {
        let admission = StoreAdmission::new(me_store());
        let parsed = admitted(
            admission
                .admit(&post(r#"{"op": "me", "v": {"a": 1}, "variables": {"b": 2}}"#))
                .unwrap(),
        );
        assert_eq!(parsed.variables, Some(json!({"a": 1})));
    }

    #[test]
    fn test_client_query_text_is_ignored() {
        let admission = StoreAdmission::new(me_store());
        let parsed = admitted(
            admission
                .admit(&post(r#"{"op": "me", "query": "query evil { secrets }"}"#))
                .unwrap(),
        );
        assert_eq!(parsed.query, "query me { me }");
    }

    #[test]
    fn test_unregistered_operation_is_404() {
        let admission = StoreAdmission::new(Arc::new(OperationStore::from_definitions(vec![])));
        let err = admission.admit(&post(r#"{"op": "123"}"#)).unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.client_message(), "operation 123 not found");
    }

    #[test]
    fn test_missing_name_is_404() {
        let admission = StoreAdmission::new(me_store());
        let err = admission.admit(&post(r"{}")).unwrap_err();
        assert_eq!(err.client_message(), "no operation defined");
    }

    #[test]
    fn test_undecodable_body_is_404() {
        let admission = StoreAdmission::new(me_store());
        let err = admission.admit(&post("not json")).unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_non_object_body_is_404() {
        let admission = StoreAdmission::new(me_store());
        let err = admission.admit(&post("[1, 2]")).unwrap_err();
        assert_eq!(err.client_message(), "cannot extract request");
    }

    #[test]
    fn test_method_not_supported() {
        let admission = StoreAdmission::new(me_store());
        let request = ClientRequest::new(
            Method::DELETE,
            Uri::from_static("/graphql"),
            HeaderMap::new(),
            Bytes::new(),
        );
        let err = admission.admit(&request).unwrap_err();
        assert_eq!(err.client_message(), "method not supported");
    }

    #[test]
    fn test_get_extraction() {
        let admission = StoreAdmission::new(me_store());
        let parsed = admitted(
            admission
                .admit(&get("/graphql?op=me&variables=%7B%22id%22%3A%204%7D"))
                .unwrap(),
        );
        assert_eq!(parsed.operation_name.as_deref(), Some("me"));
        assert_eq!(parsed.variables, Some(json!({"id": 4})));
    }

    #[test]
    fn test_get_string_variables_must_decode() {
        let admission = StoreAdmission::new(me_store());
        let err = admission.admit(&get("/graphql?op=me&v=not-json")).unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_validator_rejection_is_400() {
        let store = me_store();
        store
            .set_validator(
                "me",
                Some(Arc::new(|_, parsed, _| {
                    if parsed.variables.is_none() {
                        Err(ValidationError::new("variables required"))
                    } else {
                        Ok(())
                    }
                })),
            )
            .unwrap();

        let admission = StoreAdmission::new(store);
        let err = admission.admit(&post(r#"{"op": "me"}"#)).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.client_message(), "variables required");
    }

    #[test]
    fn test_validator_panic_is_contained() {
        let store = me_store();
        store
            .set_validator("me", Some(Arc::new(|_, _, _| panic!("boom"))))
            .unwrap();

        let admission = StoreAdmission::new(store);
        let err = admission.admit(&post(r#"{"op": "me"}"#)).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.client_message(), "input validation");
    }

    #[test]
    fn test_validator_pass_admits() {
        let store = me_store();
        store.set_validator("me", Some(Arc::new(|_, _, _| Ok(())))).unwrap();

        let admission = StoreAdmission::new(store);
        assert!(admission.admit(&post(r#"{"op": "me"}"#)).is_ok());
    }
}

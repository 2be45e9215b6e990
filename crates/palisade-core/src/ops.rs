//! Registry of preknown operations.
//!
//! In store mode a client names an entry here and the proxy executes the
//! registered query text, never the client's own. The store is loaded once
//! at startup from a JSON manifest produced out-of-band by codegen:
//!
//! ```json
//! [{"operationName": "me", "operationType": "query",
//!   "query": "query me { me }", "behaviour": {"ttl": 60}}]
//! ```
//!
//! The data side is immutable after construction; the only writer path is
//! [`OperationStore::set_validator`], expected to run during initialization
//! ("configure fully, then serve").

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use palisade_error::{ProxyError, Result};

use crate::{admission::ParsedRequest, http::ClientRequest};

/// Operation kind, mirroring the GraphQL operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// A read operation.
    Query,
    /// A write operation.
    Mutation,
    /// A subscription (registered but not transported by the proxy).
    Subscription,
}

/// Open key/value behaviour map attached to an operation.
///
/// The proxy recognizes `ttl` (non-negative seconds, consumed by caching
/// layers downstream); unrecognized keys are preserved verbatim.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Behaviour(BTreeMap<String, JsonValue>);

impl Behaviour {
    /// Cache lifetime in seconds, when configured.
    #[must_use]
    pub fn ttl(&self) -> Option<u64> {
        self.0.get("ttl").and_then(JsonValue::as_u64)
    }

    /// Raw access to a behaviour key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }
}

/// An immutable registered operation.
#[derive(Debug, Clone)]
pub struct OperationDefinition {
    /// Operation name, the store key.
    pub name: String,

    /// Operation kind.
    pub kind: OperationKind,

    /// The query text the proxy will execute for this operation.
    pub query: String,

    /// Behaviour hints for downstream layers.
    pub behaviour: Behaviour,
}

/// Manifest entry as emitted by the codegen tool.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestEntry {
    operation_name: String,
    operation_type: OperationKind,
    query:          String,
    #[serde(default)]
    behaviour:      Behaviour,
}

impl From<ManifestEntry> for OperationDefinition {
    fn from(entry: ManifestEntry) -> Self {
        Self {
            name:      entry.operation_name,
            kind:      entry.operation_type,
            query:     entry.query,
            behaviour: entry.behaviour,
        }
    }
}

/// Error returned by a validator to reject a request.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Message forwarded to the client with status 400.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Per-operation validator callable.
///
/// Runs after operation resolution and before proxying; a non-`Ok` return
/// becomes a 400 response carrying the validator's message.
pub type ValidatorFn = dyn Fn(&OperationDefinition, &ParsedRequest, &ClientRequest) -> std::result::Result<(), ValidationError>
    + Send
    + Sync;

/// Shared, reference-counted validator.
pub type Validator = Arc<ValidatorFn>;

/// Mapping from operation name to definition, plus per-operation validators.
///
/// Safe for concurrent readers; `set_validator` takes a write lock and must
/// not overlap reads in latency-sensitive paths.
pub struct OperationStore {
    operations: HashMap<String, Arc<OperationDefinition>>,
    validators: RwLock<HashMap<String, Validator>>,
}

impl std::fmt::Debug for OperationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationStore")
            .field("operations", &self.operations.len())
            .field("validators", &self.validators.read().len())
            .finish()
    }
}

impl OperationStore {
    /// Build a store from a finite list of definitions. Later duplicates
    /// overwrite earlier ones.
    #[must_use]
    pub fn from_definitions(definitions: Vec<OperationDefinition>) -> Self {
        let operations = definitions
            .into_iter()
            .map(|definition| (definition.name.clone(), Arc::new(definition)))
            .collect();
        Self {
            operations,
            validators: RwLock::new(HashMap::new()),
        }
    }

    /// Load a store from a JSON manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Configuration`] when the manifest does not
    /// decode.
    pub fn from_manifest_slice(manifest: &[u8]) -> Result<Self> {
        let entries: Vec<ManifestEntry> = serde_json::from_slice(manifest)
            .map_err(|e| ProxyError::config(format!("invalid operations manifest: {e}")))?;
        Ok(Self::from_definitions(
            entries.into_iter().map(OperationDefinition::from).collect(),
        ))
    }

    /// Look up an operation by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<OperationDefinition>> {
        self.operations.get(name).cloned()
    }

    /// All registered operations, in no particular order.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<OperationDefinition>> {
        self.operations.values().cloned().collect()
    }

    /// Install or clear the validator for a registered operation.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::OperationNotFound`] when `name` was not
    /// registered at construction.
    pub fn set_validator(&self, name: &str, validator: Option<Validator>) -> Result<()> {
        if !self.operations.contains_key(name) {
            return Err(ProxyError::operation_not_found(name));
        }

        let mut validators = self.validators.write();
        match validator {
            Some(validator) => {
                validators.insert(name.to_string(), validator);
            },
            None => {
                validators.remove(name);
            },
        }
        Ok(())
    }

    /// The validator installed for `name`, if any.
    #[must_use]
    pub fn validator(&self, name: &str) -> Option<Validator> {
        self.validators.read().get(name).cloned()
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the store has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

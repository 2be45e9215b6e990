//! Palisade server: the HTTP surface over the policy engine.
//!
//! The core is listener-agnostic; this crate binds it to axum, loads
//! configuration from TOML plus `PALISADE_*` environment overrides, and
//! emits per-request reports through a tracing-backed sink.

use std::sync::Arc;

use palisade_core::{
    admission::{SignatureAdmission, StoreAdmission},
    ops::OperationStore,
    pipeline::AdmissionMode,
    proxy::{HttpOriginFetch, ProxyStage},
    shape::ResponseShaper,
    ProxyPipeline, TracingReportSink,
};
use palisade_error::{ProxyError, Result};

pub mod config;
pub mod routes;
pub mod state;

pub use config::{AdmissionModeSetting, ServerConfig};
pub use state::AppState;

/// Assemble the pipeline and application state from validated
/// configuration.
///
/// # Errors
///
/// Returns [`ProxyError::Configuration`] when the manifest cannot be read
/// or the origin URL is unusable.
pub fn build_state(config: &ServerConfig) -> Result<AppState> {
    let admission = match config.mode {
        AdmissionModeSetting::Signature => {
            AdmissionMode::Signature(SignatureAdmission::new(&config.proxy))
        },
        AdmissionModeSetting::Store => {
            let path = config
                .operations_manifest
                .as_ref()
                .ok_or_else(|| ProxyError::config("store mode requires operations_manifest"))?;
            let manifest = std::fs::read(path).map_err(|e| {
                ProxyError::config(format!("cannot read {}: {e}", path.display()))
            })?;
            let store = OperationStore::from_manifest_slice(&manifest)?;
            tracing::info!(operations = store.len(), "operation store loaded");
            AdmissionMode::Store(StoreAdmission::new(Arc::new(store)))
        },
    };

    let fetch = Arc::new(HttpOriginFetch::new()?);
    let pipeline = ProxyPipeline::new(
        admission,
        ProxyStage::new(&config.proxy.origin_url, fetch)?,
        ResponseShaper::new(config.proxy.response_rules.clone()),
    );

    Ok(AppState::new(pipeline, Arc::new(TracingReportSink)))
}

//! Shared application state.

use std::sync::Arc;

use palisade_core::{report::ReportSink, ProxyPipeline};

/// State handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    /// The assembled policy pipeline.
    pub pipeline: Arc<ProxyPipeline>,

    /// Where finalized reports go.
    pub reports: Arc<dyn ReportSink>,
}

impl AppState {
    /// Create application state.
    #[must_use]
    pub fn new(pipeline: ProxyPipeline, reports: Arc<dyn ReportSink>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            reports,
        }
    }
}

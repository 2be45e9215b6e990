//! Palisade core: the policy engine of an edge proxy for GraphQL.
//!
//! The crate decides whether a request is admitted (preshared passthrough
//! token or HMAC signature over a canonical document, or resolution against
//! a preregistered operation store), forwards it to the origin with hop
//! headers rewritten, shapes the response (suggestion masking, extensions
//! stripping), and records a structured per-request report.
//!
//! The network listener is not here: the hosting runtime hands the pipeline
//! a fully read [`ClientRequest`](http::ClientRequest) and sends the
//! returned [`ClientResponse`](http::ClientResponse) back. The origin fetch
//! sits behind the [`OriginFetch`](proxy::OriginFetch) trait so tests and
//! caching layers can interpose.
//!
//! ```ignore
//! use std::sync::Arc;
//! use palisade_core::{
//!     admission::SignatureAdmission,
//!     config::ProxyConfig,
//!     pipeline::{AdmissionMode, ProxyPipeline},
//!     proxy::{HttpOriginFetch, ProxyStage},
//!     shape::ResponseShaper,
//! };
//!
//! let config = ProxyConfig::new("https://origin.example/graphql");
//! let fetch = Arc::new(HttpOriginFetch::new()?);
//! let pipeline = ProxyPipeline::new(
//!     AdmissionMode::Signature(SignatureAdmission::new(&config)),
//!     ProxyStage::new(&config.origin_url, fetch)?,
//!     ResponseShaper::new(config.response_rules.clone()),
//! );
//! let outcome = pipeline.run(request).await;
//! ```

pub mod admission;
pub mod config;
pub mod crypto;
pub mod document;
pub mod http;
pub mod ops;
pub mod pipeline;
pub mod proxy;
pub mod report;
pub mod shape;

pub use admission::{AdmitOutcome, Admission, ParsedRequest};
pub use config::{ProxyConfig, ResponseRules, SignSecret};
pub use ops::{OperationDefinition, OperationStore, ValidationError};
pub use pipeline::{AdmissionMode, Hooks, NoopHooks, PipelineOutcome, ProxyPipeline};
pub use report::{Report, ReportCollector, ReportContext, ReportSink, TracingReportSink};

// Re-exported so downstream crates match pipeline errors without a direct
// dependency on the error crate.
pub use palisade_error::{ProxyError, Result};

//! The stage orchestrator.
//!
//! One request flows admission → proxy → decode → shape → collect, in
//! strict program order. Hooks observe the stage outputs through a typed,
//! caller-chosen context; they cannot veto a decision, and a panicking hook
//! is contained so the primary response path survives. Every failure is
//! funneled into a client response plus a report; no stage escapes with a
//! panic of its own.

use std::panic::{self, AssertUnwindSafe};

use serde_json::Value as JsonValue;

use palisade_error::{ProxyError, Result};

use crate::{
    admission::{AdmitOutcome, Admission, ParsedRequest, SignatureAdmission, StoreAdmission},
    http::{ClientRequest, ClientResponse, OriginResponse},
    proxy::ProxyStage,
    report::{Report, ReportCollector, ReportContext},
    shape::ResponseShaper,
};

/// Observer interface over the pipeline's fixed phases.
///
/// Each method runs exactly once per request, in order, with a mutable
/// reference to the caller's per-request context. Default bodies observe
/// nothing, so implementors override only the phases they care about.
pub trait Hooks: Send + Sync {
    /// Caller-chosen per-request context; a fresh value is created for
    /// every request.
    type Ctx: Default + Send;

    /// After admission produced a [`ParsedRequest`].
    fn on_request_parsed(&self, _parsed: &ParsedRequest, _ctx: &mut Self::Ctx) {}

    /// After the origin answered.
    fn on_proxied(&self, _response: &OriginResponse, _ctx: &mut Self::Ctx) {}

    /// After the origin payload decoded, before shaping mutates it.
    fn on_response_parsed(&self, _payload: &JsonValue, _ctx: &mut Self::Ctx) {}

    /// After the client response is final.
    fn on_complete(&self, _response: &ClientResponse, _ctx: &mut Self::Ctx) {}
}

/// Hooks that observe nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl Hooks for NoopHooks {
    type Ctx = ();
}

/// What one pipeline run produced.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// The response to send to the client.
    pub response: ClientResponse,

    /// The observability report, when any observation point fired.
    pub report: Option<Report>,
}

/// The admission strategy in use, selected by configuration.
#[derive(Debug)]
pub enum AdmissionMode {
    /// Operation-store resolution.
    Store(StoreAdmission),

    /// Signature verification.
    Signature(SignatureAdmission),
}

impl Admission for AdmissionMode {
    fn admit(&self, request: &ClientRequest) -> Result<AdmitOutcome> {
        match self {
            Self::Store(admission) => admission.admit(request),
            Self::Signature(admission) => admission.admit(request),
        }
    }
}

/// The assembled pipeline.
pub struct ProxyPipeline<H: Hooks = NoopHooks> {
    admission: AdmissionMode,
    proxy:     ProxyStage,
    shaper:    ResponseShaper,
    collector: ReportCollector,
    hooks:     H,
}

impl ProxyPipeline<NoopHooks> {
    /// Assemble a pipeline with no caller hooks.
    #[must_use]
    pub fn new(admission: AdmissionMode, proxy: ProxyStage, shaper: ResponseShaper) -> Self {
        Self {
            admission,
            proxy,
            shaper,
            collector: ReportCollector,
            hooks: NoopHooks,
        }
    }
}

impl<H: Hooks> ProxyPipeline<H> {
    /// Replace the hook set, keeping the assembled stages.
    #[must_use]
    pub fn with_hooks<H2: Hooks>(self, hooks: H2) -> ProxyPipeline<H2> {
        ProxyPipeline {
            admission: self.admission,
            proxy: self.proxy,
            shaper: self.shaper,
            collector: self.collector,
            hooks,
        }
    }

    /// Run one request through all five stages.
    pub async fn run(&self, request: ClientRequest) -> PipelineOutcome {
        let mut ctx = H::Ctx::default();
        let mut report_ctx = ReportContext::new();

        let parsed = match self.admission.admit(&request) {
            Ok(AdmitOutcome::Operation(parsed)) => *parsed,
            Ok(AdmitOutcome::Bypass) => {
                // Outside the policy surface: forward verbatim, no report.
                let response = match self.proxy.forward_raw(&request).await {
                    Ok(origin) => origin.into_client_response(),
                    Err(error) => self.classify_transport(&error),
                };
                return PipelineOutcome {
                    response,
                    report: None,
                };
            },
            Err(error) => {
                report_ctx.record_admission_failure(&error);
                return self.complete(ClientResponse::from_error(&error), &report_ctx, &mut ctx);
            },
        };

        report_ctx.record_parsed(&parsed);
        self.dispatch("on_request_parsed", |hooks, ctx| {
            hooks.on_request_parsed(&parsed, ctx);
        }, &mut ctx);

        let origin = match self.proxy.forward(&parsed).await {
            Ok(origin) => origin,
            Err(error) => {
                report_ctx.record_transport_failure(&error);
                let response = self.classify_transport(&error);
                return self.complete(response, &report_ctx, &mut ctx);
            },
        };

        report_ctx.record_proxied(&origin);
        self.dispatch("on_proxied", |hooks, ctx| {
            hooks.on_proxied(&origin, ctx);
        }, &mut ctx);

        let response = if self.shaper.wants_shaping(&origin) {
            match self.shaper.decode(&origin) {
                Ok(mut payload) => {
                    report_ctx.record_response_parsed(&payload);
                    self.dispatch("on_response_parsed", |hooks, ctx| {
                        hooks.on_response_parsed(&payload, ctx);
                    }, &mut ctx);

                    if parsed.passthrough && !self.shaper.shapes_passthrough() {
                        origin.into_client_response()
                    } else {
                        self.shaper.apply(&mut payload);
                        let mut headers = origin.headers;
                        ResponseShaper::rewrite_headers(&mut headers);
                        ClientResponse {
                            status: origin.status,
                            headers,
                            body: serde_json::to_vec(&payload).unwrap_or_default().into(),
                        }
                    }
                },
                Err(error) => ClientResponse::from_error(&error),
            }
        } else {
            origin.into_client_response()
        };

        self.complete(response, &report_ctx, &mut ctx)
    }

    fn complete(
        &self,
        response: ClientResponse,
        report_ctx: &ReportContext,
        ctx: &mut H::Ctx,
    ) -> PipelineOutcome {
        self.dispatch("on_complete", |hooks, hook_ctx| {
            hooks.on_complete(&response, hook_ctx);
        }, ctx);

        PipelineOutcome {
            report: self.collector.finalize(report_ctx),
            response,
        }
    }

    /// Transport failures surface as a fixed 500; the detail only lives in
    /// the report.
    fn classify_transport(&self, error: &ProxyError) -> ClientResponse {
        tracing::warn!(error = %error, "origin fetch failed");
        ClientResponse::from_error(error)
    }

    /// Run a hook with panic containment; a hook cannot fail the request.
    fn dispatch<F>(&self, name: &str, hook: F, ctx: &mut H::Ctx)
    where
        F: FnOnce(&H, &mut H::Ctx),
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| hook(&self.hooks, ctx)));
        if outcome.is_err() {
            tracing::warn!(hook = name, "hook panicked; request continues");
        }
    }
}

impl<H: Hooks> std::fmt::Debug for ProxyPipeline<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyPipeline")
            .field("admission", &self.admission)
            .field("proxy", &self.proxy)
            .finish()
    }
}

//! The policy endpoint.
//!
//! Every method reaches the same handler; the pipeline itself decides
//! whether a method is admitted, bypassed, or rejected, depending on the
//! configured admission mode. The pipeline runs on a detached task so a
//! client disconnect cannot cancel it mid-flight; the report is emitted
//! either way.

use axum::{
    body::Body,
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use tracing::Instrument;
use uuid::Uuid;

use palisade_core::http::{ClientRequest, ClientResponse};
use palisade_error::ProxyError;

use crate::state::AppState;

/// Request bodies past this size are rejected before admission.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Forward one request through the policy pipeline.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(error = %error, "request body rejected");
            return ProxyError::invalid_body(error.to_string()).into_response();
        },
    };

    let client_request = ClientRequest::new(parts.method, parts.uri, parts.headers, body);
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("proxy_request", id = %request_id);

    let task_state = state.clone();
    let task = tokio::spawn(
        async move {
            let outcome = task_state.pipeline.run(client_request).await;

            if let Some(report) = outcome.report {
                let sink = task_state.reports.clone();
                tokio::spawn(async move {
                    sink.emit(report).await;
                });
            }

            outcome.response
        }
        .instrument(span),
    );

    match task.await {
        Ok(response) => into_axum_response(response),
        Err(error) => {
            tracing::error!(error = %error, "pipeline task failed");
            ProxyError::internal("pipeline task failed").into_response()
        },
    }
}

fn into_axum_response(response: ClientResponse) -> Response {
    let mut builder = http::Response::builder().status(response.status);
    if let Some(headers) = builder.headers_mut() {
        headers.extend(response.headers);
    }

    match builder.body(Body::from(response.body)) {
        Ok(response) => response,
        Err(error) => {
            tracing::error!(error = %error, "cannot assemble response");
            ProxyError::internal("cannot assemble response").into_response()
        },
    }
}

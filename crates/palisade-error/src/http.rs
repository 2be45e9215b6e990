//! HTTP integration for [`ProxyError`](crate::ProxyError).
//!
//! Only compiled with the `axum-compat` feature, so pure logic crates can
//! depend on `palisade-error` without pulling in an HTTP stack.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::ProxyError;

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.client_body())).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        response
    }
}

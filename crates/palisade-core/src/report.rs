//! Per-request observability reports.
//!
//! Stages never talk to the collector directly: the pipeline stamps a
//! [`ReportContext`] at each observation point and the collector turns the
//! stamped context into a [`Report`] on finalization. Reports are emitted
//! through a [`ReportSink`] after the response has left, so observability
//! never sits on the response path.

use std::{collections::BTreeMap, time::Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use palisade_error::ProxyError;

use crate::{admission::ParsedRequest, http::OriginResponse};

/// Phase durations in milliseconds. A missing observation zeroes its phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Durations {
    /// Admission/parse time.
    pub parsing: u64,

    /// Origin fetch time.
    pub proxying: u64,

    /// Shaping and delivery time.
    pub processing: u64,

    /// Wall-clock total for the request.
    pub total: u64,
}

/// Structured outcome of one request.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// True exactly when the origin answered 2xx–3xx with a non-null `data`
    /// field and no (or an empty) `errors` array.
    pub ok: bool,

    /// Origin status, when the proxy stage ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_status: Option<u16>,

    /// Operation name, when admission resolved one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,

    /// The forwarded query text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// UTF-8 byte length of the serialized variables.
    pub input_size: u64,

    /// Response size: the origin's `content-size` header when parseable,
    /// actual body length otherwise.
    pub response_size: u64,

    /// Response-shape fingerprint: JSON path to occurrence count over the
    /// `data` tree, with array fan-out aggregated per path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_map: Option<BTreeMap<String, u64>>,

    /// Upstream GraphQL errors when present, a synthesized
    /// `[{message, status}]` otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<JsonValue>>,

    /// Phase durations.
    pub durations: Durations,
}

#[derive(Debug)]
struct ParsedStamp {
    at:             Instant,
    operation_name: Option<String>,
    query:          Option<String>,
    input_size:     u64,
}

#[derive(Debug)]
struct ProxiedStamp {
    at:            Instant,
    status:        u16,
    declared_size: Option<u64>,
    body_size:     u64,
    body_excerpt:  Option<String>,
}

#[derive(Debug)]
struct ResponseStamp {
    payload: JsonValue,
}

/// Mutable per-request workspace threading observation points across
/// stages. Owned exclusively by one pipeline run.
#[derive(Debug)]
pub struct ReportContext {
    started_at:        Instant,
    parsed:            Option<ParsedStamp>,
    proxied:           Option<ProxiedStamp>,
    response:          Option<ResponseStamp>,
    admission_failure: Option<String>,
    transport_failure: Option<String>,
}

impl ReportContext {
    /// Open a context; `started_at` is captured now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at:        Instant::now(),
            parsed:            None,
            proxied:           None,
            response:          None,
            admission_failure: None,
            transport_failure: None,
        }
    }

    /// Stamp a successful admission.
    pub fn record_parsed(&mut self, parsed: &ParsedRequest) {
        self.parsed = Some(ParsedStamp {
            at:             Instant::now(),
            operation_name: parsed.operation_name.clone(),
            query:          Some(parsed.query.clone()),
            input_size:     parsed.input_size(),
        });
    }

    /// Stamp an admission failure.
    pub fn record_admission_failure(&mut self, error: &ProxyError) {
        self.parsed = Some(ParsedStamp {
            at:             Instant::now(),
            operation_name: None,
            query:          None,
            input_size:     0,
        });
        self.admission_failure = Some(error.client_message());
    }

    /// Stamp the origin response.
    pub fn record_proxied(&mut self, response: &OriginResponse) {
        let declared_size = response
            .headers
            .get("content-size")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());

        let body_excerpt = if response.status.as_u16() >= 400 {
            Some(String::from_utf8_lossy(&response.body).into_owned())
        } else {
            None
        };

        self.proxied = Some(ProxiedStamp {
            at: Instant::now(),
            status: response.status.as_u16(),
            declared_size,
            body_size: response.body.len() as u64,
            body_excerpt,
        });
    }

    /// Stamp a transport failure; the error's detail is preserved.
    pub fn record_transport_failure(&mut self, error: &ProxyError) {
        self.transport_failure = Some(error.to_string());
    }

    /// Stamp the decoded origin payload, pre-shaping.
    pub fn record_response_parsed(&mut self, payload: &JsonValue) {
        self.response = Some(ResponseStamp {
            payload: payload.clone(),
        });
    }

    /// Whether no observation point ever fired.
    #[must_use]
    pub fn is_untouched(&self) -> bool {
        self.parsed.is_none()
            && self.proxied.is_none()
            && self.response.is_none()
            && self.admission_failure.is_none()
            && self.transport_failure.is_none()
    }
}

impl Default for ReportContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns a stamped [`ReportContext`] into a [`Report`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportCollector;

impl ReportCollector {
    /// Finalize a context. Returns `None` when the pipeline short-circuited
    /// before any observation point.
    #[must_use]
    pub fn finalize(&self, context: &ReportContext) -> Option<Report> {
        if context.is_untouched() {
            return None;
        }

        let completed_at = Instant::now();
        let durations = compute_durations(context, completed_at);

        let payload = context.response.as_ref().map(|stamp| &stamp.payload);
        let origin_status = context.proxied.as_ref().map(|stamp| stamp.status);

        let data_present = payload
            .and_then(|payload| payload.get("data"))
            .is_some_and(|data| !data.is_null());
        let upstream_errors = payload
            .and_then(|payload| payload.get("errors"))
            .and_then(JsonValue::as_array)
            .filter(|errors| !errors.is_empty());

        let ok = origin_status.is_some_and(|status| (200..400).contains(&status))
            && data_present
            && upstream_errors.is_none();

        let errors = collect_errors(context, upstream_errors.map(Vec::as_slice));

        let response_map = payload
            .and_then(|payload| payload.get("data"))
            .and_then(JsonValue::as_object)
            .map(|data| {
                let mut map = BTreeMap::new();
                for (key, value) in data {
                    walk_value(&mut map, &format!("$.{key}"), value);
                }
                map
            });

        Some(Report {
            ok,
            origin_status,
            operation_name: context
                .parsed
                .as_ref()
                .and_then(|stamp| stamp.operation_name.clone()),
            query: context.parsed.as_ref().and_then(|stamp| stamp.query.clone()),
            input_size: context
                .parsed
                .as_ref()
                .map_or(0, |stamp| stamp.input_size),
            response_size: context
                .proxied
                .as_ref()
                .map_or(0, |stamp| stamp.declared_size.unwrap_or(stamp.body_size)),
            response_map,
            errors,
            durations,
        })
    }
}

fn compute_durations(context: &ReportContext, completed_at: Instant) -> Durations {
    let millis = |later: Instant, earlier: Instant| -> u64 {
        later.duration_since(earlier).as_millis() as u64
    };

    let parsing = context
        .parsed
        .as_ref()
        .map_or(0, |parsed| millis(parsed.at, context.started_at));
    let proxying = match (&context.parsed, &context.proxied) {
        (Some(parsed), Some(proxied)) => millis(proxied.at, parsed.at),
        _ => 0,
    };
    let processing = context
        .proxied
        .as_ref()
        .map_or(0, |proxied| millis(completed_at, proxied.at));

    Durations {
        parsing,
        proxying,
        processing,
        total: millis(completed_at, context.started_at),
    }
}

fn collect_errors(
    context: &ReportContext,
    upstream_errors: Option<&[JsonValue]>,
) -> Option<Vec<JsonValue>> {
    if let Some(message) = &context.admission_failure {
        return Some(vec![json!({ "message": format!("cannot parse: {message}") })]);
    }

    if let Some(errors) = upstream_errors {
        return Some(errors.to_vec());
    }

    if let Some(message) = &context.transport_failure {
        return Some(vec![json!({ "message": message })]);
    }

    let proxied = context.proxied.as_ref()?;
    if proxied.status >= 400 {
        let message = proxied
            .body_excerpt
            .clone()
            .unwrap_or_else(|| "upstream error".to_string());
        return Some(vec![json!({ "message": message, "status": proxied.status })]);
    }

    None
}

/// Depth-first response fingerprint. Arrays contribute their length at
/// their own path and elements are walked under the same path, so fan-out
/// aggregates instead of exploding into indexed paths.
fn walk_value(map: &mut BTreeMap<String, u64>, path: &str, value: &JsonValue) {
    match value {
        JsonValue::Array(items) => {
            *map.entry(path.to_string()).or_insert(0) += items.len() as u64;
            for item in items {
                match item {
                    JsonValue::Object(fields) => {
                        for (key, child) in fields {
                            walk_value(map, &format!("{path}.{key}"), child);
                        }
                    },
                    JsonValue::Array(_) => walk_value(map, path, item),
                    // Scalar elements are already aggregated into the length.
                    _ => {},
                }
            }
        },
        JsonValue::Object(fields) => {
            *map.entry(path.to_string()).or_insert(0) += 1;
            for (key, child) in fields {
                walk_value(map, &format!("{path}.{key}"), child);
            }
        },
        _ => {
            *map.entry(path.to_string()).or_insert(0) += 1;
        },
    }
}

/// Receives finalized reports, off the response path.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Consume one report.
    async fn emit(&self, report: Report);
}

/// Sink that logs reports as structured tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReportSink;

#[async_trait]
impl ReportSink for TracingReportSink {
    async fn emit(&self, report: Report) {
        let encoded = serde_json::to_string(&report).unwrap_or_default();
        tracing::info!(
            target: "palisade::report",
            ok = report.ok,
            operation = report.operation_name.as_deref().unwrap_or(""),
            total_ms = report.durations.total,
            report = %encoded,
            "request report"
        );
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue, StatusCode};

    use super::*;

    fn parsed_request(variables: Option<JsonValue>) -> ParsedRequest {
        ParsedRequest {
            query: "query me { me }".to_string(),
            operation_name: Some("me".to_string()),
            variables,
            headers: HeaderMap::new(),
            operation: None,
            passthrough: false,
        }
    }

    fn origin_response(status: StatusCode, body: &JsonValue) -> OriginResponse {
        OriginResponse {
            status,
            headers: HeaderMap::new(),
            body: Bytes::from(serde_json::to_vec(body).unwrap()),
        }
    }

    fn successful_context(payload: &JsonValue) -> ReportContext {
        let mut context = ReportContext::new();
        context.record_parsed(&parsed_request(None));
        context.record_proxied(&origin_response(StatusCode::OK, payload));
        context.record_response_parsed(payload);
        context
    }

    #[test]
    fn test_untouched_context_yields_no_report() {
        let context = ReportContext::new();
        assert!(ReportCollector.finalize(&context).is_none());
    }

    #[test]
    fn test_successful_request() {
        let payload = json!({"data": {"me": "me"}, "errors": []});
        let report = ReportCollector.finalize(&successful_context(&payload)).unwrap();

        assert!(report.ok);
        assert_eq!(report.origin_status, Some(200));
        assert_eq!(report.operation_name.as_deref(), Some("me"));
        assert_eq!(report.query.as_deref(), Some("query me { me }"));
        assert_eq!(
            report.response_map.unwrap().get("$.me").copied(),
            Some(1)
        );
        assert!(report.errors.is_none());
    }

    #[test]
    fn test_durations_are_consistent() {
        let payload = json!({"data": {"me": "me"}});
        let report = ReportCollector.finalize(&successful_context(&payload)).unwrap();
        let durations = &report.durations;
        assert!(
            durations.total
                >= durations.parsing + durations.proxying + durations.processing
        );
    }

    #[test]
    fn test_null_data_is_not_ok() {
        let payload = json!({"data": null});
        let report = ReportCollector.finalize(&successful_context(&payload)).unwrap();
        assert!(!report.ok);
    }

    #[test]
    fn test_upstream_errors_are_preferred() {
        let payload = json!({
            "data": {"me": null},
            "errors": [{"message": "Did you mean \"name\""}]
        });
        let report = ReportCollector.finalize(&successful_context(&payload)).unwrap();

        assert!(!report.ok);
        // Pre-mask form is preserved.
        assert_eq!(
            report.errors.unwrap()[0]["message"],
            "Did you mean \"name\""
        );
    }

    #[test]
    fn test_error_status_synthesizes_errors() {
        let mut context = ReportContext::new();
        context.record_parsed(&parsed_request(None));
        context.record_proxied(&OriginResponse {
            status:  StatusCode::BAD_GATEWAY,
            headers: HeaderMap::new(),
            body:    Bytes::from_static(b"upstream exploded"),
        });

        let report = ReportCollector.finalize(&context).unwrap();
        assert!(!report.ok);
        let errors = report.errors.unwrap();
        assert_eq!(errors[0]["message"], "upstream exploded");
        assert_eq!(errors[0]["status"], 502);
    }

    #[test]
    fn test_admission_failure_report() {
        let mut context = ReportContext::new();
        context.record_admission_failure(&ProxyError::query_parse("token cap"));

        let report = ReportCollector.finalize(&context).unwrap();
        assert!(!report.ok);
        assert_eq!(report.durations.proxying, 0);
        assert_eq!(report.durations.processing, 0);
        assert_eq!(
            report.errors.unwrap()[0]["message"],
            "cannot parse: cannot parse query"
        );
    }

    #[test]
    fn test_transport_failure_preserves_message() {
        let mut context = ReportContext::new();
        context.record_parsed(&parsed_request(None));
        context.record_transport_failure(&ProxyError::transport("connection refused"));

        let report = ReportCollector.finalize(&context).unwrap();
        assert!(!report.ok);
        let message = report.errors.unwrap()[0]["message"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(message.contains("connection refused"));
    }

    #[test]
    fn test_input_size_counts_variables() {
        let mut context = ReportContext::new();
        context.record_parsed(&parsed_request(Some(json!({"id": 1}))));
        let report = ReportCollector.finalize(&context).unwrap();
        assert_eq!(report.input_size, 8);
    }

    #[test]
    fn test_response_size_prefers_content_size_header() {
        let mut context = ReportContext::new();
        context.record_parsed(&parsed_request(None));

        let mut response = origin_response(StatusCode::OK, &json!({"data": {}}));
        response
            .headers
            .insert("content-size", HeaderValue::from_static("4096"));
        context.record_proxied(&response);

        let report = ReportCollector.finalize(&context).unwrap();
        assert_eq!(report.response_size, 4096);
    }

    #[test]
    fn test_response_size_falls_back_to_body_length() {
        let payload = json!({"data": {"me": "me"}});
        let body_len = serde_json::to_vec(&payload).unwrap().len() as u64;
        let report = ReportCollector.finalize(&successful_context(&payload)).unwrap();
        assert_eq!(report.response_size, body_len);
    }

    #[test]
    fn test_unparseable_content_size_falls_back() {
        let mut context = ReportContext::new();
        context.record_parsed(&parsed_request(None));

        let mut response = origin_response(StatusCode::OK, &json!({"data": {}}));
        response
            .headers
            .insert("content-size", HeaderValue::from_static("not-a-number"));
        context.record_proxied(&response);

        let report = ReportCollector.finalize(&context).unwrap();
        assert_eq!(report.response_size, response.body.len() as u64);
    }

    #[test]
    fn test_response_map_scalars_and_nesting() {
        let payload = json!({
            "data": {
                "me": {"id": 1, "profile": {"bio": "hi"}}
            }
        });
        let report = ReportCollector.finalize(&successful_context(&payload)).unwrap();
        let map = report.response_map.unwrap();

        assert_eq!(map.get("$.me").copied(), Some(1));
        assert_eq!(map.get("$.me.id").copied(), Some(1));
        assert_eq!(map.get("$.me.profile").copied(), Some(1));
        assert_eq!(map.get("$.me.profile.bio").copied(), Some(1));
    }

    #[test]
    fn test_response_map_aggregates_arrays() {
        let payload = json!({
            "data": {
                "users": [
                    {"id": 1},
                    {"id": 2},
                    {"id": 3}
                ]
            }
        });
        let report = ReportCollector.finalize(&successful_context(&payload)).unwrap();
        let map = report.response_map.unwrap();

        // The array's own path counts its length; elements share the path.
        assert_eq!(map.get("$.users").copied(), Some(3));
        assert_eq!(map.get("$.users.id").copied(), Some(3));
        assert!(!map.keys().any(|key| key.contains('0')));
    }

    #[test]
    fn test_response_map_absent_without_data() {
        let payload = json!({"errors": [{"message": "nope"}]});
        let report = ReportCollector.finalize(&successful_context(&payload)).unwrap();
        assert!(report.response_map.is_none());
    }

    #[test]
    fn test_report_serializes_without_empty_fields() {
        let mut context = ReportContext::new();
        context.record_admission_failure(&ProxyError::MissingQuery);
        let report = ReportCollector.finalize(&context).unwrap();

        let encoded = serde_json::to_value(&report).unwrap();
        assert!(encoded.get("origin_status").is_none());
        assert!(encoded.get("response_map").is_none());
        assert!(encoded.get("errors").is_some());
    }
}

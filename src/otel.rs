//! Inbound distributed-trace context extraction.

use actix_web::http::header::HeaderMap;
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::TraceContextExt as _;
use opentelemetry::Context;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt as _;

use crate::fields;

struct HeaderCarrier<'a> {
    headers: &'a HeaderMap,
}

impl Extractor for HeaderCarrier<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|name| name.as_str()).collect()
    }
}

/// Extract an upstream trace context from the request headers.
///
/// Returns `None` when the globally configured propagator finds no usable
/// context — absent headers and malformed ones alike. This is not an error:
/// the caller starts a new root trace instead.
pub(crate) fn extract_parent_context(headers: &HeaderMap) -> Option<Context> {
    let carrier = HeaderCarrier { headers };
    opentelemetry::global::get_text_map_propagator(|propagator| {
        // Extract against a fresh context so an absent header set does not
        // pick up whatever span happens to be active in this process.
        let cx = propagator.extract_with_context(&Context::new(), &carrier);
        let valid = cx.span().span_context().is_valid();
        valid.then_some(cx)
    })
}

/// Link `span` to the upstream trace when the request headers carry one, and
/// record the resulting trace id.
pub(crate) fn link_parent_context(span: &Span, headers: &HeaderMap) {
    if let Some(parent) = extract_parent_context(headers) {
        span.set_parent(parent);
    }

    // With a remote parent this is the upstream trace id; without one it is
    // the id assigned to this request as the root of a new trace.
    let trace_id = {
        let cx = span.context();
        let id = cx.span().span_context().trace_id();
        format!("{id:032x}")
    };
    span.record(fields::TRACE_ID, tracing::field::display(trace_id));
}

#[cfg(test)]
mod tests {
    use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};

    use super::*;

    #[test]
    fn extraction_without_propagation_headers_is_absent() {
        assert!(extract_parent_context(&HeaderMap::new()).is_none());
    }

    #[test]
    fn garbled_propagation_headers_are_absent_not_an_error() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("traceparent"),
            HeaderValue::from_static("definitely-not-a-traceparent"),
        );

        assert!(extract_parent_context(&headers).is_none());
    }
}

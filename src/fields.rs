//! Names of the span fields recorded by the [`Telemetry`](crate::Telemetry)
//! middleware.
//!
//! All of these are declared on the request span when it is created, so they
//! can also be used with [`tracing::Span::record`] — for instance through the
//! [`RootSpan`](crate::RootSpan) extractor, or as the key of a
//! [`SpanTag`](crate::SpanTag) override.

/// HTTP request method.
pub const HTTP_METHOD: &str = "http.method";

/// Matched route template, when the request was routed.
pub const HTTP_ROUTE: &str = "http.route";

/// HTTP protocol version.
pub const HTTP_FLAVOR: &str = "http.flavor";

/// Escaped request path, exactly as received.
pub const HTTP_TARGET: &str = "http.target";

/// Raw `Host` header value, including any embedded port.
pub const HTTP_HOST: &str = "http.host";

/// `User-Agent` header value.
pub const HTTP_USER_AGENT: &str = "http.user_agent";

/// Resolved client IP; omitted when no globally routable address was found.
pub const HTTP_CLIENT_IP: &str = "http.client_ip";

/// Response status code, as a decimal string.
pub const HTTP_STATUS_CODE: &str = "http.status_code";

/// Canonical request URL (`scheme://host` + path, plus any query).
pub const HTTP_URL: &str = "http.url";

/// URL host with any embedded port stripped.
pub const HTTP_URL_HOST: &str = "http.url_details.host";

/// URL path component.
pub const HTTP_URL_PATH: &str = "http.url_details.path";

/// URL scheme, `http` or `https`.
pub const HTTP_URL_SCHEME: &str = "http.url_details.scheme";

/// Effective URL port: embedded in the host header or the scheme default.
pub const HTTP_URL_PORT: &str = "http.url_details.port";

/// Query string after obfuscation; set only when redaction ran.
pub const HTTP_URL_QUERY: &str = "http.url_details.queryString";

/// OpenTelemetry span kind; always `server` for request spans.
pub const OTEL_KIND: &str = "otel.kind";

/// OpenTelemetry status, `OK` or `ERROR`.
pub const OTEL_STATUS_CODE: &str = "otel.status_code";

/// Human-readable error message for failed requests.
pub const EXCEPTION_MESSAGE: &str = "exception.message";

/// Debug representation of the error for failed requests.
pub const EXCEPTION_DETAILS: &str = "exception.details";

/// Unique id of the request, see [`RequestId`](crate::RequestId).
pub const REQUEST_ID: &str = "request_id";

/// Trace id: the upstream one when a parent context was extracted, otherwise
/// the id of the freshly started trace.
pub const TRACE_ID: &str = "trace_id";

/// Marker flagging the request span for measurement by downstream exporters.
pub const MEASURED: &str = "measured";

//! The request span lifecycle: open with the canonical tag set, finish with
//! the response outcome.

use std::borrow::Cow;

use actix_web::dev::ServiceRequest;
use actix_web::http::{header, StatusCode};
use actix_web::HttpMessage as _;
use smallvec::SmallVec;
use tracing::field::Empty;
use tracing::Span;

use crate::client_ip::resolve_client_ip;
use crate::config::TelemetryConfig;
use crate::fields;
use crate::otel;
use crate::request_id::RequestId;
use crate::url_tags::UrlTags;

/// A single span tagging directive: a field name and its rendered value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanTag {
    key: Cow<'static, str>,
    value: Cow<'static, str>,
}

impl SpanTag {
    /// Create a tag directive.
    pub fn new(
        key: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
    ) -> SpanTag {
        SpanTag {
            key: key.into(),
            value: value.into(),
        }
    }

    /// The span field this directive targets.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value recorded on the field.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// An ordered sequence of tag directives.
///
/// Order is part of the contract: directives are recorded one by one, and
/// when two target the same field the later one wins.
pub type SpanTags = SmallVec<[SpanTag; 16]>;

/// Open the span for `req` and record the canonical request tags.
///
/// The canonical tags cover the request line (method, route, protocol
/// version, escaped path, user agent), the URL breakdown
/// (`http.url_details.*` plus the canonical `http.url`), the raw host
/// header, the request id when one is stored on the request, and the
/// resolved client IP when one qualifies. An upstream trace context is
/// extracted from the request headers; when none is found the span starts a
/// new root trace.
///
/// `extra` is recorded last: a directive reusing a canonical field name
/// overrides the value recorded by this function. Directives targeting
/// fields that are not part of the canonical set are ignored by `tracing`.
pub fn start_request_span(
    config: &TelemetryConfig,
    req: &ServiceRequest,
    extra: SpanTags,
) -> Span {
    let span = tracing::info_span!(
        "HTTP request",
        http.method = Empty,
        http.route = Empty,
        http.flavor = Empty,
        http.target = Empty,
        http.host = Empty,
        http.user_agent = Empty,
        http.client_ip = Empty,
        http.status_code = Empty,
        http.url = Empty,
        http.url_details.host = Empty,
        http.url_details.path = Empty,
        http.url_details.scheme = Empty,
        http.url_details.port = Empty,
        http.url_details.queryString = Empty,
        otel.kind = Empty,
        otel.status_code = Empty,
        exception.message = Empty,
        exception.details = Empty,
        request_id = Empty,
        trace_id = Empty,
        measured = Empty,
    );

    for tag in assemble_start_tags(config, req).into_iter().chain(extra) {
        span.record(tag.key(), tag.value());
    }
    otel::link_parent_context(&span, req.headers());

    span
}

/// Record the response outcome on the request span.
///
/// A `None` status is the "unset" sentinel and is treated as a successful
/// `200 OK`. Server errors (5xx) additionally record an error marker of the
/// form `"<code>: <reason>"`. `extra` is recorded last, overriding on field
/// name collisions.
///
/// The span itself closes when its last handle is dropped; callers must
/// invoke this exactly once per started span, after the response outcome is
/// known.
pub fn finish_request_span(span: &Span, status: Option<StatusCode>, extra: SpanTags) {
    for tag in response_tags(status).into_iter().chain(extra) {
        span.record(tag.key(), tag.value());
    }
}

/// Assemble the ordered start tags for `req`.
///
/// Lowest precedence first: the raw host header, the URL breakdown, the
/// request-line tags, then the per-request extras (request id, client IP).
fn assemble_start_tags(config: &TelemetryConfig, req: &ServiceRequest) -> SpanTags {
    let mut tags = SpanTags::new();

    if let Some(host) = req
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty())
    {
        tags.push(SpanTag::new(fields::HTTP_HOST, host.to_owned()));
    }

    let url = UrlTags::for_request(config, req);
    tags.push(SpanTag::new(fields::HTTP_URL_HOST, url.host));
    tags.push(SpanTag::new(fields::HTTP_URL_PATH, url.path));
    tags.push(SpanTag::new(fields::HTTP_URL_SCHEME, url.scheme));
    tags.push(SpanTag::new(fields::HTTP_URL_PORT, url.port));
    if let Some(query) = url.query {
        tags.push(SpanTag::new(fields::HTTP_URL_QUERY, query));
    }
    tags.push(SpanTag::new(fields::HTTP_URL, url.url));

    tags.push(SpanTag::new(fields::OTEL_KIND, "server"));
    tags.push(SpanTag::new(
        fields::HTTP_METHOD,
        req.method().as_str().to_owned(),
    ));
    if let Some(route) = req.match_pattern() {
        tags.push(SpanTag::new(fields::HTTP_ROUTE, route));
    }
    tags.push(SpanTag::new(
        fields::HTTP_FLAVOR,
        format!("{:?}", req.version()),
    ));
    tags.push(SpanTag::new(
        fields::HTTP_TARGET,
        req.uri().path().to_owned(),
    ));
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    tags.push(SpanTag::new(fields::HTTP_USER_AGENT, user_agent.to_owned()));
    tags.push(SpanTag::new(fields::MEASURED, "1"));

    if let Some(request_id) = req.extensions().get::<RequestId>().copied() {
        tags.push(SpanTag::new(fields::REQUEST_ID, request_id.to_string()));
    }
    if let Some(ip) = resolve_client_ip(config, req.headers(), req.peer_addr()) {
        tags.push(SpanTag::new(fields::HTTP_CLIENT_IP, ip.to_string()));
    }

    tags
}

/// The status and error tags recorded when a request finishes.
fn response_tags(status: Option<StatusCode>) -> SpanTags {
    let code = status.unwrap_or(StatusCode::OK);
    let mut tags = SpanTags::new();

    tags.push(SpanTag::new(
        fields::HTTP_STATUS_CODE,
        code.as_u16().to_string(),
    ));
    if code.is_server_error() {
        tags.push(SpanTag::new(fields::OTEL_STATUS_CODE, "ERROR"));
        tags.push(SpanTag::new(
            fields::EXCEPTION_MESSAGE,
            format!(
                "{}: {}",
                code.as_u16(),
                code.canonical_reason().unwrap_or_default()
            ),
        ));
    } else {
        tags.push(SpanTag::new(fields::OTEL_STATUS_CODE, "OK"));
    }

    tags
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    fn value_of<'a>(tags: &'a SpanTags, key: &str) -> Option<&'a str> {
        tags.iter()
            .rev()
            .find(|tag| tag.key() == key)
            .map(SpanTag::value)
    }

    #[test]
    fn unset_status_is_reported_as_success() {
        let tags = response_tags(None);

        assert_eq!(value_of(&tags, fields::HTTP_STATUS_CODE), Some("200"));
        assert_eq!(value_of(&tags, fields::OTEL_STATUS_CODE), Some("OK"));
        assert_eq!(value_of(&tags, fields::EXCEPTION_MESSAGE), None);
    }

    #[test]
    fn server_errors_carry_an_error_marker() {
        let tags = response_tags(Some(StatusCode::SERVICE_UNAVAILABLE));

        assert_eq!(value_of(&tags, fields::HTTP_STATUS_CODE), Some("503"));
        assert_eq!(value_of(&tags, fields::OTEL_STATUS_CODE), Some("ERROR"));
        assert_eq!(
            value_of(&tags, fields::EXCEPTION_MESSAGE),
            Some("503: Service Unavailable")
        );
    }

    #[test]
    fn client_errors_are_not_marked_as_errors() {
        let tags = response_tags(Some(StatusCode::NOT_FOUND));

        assert_eq!(value_of(&tags, fields::HTTP_STATUS_CODE), Some("404"));
        assert_eq!(value_of(&tags, fields::OTEL_STATUS_CODE), Some("OK"));
        assert_eq!(value_of(&tags, fields::EXCEPTION_MESSAGE), None);
    }

    #[test]
    fn start_tags_cover_the_request_line() {
        let req = TestRequest::get()
            .uri("/search?q=rust")
            .insert_header(("host", "example.com:8080"))
            .insert_header(("user-agent", "test-agent"))
            .to_srv_request();

        let tags = assemble_start_tags(&TelemetryConfig::default(), &req);

        assert_eq!(value_of(&tags, fields::HTTP_METHOD), Some("GET"));
        assert_eq!(value_of(&tags, fields::HTTP_TARGET), Some("/search"));
        assert_eq!(value_of(&tags, fields::HTTP_USER_AGENT), Some("test-agent"));
        assert_eq!(value_of(&tags, fields::OTEL_KIND), Some("server"));
        assert_eq!(value_of(&tags, fields::MEASURED), Some("1"));
        assert_eq!(
            value_of(&tags, fields::HTTP_HOST),
            Some("example.com:8080")
        );
        assert_eq!(value_of(&tags, fields::HTTP_URL_HOST), Some("example.com"));
        assert_eq!(value_of(&tags, fields::HTTP_URL_PORT), Some("8080"));
        assert_eq!(value_of(&tags, fields::HTTP_URL_SCHEME), Some("http"));
        assert_eq!(
            value_of(&tags, fields::HTTP_URL),
            Some("http://example.com/search?q=rust")
        );
    }

    #[test]
    fn forwarded_client_ip_is_tagged() {
        let req = TestRequest::get()
            .insert_header(("x-forwarded-for", "10.0.0.1, 8.8.8.8"))
            .to_srv_request();

        let tags = assemble_start_tags(&TelemetryConfig::default(), &req);

        assert_eq!(value_of(&tags, fields::HTTP_CLIENT_IP), Some("8.8.8.8"));
    }

    #[test]
    fn unresolvable_client_ip_is_omitted() {
        let req = TestRequest::get()
            .insert_header(("x-forwarded-for", "10.0.0.1"))
            .to_srv_request();

        let tags = assemble_start_tags(&TelemetryConfig::default(), &req);

        assert_eq!(value_of(&tags, fields::HTTP_CLIENT_IP), None);
    }

    #[test]
    fn redacted_query_lands_in_the_query_tag() {
        let config = TelemetryConfig::builder()
            .obfuscate_query_matching(r"\A.*\z")
            .finish()
            .unwrap();
        let req = TestRequest::get()
            .uri("/login?token=abc123")
            .insert_header(("host", "example.com"))
            .to_srv_request();

        let tags = assemble_start_tags(&config, &req);

        assert_eq!(
            value_of(&tags, fields::HTTP_URL_QUERY),
            Some("<redacted>")
        );
        assert_eq!(
            value_of(&tags, fields::HTTP_URL),
            Some("http://example.com/login?<redacted>")
        );
    }

    #[test]
    fn later_directives_override_earlier_ones() {
        let req = TestRequest::get().to_srv_request();

        let mut tags = assemble_start_tags(&TelemetryConfig::default(), &req);
        tags.push(SpanTag::new(fields::HTTP_METHOD, "OVERRIDDEN"));

        assert_eq!(value_of(&tags, fields::HTTP_METHOD), Some("OVERRIDDEN"));
    }
}

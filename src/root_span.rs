use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpMessage, HttpRequest, ResponseError};
use tracing::Span;

/// The span attached to the in-flight request by the
/// [`Telemetry`](crate::Telemetry) middleware.
///
/// Extract it in a handler to record values computed during request
/// processing onto the request span — any of the canonical
/// [`fields`](crate::fields) or, for custom fields, ones declared through a
/// caller-supplied start tag.
///
/// # Usage
/// ```rust
/// use actix_telemetry::{fields, RootSpan};
/// use actix_web::get;
///
/// #[get("/")]
/// async fn index(root_span: RootSpan) -> &'static str {
///     root_span.record(fields::HTTP_ROUTE, "/");
///     "Hello!"
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RootSpan(Span);

impl RootSpan {
    pub(crate) fn new(span: Span) -> Self {
        Self(span)
    }
}

impl std::ops::Deref for RootSpan {
    type Target = Span;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<RootSpan> for Span {
    fn from(root_span: RootSpan) -> Self {
        root_span.0
    }
}

impl FromRequest for RootSpan {
    type Error = RootSpanExtractionError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<RootSpan>()
                .cloned()
                .ok_or(RootSpanExtractionError { _priv: () }),
        )
    }
}

/// Error returned by the [`RootSpan`] extractor when no span is stored on
/// the request.
///
/// This only happens when the [`Telemetry`](crate::Telemetry) middleware is
/// not registered on the application.
#[derive(Debug)]
pub struct RootSpanExtractionError {
    // private field so the error cannot be constructed outside this crate
    _priv: (),
}

impl ResponseError for RootSpanExtractionError {}

impl std::fmt::Display for RootSpanExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("no request span found in request-local storage")
    }
}

impl std::error::Error for RootSpanExtractionError {}

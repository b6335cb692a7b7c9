use std::fmt;
use std::future::{ready, Future, Ready};
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpMessage, ResponseError};
use pin_project::pin_project;
use tracing::Span;

use crate::config::TelemetryConfig;
use crate::fields;
use crate::request_id::RequestId;
use crate::request_span::{finish_request_span, start_request_span, SpanTag, SpanTags};
use crate::root_span::RootSpan;

/// Request telemetry middleware for Actix Web.
///
/// For every incoming request the middleware opens a span carrying the
/// canonical request tags (see [`fields`](crate::fields)), resolves the
/// client IP from the forwarding headers, continues an upstream trace
/// context when the request carries one, and records the response status —
/// plus an error marker for server errors — when the request completes.
///
/// A [`RequestId`] and a [`RootSpan`] handle are stored in request-local
/// storage and can be extracted by handlers.
///
/// # Usage
/// ```no_run
/// use actix_telemetry::{Telemetry, TelemetryConfig};
/// use actix_web::{web, App, HttpServer};
///
/// #[actix_web::main]
/// async fn main() -> std::io::Result<()> {
///     let config = TelemetryConfig::builder()
///         .obfuscate_query_matching(r"\A.*\z")
///         .finish()
///         .expect("valid telemetry configuration");
///
///     HttpServer::new(move || {
///         App::new()
///             .wrap(Telemetry::new(config.clone()))
///             .route("/", web::get().to(|| async { "Hello!" }))
///     })
///     .bind(("127.0.0.1", 8080))?
///     .run()
///     .await
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Telemetry {
    config: Rc<TelemetryConfig>,
}

impl Telemetry {
    /// Create the middleware from an explicit config.
    pub fn new(config: TelemetryConfig) -> Telemetry {
        Telemetry {
            config: Rc::new(config),
        }
    }
}

impl Default for Telemetry {
    /// Create the middleware with the default config: the built-in header
    /// precedence list, no query obfuscation, and the built-in reserved
    /// IPv6 ranges.
    fn default() -> Self {
        Telemetry::new(TelemetryConfig::default())
    }
}

impl<S, B> Transform<S, ServiceRequest> for Telemetry
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = TelemetryMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TelemetryMiddleware {
            service,
            config: Rc::clone(&self.config),
        }))
    }
}

/// Service wrapper produced by the [`Telemetry`] transform.
#[doc(hidden)]
#[derive(Debug, Clone)]
pub struct TelemetryMiddleware<S> {
    service: S,
    config: Rc<TelemetryConfig>,
}

impl<S, B> Service<ServiceRequest> for TelemetryMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = TelemetryResponse<S, B>;

    actix_web::dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        req.extensions_mut().insert(RequestId::generate());
        let span = start_request_span(&self.config, &req, SpanTags::new());
        req.extensions_mut().insert(RootSpan::new(span.clone()));

        let fut = span.in_scope(|| self.service.call(req));
        TelemetryResponse {
            fut,
            span,
            _body: PhantomData,
        }
    }
}

/// Response future for [`TelemetryMiddleware`].
#[pin_project]
pub struct TelemetryResponse<S, B>
where
    S: Service<ServiceRequest>,
{
    #[pin]
    fut: S::Future,
    span: Span,
    _body: PhantomData<B>,
}

impl<S, B> fmt::Debug for TelemetryResponse<S, B>
where
    S: Service<ServiceRequest>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryResponse")
            .field("span", &self.span)
            .finish_non_exhaustive()
    }
}

impl<S, B> Future for TelemetryResponse<S, B>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    B: 'static,
{
    type Output = Result<ServiceResponse<B>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let span = this.span;

        match span.in_scope(|| this.fut.poll(cx)) {
            Poll::Ready(outcome) => {
                record_response(span, &outcome);
                #[cfg(feature = "emit_event_on_error")]
                span.in_scope(|| emit_event_on_error(&outcome));
                Poll::Ready(outcome)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

fn record_response<B>(span: &Span, outcome: &Result<ServiceResponse<B>, Error>) {
    match outcome {
        Ok(response) => match response.response().error() {
            Some(error) => record_error(span, error),
            None => {
                finish_request_span(span, Some(response.response().status()), SpanTags::new());
            }
        },
        Err(error) => record_error(span, error),
    }
}

fn record_error(span: &Span, error: &Error) {
    let response_error = error.as_response_error();
    let mut extra = SpanTags::new();
    // pre-formatted: tracing captures field values eagerly
    extra.push(SpanTag::new(
        fields::EXCEPTION_MESSAGE,
        response_error.to_string(),
    ));
    extra.push(SpanTag::new(
        fields::EXCEPTION_DETAILS,
        format!("{response_error:?}"),
    ));
    finish_request_span(span, Some(response_error.status_code()), extra);
}

#[cfg(feature = "emit_event_on_error")]
fn emit_event_on_error<B>(outcome: &Result<ServiceResponse<B>, Error>) {
    let error = match outcome {
        Ok(response) => response.response().error(),
        Err(error) => Some(error),
    };
    let Some(error) = error else { return };

    let response_error = error.as_response_error();
    if response_error.status_code().is_client_error() {
        tracing::warn!(
            "error encountered while processing the incoming HTTP request: {:?}",
            response_error
        );
    } else {
        tracing::error!(
            "error encountered while processing the incoming HTTP request: {:?}",
            response_error
        );
    }
}

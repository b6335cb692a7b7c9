//! Request telemetry for Actix Web.
//!
//! [`Telemetry`] is a middleware that attaches a [`tracing::Span`] to every
//! incoming request, derives a canonical set of descriptive attributes for
//! it, and records the outcome when the request completes:
//!
//! - request line: HTTP method (`http.method`), matched route
//!   (`http.route`), protocol version (`http.flavor`), escaped path
//!   (`http.target`), user agent (`http.user_agent`);
//! - URL breakdown: canonical URL (`http.url`) and its host, path, scheme,
//!   port, and query components (`http.url_details.*`), with optional query
//!   string redaction;
//! - network origin: the client IP (`http.client_ip`) resolved from a chain
//!   of untrusted forwarding headers, skipping private and loopback noise
//!   injected by intermediate proxies;
//! - trace continuity: an upstream distributed-trace context extracted from
//!   the request headers via the global OpenTelemetry propagator, falling
//!   back to a new root trace (`trace_id`);
//! - outcome: the response status (`http.status_code`) and, for server
//!   errors, an error marker (`otel.status_code`, `exception.message`).
//!
//! Field names are exported as constants in the [`fields`] module. Handlers
//! can extract the [`RootSpan`] to record further values onto the request
//! span and the per-request [`RequestId`].
//!
//! None of the resolution or tag-building paths can fail the instrumented
//! request: malformed addresses, header values, and propagation headers are
//! skipped, and absent values show up as omitted tags.
//!
//! # Example
//! ```no_run
//! use actix_telemetry::{Telemetry, TelemetryConfig};
//! use actix_web::{web, App, HttpServer};
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = TelemetryConfig::builder()
//!         .client_ip_header("cf-connecting-ip")
//!         .obfuscate_query_matching(r"\A.*\z")
//!         .finish()
//!         .expect("valid telemetry configuration");
//!
//!     HttpServer::new(move || {
//!         App::new()
//!             .wrap(Telemetry::new(config.clone()))
//!             .route("/", web::get().to(|| async { "Hello!" }))
//!     })
//!     .bind(("127.0.0.1", 8080))?
//!     .run()
//!     .await
//! }
//! ```
//!
//! The engine behind the middleware — [`start_request_span`],
//! [`finish_request_span`], [`resolve_client_ip`], [`UrlTags`] — is public,
//! so custom wrappers can reuse it with their own option lists.
//!
//! # Crate Features
//! - `emit_event_on_error` (default): emit a `tracing` event when a request
//!   finishes with an error — warn level for client errors, error level for
//!   server errors.
//! - `uuid_v7`: generate [`RequestId`]s as UUID v7 instead of UUID v4.

#![forbid(unsafe_code)]
#![warn(future_incompatible, missing_docs, missing_debug_implementations)]
#![doc(html_logo_url = "https://actix.rs/img/logo.png")]
#![doc(html_favicon_url = "https://actix.rs/favicon.ico")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod client_ip;
mod config;
pub mod fields;
mod middleware;
mod otel;
mod request_id;
mod request_span;
mod root_span;
mod url_tags;

pub use crate::client_ip::{resolve_client_ip, Ipv6Prefix, PrefixParseError};
pub use crate::config::{ConfigError, TelemetryConfig, TelemetryConfigBuilder};
pub use crate::middleware::{Telemetry, TelemetryMiddleware, TelemetryResponse};
pub use crate::request_id::{RequestId, RequestIdExtractionError};
pub use crate::request_span::{finish_request_span, start_request_span, SpanTag, SpanTags};
pub use crate::root_span::{RootSpan, RootSpanExtractionError};
pub use crate::url_tags::{obfuscate_query, UrlTags, REDACTION_MARKER};

use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpMessage, HttpRequest, ResponseError};
use uuid::Uuid;

/// A unique identifier generated for each request handled by the
/// [`Telemetry`](crate::Telemetry) middleware and recorded on its span as
/// `request_id`.
///
/// With the `uuid_v7` crate feature the identifier is a UUID v7 instead of a
/// UUID v4, making ids sortable by generation time.
///
/// # Usage
/// ```rust
/// use actix_telemetry::RequestId;
/// use actix_web::get;
///
/// #[get("/")]
/// async fn index(request_id: RequestId) -> String {
///     request_id.to_string()
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    #[cfg(not(feature = "uuid_v7"))]
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[cfg(feature = "uuid_v7")]
    pub(crate) fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl std::ops::Deref for RequestId {
    type Target = Uuid;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<RequestId> for Uuid {
    fn from(request_id: RequestId) -> Self {
        request_id.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromRequest for RequestId {
    type Error = RequestIdExtractionError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<RequestId>()
                .copied()
                .ok_or(RequestIdExtractionError { _priv: () }),
        )
    }
}

/// Error returned by the [`RequestId`] extractor when no id is stored on the
/// request.
///
/// This only happens when the [`Telemetry`](crate::Telemetry) middleware is
/// not registered on the application.
#[derive(Debug)]
pub struct RequestIdExtractionError {
    // private field so the error cannot be constructed outside this crate
    _priv: (),
}

impl ResponseError for RequestIdExtractionError {}

impl std::fmt::Display for RequestIdExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("no request id found in request-local storage")
    }
}

impl std::error::Error for RequestIdExtractionError {}

//! Response value and the [`IntoResponse`] conversion trait.
//!
//! Controllers build a [`Response`] and return it. Middleware may read it,
//! clone it into the cache, or replace it; nobody edits one in place.

use bytes::Bytes;

use crate::properties::Properties;
use crate::status::Status;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ContentType {
    Csv,          // text/csv
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
    Other(String),
}

impl ContentType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Csv         => "text/csv",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
            Self::Other(s)    => s,
        }
    }
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// Payload of a response: raw bytes, a scalar text value, or nothing.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
    Text(String),
}

impl Body {
    /// The payload as bytes. `Text` is viewed through its UTF-8 encoding.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Empty    => &[],
            Self::Bytes(b) => b,
            Self::Text(s)  => s.as_bytes(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub(crate) fn into_bytes(self) -> Bytes {
        match self {
            Self::Empty    => Bytes::new(),
            Self::Bytes(b) => b,
            Self::Text(s)  => Bytes::from(s),
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// The answer to a [`Request`](crate::Request).
///
/// # Shortcuts
///
/// ```rust
/// use resmux::{Response, Status};
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::not_found();
/// ```
///
/// # Builder (custom status, content type or properties)
///
/// ```rust
/// use resmux::{ContentType, Response, Status};
///
/// Response::builder()
///     .property("modified", "2024-01-01T00:00:00Z")
///     .bytes(ContentType::Xml, b"<ok/>".to_vec());
///
/// Response::builder()
///     .status(Status::Error)
///     .text("backend reported a soft failure");
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    status: Status,
    content_type: Option<ContentType>,
    body: Body,
    properties: Properties,
}

impl Response {
    /// `Ok`, `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().bytes(ContentType::Json, body)
    }

    /// `Ok`, `text/plain; charset=utf-8`, carried as a scalar.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// `Ok`, `application/octet-stream`.
    pub fn bytes(body: impl Into<Bytes>) -> Self {
        Self::builder().bytes(ContentType::OctetStream, body)
    }

    /// Response with no body.
    pub fn status(status: Status) -> Self {
        Self::builder().status(status).no_body()
    }

    pub fn not_found() -> Self {
        Self::status(Status::NotFound)
    }

    /// Builder for responses that need a custom status or properties.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { properties: Properties::new(), status: Status::Ok }
    }

    pub fn status_code(&self) -> Status { self.status }
    pub fn content_type(&self) -> Option<&ContentType> { self.content_type.as_ref() }
    pub fn body(&self) -> &Body { &self.body }
    pub fn props(&self) -> &Properties { &self.properties }

    /// The body as text, if it is a scalar or valid UTF-8 bytes.
    pub fn text_body(&self) -> Option<&str> {
        match &self.body {
            Body::Empty    => None,
            Body::Text(s)  => Some(s),
            Body::Bytes(b) => std::str::from_utf8(b).ok(),
        }
    }

    pub fn is_ok(&self) -> bool { self.status.is_ok() }
    pub fn is_not_found(&self) -> bool { self.status.is_not_found() }

    pub(crate) fn into_parts(self) -> (Status, Option<ContentType>, Body, Properties) {
        (self.status, self.content_type, self.body, self.properties)
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `Status::Ok`.
/// Terminated by a body method, or [`no_body`](ResponseBuilder::no_body).
pub struct ResponseBuilder {
    properties: Properties,
    status: Status,
}

impl ResponseBuilder {
    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties = self.properties.with(key, value);
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.bytes(ContentType::Json, body)
    }

    /// Terminate with a scalar text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(Some(ContentType::Text), Body::Text(body.into()))
    }

    /// Terminate with a typed byte body.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(Some(content_type), Body::Bytes(body.into()))
    }

    /// Terminate with no body.
    pub fn no_body(self) -> Response {
        self.finish(None, Body::Empty)
    }

    fn finish(self, content_type: Option<ContentType>, body: Body) -> Response {
        Response { status: self.status, content_type, body, properties: self.properties }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into a [`Response`].
///
/// Implement on your own types to return them directly from controller
/// handlers. `Option<T>` maps `None` to a `NotFound` soft miss, which is the
/// natural shape of most "look it up" backends:
///
/// ```rust
/// use resmux::Request;
/// use tokio_util::sync::CancellationToken;
///
/// async fn lookup(_req: Request, _cancel: CancellationToken) -> resmux::Result<Option<String>> {
///     Ok(None) // answered as Status::NotFound
/// }
/// ```
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for Bytes {
    fn into_response(self) -> Response { Response::bytes(self) }
}

impl IntoResponse for Vec<u8> {
    fn into_response(self) -> Response { Response::bytes(self) }
}

/// Return a [`Status`] directly from a handler: `return Status::NotFound`
impl IntoResponse for Status {
    fn into_response(self) -> Response { Response::status(self) }
}

impl<T: IntoResponse> IntoResponse for Option<T> {
    fn into_response(self) -> Response {
        match self {
            Some(value) => value.into_response(),
            None        => Response::not_found(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_a_soft_miss() {
        let res = Option::<String>::None.into_response();
        assert!(res.is_not_found());
        assert!(res.body().is_empty());
    }

    #[test]
    fn text_is_a_scalar_body() {
        let res = Response::text("x");
        assert_eq!(res.body(), &Body::Text("x".into()));
        assert_eq!(res.text_body(), Some("x"));
        assert_eq!(res.content_type(), Some(&ContentType::Text));
    }

    #[test]
    fn builder_carries_status_and_properties() {
        let res = Response::builder()
            .status(Status::Error)
            .property("retry", "false")
            .json(b"{}".to_vec());
        assert_eq!(res.status_code(), Status::Error);
        assert_eq!(res.props().get("retry"), Some("false"));
        assert_eq!(res.body().as_bytes(), b"{}");
    }
}

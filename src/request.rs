//! Request value passed through the pipeline.

use bytes::Bytes;

use crate::error::Error;
use crate::properties::{Properties, RoutingHints};
use crate::resource_id::ResourceId;
use crate::verb::Verb;

/// One call against a resource.
///
/// Requests are values: nothing in the pipeline mutates one in place. The
/// chaining methods below consume `self` and hand back the modified request,
/// and middleware that rewrite a request (placeholder expansion, for one)
/// build a new value with [`Request::with_id`].
///
/// ```rust
/// use resmux::{Request, ResourceId};
///
/// let id = ResourceId::parse("sql:///settings/timeout").unwrap();
/// let req = Request::put(id, "30")
///     .kind("sql")
///     .tag("test")
///     .property("correlation-id", "c-42");
/// ```
#[derive(Clone, Debug)]
pub struct Request {
    verb: Verb,
    id: ResourceId,
    kind: String,
    hints: RoutingHints,
    properties: Properties,
    body: Option<Bytes>,
}

impl Request {
    /// A request with no body, no hints and no properties. The kind defaults
    /// to the identifier's scheme.
    pub fn new(verb: Verb, id: ResourceId) -> Self {
        Self {
            verb,
            kind: id.scheme().to_owned(),
            id,
            hints: RoutingHints::default(),
            properties: Properties::default(),
            body: None,
        }
    }

    /// Parses `id` and builds a request from it.
    pub fn parse(verb: Verb, id: &str) -> Result<Self, Error> {
        Ok(Self::new(verb, ResourceId::parse(id)?))
    }

    pub fn get(id: ResourceId) -> Self {
        Self::new(Verb::Get, id)
    }

    pub fn delete(id: ResourceId) -> Self {
        Self::new(Verb::Delete, id)
    }

    pub fn post(id: ResourceId, body: impl Into<Bytes>) -> Self {
        Self::new(Verb::Post, id).body(body)
    }

    pub fn put(id: ResourceId, body: impl Into<Bytes>) -> Self {
        Self::new(Verb::Put, id).body(body)
    }

    // ── Chaining ─────────────────────────────────────────────────────────────

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Route only to the controller registered under `name`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.hints = self.hints.with_name(name);
        self
    }

    /// Route only to controllers carrying `tag` (or any other tag added).
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.hints = self.hints.with_tag(tag);
        self
    }

    pub fn hints(mut self, hints: RoutingHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties = self.properties.with(key, value);
        self
    }

    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns a copy of this request addressed to `id`.
    pub fn with_id(&self, id: ResourceId) -> Self {
        Self { id, ..self.clone() }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn verb(&self) -> Verb { self.verb }
    pub fn id(&self) -> &ResourceId { &self.id }
    pub fn scheme(&self) -> &str { self.id.scheme() }
    pub fn request_kind(&self) -> &str { &self.kind }
    pub fn routing(&self) -> &RoutingHints { &self.hints }
    pub fn props(&self) -> &Properties { &self.properties }
    pub fn payload(&self) -> Option<&Bytes> { self.body.as_ref() }

    /// The body decoded as UTF-8, if there is one and it is valid.
    pub fn payload_str(&self) -> Option<&str> {
        self.body.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_defaults_to_scheme() {
        let req = Request::parse(Verb::Get, "Mem:///x").unwrap();
        assert_eq!(req.request_kind(), "mem");
        assert_eq!(req.clone().kind("json").request_kind(), "json");
    }

    #[test]
    fn with_id_keeps_everything_else() {
        let req = Request::put(ResourceId::new("file", "a"), "body").tag("t").property("k", "v");
        let moved = req.with_id(ResourceId::new("file", "b"));
        assert_eq!(moved.id().path(), "b");
        assert_eq!(req.id().path(), "a");
        assert_eq!(moved.payload_str(), Some("body"));
        assert_eq!(moved.props().get("k"), Some("v"));
        assert!(moved.routing().tags().is_some_and(|t| t.contains("t")));
    }
}

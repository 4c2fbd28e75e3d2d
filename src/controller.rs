//! Controllers, their capability tables, and handler type erasure.
//!
//! # How async handlers are stored
//!
//! A controller holds handlers of *different* types, one per verb, in a
//! single `HashMap<Verb, BoxedHandler>`. Rust collections can only hold one
//! concrete type, so handlers are hidden behind a trait object
//! (`dyn ErasedHandler`) and stored uniformly.
//!
//! ```text
//! async fn read(req, cancel) -> Result<R> { … }      ← backend writes this
//!        ↓ Controller::builder().get(read)
//! read.into_boxed_handler()                          ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(read))                          ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req, cancel)  at dispatch time        ← one vtable dispatch
//!        ↓
//! Box::pin(async { read(req, cancel).await.map(into_response) })
//! ```
//!
//! The table is built once, at construction time. A verb without an entry
//! simply does not take part in dispatch for that verb.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::verb::Verb;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to a handler outcome.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request, cancel: CancellationToken) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid verb handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// function or closure with the shape:
///
/// ```text
/// async fn name(req: Request, cancel: CancellationToken) -> resmux::Result<impl IntoResponse>
/// ```
///
/// Return `Ok` with a `NotFound` response (or `Ok(None)`) when the resource
/// is absent, and `Err` only for operational failures.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype bridging a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request, cancel: CancellationToken) -> BoxFuture {
        let fut = (self.0)(req, cancel);
        Box::pin(async move { fut.await.map(IntoResponse::into_response) })
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

/// A backend adapter: what it serves (schemes, kinds), how it can be
/// targeted (name, tags), and one handler per supported verb.
///
/// ```rust
/// use resmux::{Controller, Request, Response};
/// use tokio_util::sync::CancellationToken;
///
/// async fn read(req: Request, _cancel: CancellationToken) -> resmux::Result<Option<Response>> {
///     Ok((req.id().path() == "motd").then(|| Response::text("hello")))
/// }
///
/// let motd = Controller::builder()
///     .name("motd")
///     .scheme("mem")
///     .tag("static")
///     .get(read)
///     .build();
/// assert!(motd.handles(resmux::Verb::Get));
/// assert!(!motd.handles(resmux::Verb::Put));
/// ```
pub struct Controller {
    name: Option<String>,
    schemes: BTreeSet<String>,
    kinds: BTreeSet<String>,
    tags: BTreeSet<String>,
    handlers: HashMap<Verb, BoxedHandler>,
}

impl Controller {
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder {
            name: None,
            schemes: BTreeSet::new(),
            kinds: BTreeSet::new(),
            tags: BTreeSet::new(),
            handlers: HashMap::new(),
        }
    }

    pub fn name(&self) -> Option<&str> { self.name.as_deref() }
    pub fn schemes(&self) -> &BTreeSet<String> { &self.schemes }
    pub fn kinds(&self) -> &BTreeSet<String> { &self.kinds }
    pub fn tags(&self) -> &BTreeSet<String> { &self.tags }

    /// `true` if the capability table has an entry for `verb`.
    pub fn handles(&self, verb: Verb) -> bool {
        self.handlers.contains_key(&verb)
    }

    /// Human-readable identity for logs and error messages: the name, or
    /// the served schemes for unnamed controllers.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("<{}>", self.schemes.iter().cloned().collect::<Vec<_>>().join("|")),
        }
    }

    pub(crate) fn serves_scheme(&self, scheme: &str) -> bool {
        self.schemes.iter().any(|s| s.eq_ignore_ascii_case(scheme))
    }

    pub(crate) fn handler(&self, verb: Verb) -> Option<BoxedHandler> {
        self.handlers.get(&verb).map(Arc::clone)
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut verbs: Vec<_> = self.handlers.keys().copied().collect();
        verbs.sort();
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("schemes", &self.schemes)
            .field("kinds", &self.kinds)
            .field("tags", &self.tags)
            .field("verbs", &verbs)
            .finish()
    }
}

// ── ControllerBuilder ─────────────────────────────────────────────────────────

/// Fluent builder for [`Controller`]. Obtain via [`Controller::builder()`].
///
/// If no kind is declared the controller understands the kinds named by its
/// schemes, which is also what a [`Request`] defaults its kind to.
pub struct ControllerBuilder {
    name: Option<String>,
    schemes: BTreeSet<String>,
    kinds: BTreeSet<String>,
    tags: BTreeSet<String>,
    handlers: HashMap<Verb, BoxedHandler>,
}

impl ControllerBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn scheme(mut self, scheme: &str) -> Self {
        self.schemes.insert(scheme.to_ascii_lowercase());
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kinds.insert(kind.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Register a handler for `verb`, replacing any earlier one.
    pub fn on(mut self, verb: Verb, handler: impl Handler) -> Self {
        self.handlers.insert(verb, handler.into_boxed_handler());
        self
    }

    pub fn get(self, handler: impl Handler) -> Self { self.on(Verb::Get, handler) }
    pub fn post(self, handler: impl Handler) -> Self { self.on(Verb::Post, handler) }
    pub fn put(self, handler: impl Handler) -> Self { self.on(Verb::Put, handler) }
    pub fn delete(self, handler: impl Handler) -> Self { self.on(Verb::Delete, handler) }

    pub fn build(self) -> Controller {
        let kinds = if self.kinds.is_empty() { self.schemes.clone() } else { self.kinds };
        Controller {
            name: self.name,
            schemes: self.schemes,
            kinds,
            tags: self.tags,
            handlers: self.handlers,
        }
    }
}

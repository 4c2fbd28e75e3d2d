//! Middleware layer.
//!
//! Middleware intercepts requests on their way to the dispatcher and
//! responses on their way back, and is the right place for cross-cutting
//! concerns: tracing, validation, placeholder expansion, caching.
//!
//! # The onion
//!
//! ```text
//! invoke(req)
//!   → Trace        ─┐ first declared = outermost
//!     → Validate    │
//!       → Cache     │ each calls `next.run(req)` (or doesn't)
//!         → Dispatcher → controller(s)
//!       ← Cache     │
//!     ← Validate    │
//!   ← Trace        ─┘
//! ```
//!
//! A middleware may answer without calling `next` (a cache hit), rewrite the
//! request before forwarding it, post-process the response, or do work on
//! both sides of the call. It must not swallow errors it does not own.
//!
//! Built-in middleware:
//! - [`trace`]: per-request span with verb, resource, status and latency
//! - [`validate`]: fail-fast request validators
//! - [`env`]: `%NAME%` placeholder expansion from the environment
//! - [`cache`]: GET response cache with write invalidation

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

pub mod cache;
pub mod env;
pub mod trace;
pub mod validate;

/// One stage of a [`Pipeline`](crate::Pipeline).
///
/// Implementations are shared by every in-flight request, so any state they
/// keep must be safe to use concurrently.
///
/// ```rust
/// use async_trait::async_trait;
/// use resmux::middleware::{Middleware, Next};
/// use resmux::{Request, Response, Result};
///
/// /// Hides everything under the `secret` scheme behind a soft miss.
/// struct Hide;
///
/// #[async_trait]
/// impl Middleware for Hide {
///     async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response> {
///         if req.scheme() == "secret" {
///             return Ok(Response::not_found());
///         }
///         next.run(req).await
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response>;
}

/// The rest of the pipeline, as seen from one middleware.
///
/// Consumed by [`Next::run`], so a middleware forwards a request at most once.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    dispatcher: &'a Dispatcher,
    cancel: &'a CancellationToken,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        chain: &'a [Arc<dyn Middleware>],
        dispatcher: &'a Dispatcher,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self { chain, dispatcher, cancel }
    }

    /// The request's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        self.cancel
    }

    /// The dispatcher at the end of the chain. Validators use it to probe
    /// backends without going through the remaining middleware.
    pub fn dispatcher(&self) -> &Dispatcher {
        self.dispatcher
    }

    /// Forwards `req` to the next stage and waits for its outcome.
    pub async fn run(self, req: Request) -> Result<Response> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                let next = Next { chain: rest, ..self };
                head.handle(req, next).await
            }
            None => self.dispatcher.dispatch(req, self.cancel).await,
        }
    }
}

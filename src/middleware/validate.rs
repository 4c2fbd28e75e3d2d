//! Fail-fast request validation.
//!
//! [`Validate`] runs its validators in declaration order before the request
//! goes any further. The first failure aborts the request with
//! [`Error::ValidationFailed`]; later validators never run. Responses pass
//! back through untouched.
//!
//! Reason codes are stable and meant for programs:
//!
//! | Validator | Reason |
//! |---|---|
//! | [`AllowedVerbs`] | `request.verb-not-allowed` |
//! | [`NonEmptyPath`] | `resource.empty-path` |
//! | [`ResourceExists`] | `resource.not-found` |
//! | [`BodyPattern`] | `body.pattern-mismatch` |

use std::collections::BTreeSet;

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result, ValidationError};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::verb::Verb;

/// A single check applied to a request before dispatch.
///
/// Return `Err(ValidationError { .. }.into())` to reject the request. Any
/// other error (a backend failing during a probe, cancellation) propagates
/// as-is.
#[async_trait]
pub trait Validator: Send + Sync + 'static {
    async fn validate(&self, req: &Request, cancel: &CancellationToken) -> Result<()>;
}

/// Middleware running a list of validators, stopping at the first failure.
#[derive(Default)]
pub struct Validate {
    validators: Vec<Box<dyn Validator>>,
}

impl Validate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a validator. Returns `self` for chaining.
    pub fn with(mut self, validator: impl Validator) -> Self {
        self.validators.push(Box::new(validator));
        self
    }
}

#[async_trait]
impl Middleware for Validate {
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response> {
        for validator in &self.validators {
            if let Err(err) = validator.validate(&req, next.cancellation()).await {
                if let Error::ValidationFailed(rejection) = &err {
                    warn!(
                        verb = %req.verb(),
                        resource = %req.id(),
                        reason = rejection.reason(),
                        detail = rejection.detail(),
                        "validation failed",
                    );
                }
                return Err(err);
            }
        }
        next.run(req).await
    }
}

// ── Built-in validators ───────────────────────────────────────────────────────

/// Only the listed verbs may pass.
#[derive(Clone, Debug)]
pub struct AllowedVerbs(BTreeSet<Verb>);

impl AllowedVerbs {
    pub fn new(verbs: impl IntoIterator<Item = Verb>) -> Self {
        Self(verbs.into_iter().collect())
    }

    /// Only `Get`.
    pub fn read_only() -> Self {
        Self::new([Verb::Get])
    }
}

#[async_trait]
impl Validator for AllowedVerbs {
    async fn validate(&self, req: &Request, _cancel: &CancellationToken) -> Result<()> {
        if self.0.contains(&req.verb()) {
            return Ok(());
        }
        Err(ValidationError::new(
            "request.verb-not-allowed",
            format!("{} is not allowed on `{}`", req.verb(), req.id()),
        ).into())
    }
}

/// The resource id must name something: `file://` alone is rejected.
#[derive(Clone, Copy, Debug, Default)]
pub struct NonEmptyPath;

#[async_trait]
impl Validator for NonEmptyPath {
    async fn validate(&self, req: &Request, _cancel: &CancellationToken) -> Result<()> {
        if req.id().path().trim_matches('/').is_empty() {
            return Err(ValidationError::new(
                "resource.empty-path",
                format!("`{}` does not name a resource", req.id()),
            ).into());
        }
        Ok(())
    }
}

/// Mutating requests may only target resources that already exist.
///
/// Probes the backends with a `Get` carrying the same id, kind, hints and
/// properties. The probe goes straight to the dispatcher, bypassing the
/// remaining middleware (and so the cache). Build it with
/// [`PipelineBuilder::layer_with`](crate::PipelineBuilder::layer_with):
///
/// ```rust
/// use resmux::middleware::validate::{ResourceExists, Validate};
/// use resmux::Pipeline;
///
/// let pipeline = Pipeline::builder()
///     .layer_with(|dispatcher| Validate::new().with(ResourceExists::new(dispatcher.clone())))
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct ResourceExists {
    dispatcher: Dispatcher,
    verbs: BTreeSet<Verb>,
}

impl ResourceExists {
    /// Checks `Put` and `Delete`.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher, verbs: [Verb::Put, Verb::Delete].into() }
    }

    /// Checks exactly the given verbs instead.
    pub fn for_verbs(mut self, verbs: impl IntoIterator<Item = Verb>) -> Self {
        self.verbs = verbs.into_iter().collect();
        self
    }
}

#[async_trait]
impl Validator for ResourceExists {
    async fn validate(&self, req: &Request, cancel: &CancellationToken) -> Result<()> {
        if !self.verbs.contains(&req.verb()) {
            return Ok(());
        }

        let probe = Request::get(req.id().clone())
            .kind(req.request_kind())
            .hints(req.routing().clone())
            .properties(req.props().clone());
        let found = self.dispatcher.dispatch(probe, cancel).await?;
        if found.is_not_found() {
            return Err(ValidationError::new(
                "resource.not-found",
                format!("cannot {} `{}`: it does not exist", req.verb(), req.id()),
            ).into());
        }
        Ok(())
    }
}

/// The body of `Post`/`Put` requests must be UTF-8 text matching a pattern.
///
/// The pattern is applied as written; anchor it (`^…$`) to match the whole
/// body.
#[derive(Clone, Debug)]
pub struct BodyPattern {
    pattern: Regex,
}

impl BodyPattern {
    pub fn new(pattern: &str) -> std::result::Result<Self, regex::Error> {
        Ok(Self { pattern: Regex::new(pattern)? })
    }
}

#[async_trait]
impl Validator for BodyPattern {
    async fn validate(&self, req: &Request, _cancel: &CancellationToken) -> Result<()> {
        if !req.verb().has_body() {
            return Ok(());
        }
        match req.payload_str() {
            Some(text) if self.pattern.is_match(text) => Ok(()),
            Some(_) => Err(ValidationError::new(
                "body.pattern-mismatch",
                format!("body for `{}` does not match `{}`", req.id(), self.pattern.as_str()),
            ).into()),
            None => Err(ValidationError::new(
                "body.pattern-mismatch",
                format!("body for `{}` is missing or not UTF-8", req.id()),
            ).into()),
        }
    }
}

/// Adapts a predicate into a validator with a fixed reason code.
///
/// ```rust
/// use resmux::middleware::validate::{validator_fn, Validate};
///
/// let validate = Validate::new().with(validator_fn(
///     "request.kind-required",
///     "requests must declare a kind",
///     |req| !req.request_kind().is_empty(),
/// ));
/// ```
pub fn validator_fn<F>(reason: &'static str, detail: &'static str, check: F) -> FnValidator<F>
where
    F: Fn(&Request) -> bool + Send + Sync + 'static,
{
    FnValidator { reason, detail, check }
}

/// Validator returned by [`validator_fn`].
pub struct FnValidator<F> {
    reason: &'static str,
    detail: &'static str,
    check: F,
}

#[async_trait]
impl<F> Validator for FnValidator<F>
where
    F: Fn(&Request) -> bool + Send + Sync + 'static,
{
    async fn validate(&self, req: &Request, _cancel: &CancellationToken) -> Result<()> {
        if (self.check)(req) {
            return Ok(());
        }
        Err(ValidationError::new(self.reason, self.detail).into())
    }
}

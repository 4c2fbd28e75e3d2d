//! Request dispatch: from one request to the controller(s) that serve it.
//!
//! # Reads fan out, writes don't
//!
//! A `Get` may be served by any of several backends ("try the embedded
//! resource, then the file on disk, then the remote fallback"). Reads are
//! idempotent, so the dispatcher probes candidates in registration order and
//! returns the first answer that is not a `NotFound` soft miss.
//!
//! `Post`, `Put` and `Delete` change state. They must land on exactly one
//! backend: zero candidates is [`Error::ControllerNotFound`], more than one
//! is [`Error::AmbiguousController`] and nothing is invoked.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::controller::Controller;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::request::Request;
use crate::response::Response;

/// Terminal stage of every pipeline. Cheap to clone; the registry is shared.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Self { registry: Arc::new(registry) }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Routes `req` and returns the chosen controller's response.
    ///
    /// Controller errors are returned untouched. If `cancel` fires while a
    /// controller is running, the controller's future is dropped and
    /// [`Error::Cancelled`] is returned; the token is also handed to the
    /// controller so it can stop cooperatively.
    pub async fn dispatch(&self, req: Request, cancel: &CancellationToken) -> Result<Response> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let candidates = self.registry.candidates(&req);
        debug!(
            verb = %req.verb(),
            resource = %req.id(),
            kind = req.request_kind(),
            candidates = candidates.len(),
            "resolved candidates",
        );

        if req.verb().is_mutating() {
            self.dispatch_write(req, candidates, cancel).await
        } else {
            self.dispatch_read(req, candidates, cancel).await
        }
    }

    async fn dispatch_read(
        &self,
        req: Request,
        candidates: Vec<Arc<Controller>>,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        for controller in &candidates {
            let res = invoke(controller, req.clone(), cancel).await?;
            if !res.is_not_found() {
                debug!(controller = %controller.label(), resource = %req.id(), status = %res.status_code(), "controller matched");
                return Ok(res);
            }
            debug!(controller = %controller.label(), resource = %req.id(), "soft miss, trying next");
        }
        debug!(resource = %req.id(), tried = candidates.len(), "no controller has the resource");
        Ok(Response::not_found())
    }

    async fn dispatch_write(
        &self,
        req: Request,
        candidates: Vec<Arc<Controller>>,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        match candidates.as_slice() {
            [] => {
                warn!(verb = %req.verb(), resource = %req.id(), "no controller for mutating request");
                Err(Error::ControllerNotFound { verb: req.verb(), resource: req.id().clone() })
            }
            [controller] => {
                debug!(controller = %controller.label(), verb = %req.verb(), resource = %req.id(), "controller matched");
                invoke(controller, req, cancel).await
            }
            many => {
                let names: Vec<String> = many.iter().map(|c| c.label()).collect();
                warn!(verb = %req.verb(), resource = %req.id(), candidates = ?names, "ambiguous mutating request");
                Err(Error::AmbiguousController {
                    verb: req.verb(),
                    resource: req.id().clone(),
                    candidates: names,
                })
            }
        }
    }
}

/// Runs one controller's handler for the request's verb, racing it against
/// cancellation.
async fn invoke(controller: &Controller, req: Request, cancel: &CancellationToken) -> Result<Response> {
    let Some(handler) = controller.handler(req.verb()) else {
        return Err(Error::ControllerNotFound { verb: req.verb(), resource: req.id().clone() });
    };

    tokio::select! {
        biased;

        () = cancel.cancelled() => Err(Error::Cancelled),
        res = handler.call(req, cancel.clone()) => res,
    }
}

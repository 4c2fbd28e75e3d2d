//! The single entry point callers use: middleware chain + dispatcher.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::controller::Controller;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::middleware::{Middleware, Next};
use crate::registry::Registry;
use crate::request::Request;
use crate::response::Response;

/// Controllers behind an ordered middleware chain.
///
/// Build it once at startup. Cloning is cheap and every clone shares the same
/// registry, middleware instances and cache. Controllers and middleware are
/// dropped together with the last clone.
///
/// ```rust,no_run
/// use resmux::middleware::{cache::Cache, trace::Trace, validate::{NonEmptyPath, Validate}};
/// use resmux::{Controller, Pipeline, Request, Response, ResourceId};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> resmux::Result<()> {
/// let pipeline = Pipeline::builder()
///     .controller(Controller::builder()
///         .scheme("mem")
///         .get(|_req: Request, _cancel: CancellationToken| async { Ok::<_, resmux::Error>(Response::text("hi")) })
///         .build())
///     .layer(Trace)
///     .layer(Validate::new().with(NonEmptyPath))
///     .layer(Cache::builder().build())
///     .build();
///
/// let res = pipeline.invoke(Request::get(ResourceId::parse("mem:///greeting")?)).await?;
/// assert_eq!(res.text_body(), Some("hi"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    middleware: Arc<[Arc<dyn Middleware>]>,
    dispatcher: Dispatcher,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder { registry: Registry::new(), layers: Vec::new() }
    }

    /// Runs `req` through the chain with a fresh, never-cancelled token.
    pub async fn invoke(&self, req: Request) -> Result<Response> {
        self.invoke_with(req, &CancellationToken::new()).await
    }

    /// Runs `req` through the chain. Cancelling `cancel` aborts the request
    /// with [`Error::Cancelled`](crate::Error::Cancelled).
    pub async fn invoke_with(&self, req: Request, cancel: &CancellationToken) -> Result<Response> {
        Next::new(&self.middleware, &self.dispatcher, cancel).run(req).await
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

type LayerFactory = Box<dyn FnOnce(&Dispatcher) -> Arc<dyn Middleware>>;

/// Fluent builder for [`Pipeline`]. Obtain via [`Pipeline::builder()`].
///
/// Controllers keep registration order; middleware wraps in declaration
/// order, the first layer being the outermost.
pub struct PipelineBuilder {
    registry: Registry,
    layers: Vec<LayerFactory>,
}

impl PipelineBuilder {
    pub fn controller(mut self, controller: Controller) -> Self {
        self.registry = self.registry.register(controller);
        self
    }

    /// Appends every controller of `registry`, keeping its order.
    pub fn registry(mut self, registry: Registry) -> Self {
        let mut merged = self.registry;
        for controller in registry.into_controllers() {
            merged = merged.register_shared(controller);
        }
        self.registry = merged;
        self
    }

    pub fn layer(self, middleware: impl Middleware) -> Self {
        self.layer_shared(Arc::new(middleware))
    }

    /// Adds a middleware instance that is also held elsewhere, such as a
    /// [`Cache`](crate::middleware::cache::Cache) the application inspects.
    pub fn layer_shared(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.layers.push(Box::new(move |_: &Dispatcher| middleware));
        self
    }

    /// Adds a middleware built from the finished dispatcher, for stages that
    /// need to consult backends themselves.
    pub fn layer_with<M, F>(mut self, factory: F) -> Self
    where
        M: Middleware,
        F: FnOnce(&Dispatcher) -> M + 'static,
    {
        self.layers.push(Box::new(move |dispatcher: &Dispatcher| {
            Arc::new(factory(dispatcher)) as Arc<dyn Middleware>
        }));
        self
    }

    pub fn build(self) -> Pipeline {
        let dispatcher = Dispatcher::new(self.registry);
        let middleware: Arc<[Arc<dyn Middleware>]> = self.layers
            .into_iter()
            .map(|factory| factory(&dispatcher))
            .collect();
        debug!(
            controllers = dispatcher.registry().len(),
            middleware = middleware.len(),
            "pipeline built",
        );
        Pipeline { middleware, dispatcher }
    }
}

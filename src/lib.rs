//! # resmux
//!
//! Routes requests against URI-addressed resources to pluggable backend
//! controllers, through an ordered middleware pipeline.
//!
//! ## The contract
//!
//! An application declares controllers up front: which schemes they serve,
//! which kinds of request they accept, an optional name and tags, and an
//! async handler per verb. resmux picks the backend.
//!
//! - **Reads fall through.** A `GET` tries every eligible controller in
//!   registration order. A `NotFound` answer means "not mine", and the next
//!   controller is asked. The first real answer wins.
//! - **Writes never guess.** A `PUT`, `POST` or `DELETE` needs exactly one
//!   eligible controller. Zero or several is an error, and nothing runs.
//! - **Everything is cancellable.** Every request carries a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken) that reaches
//!   the controller.
//!
//! What sits between the caller and the dispatcher is up to the application:
//!
//! - [`middleware::trace`]: one tracing span per request
//! - [`middleware::validate`]: fail-fast checks before any backend runs
//! - [`middleware::env`]: `%NAME%` expansion in resource ids
//! - [`middleware::cache`]: GET cache invalidated by writes
//! - [`Gateway`]: the whole pipeline over HTTP
//!
//! ## Quick start
//!
//! ```rust
//! use resmux::middleware::{cache::Cache, trace::Trace};
//! use resmux::{Controller, Pipeline, Request, ResourceId, Result};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! let pipeline = Pipeline::builder()
//!     .controller(Controller::builder()
//!         .name("embedded")
//!         .scheme("file")
//!         .get(embedded)
//!         .build())
//!     .layer(Trace)
//!     .layer(Cache::builder().build())
//!     .build();
//!
//! let res = pipeline.invoke(Request::get(ResourceId::parse("file:///motd")?)).await?;
//! assert_eq!(res.text_body(), Some("hello"));
//! # Ok(())
//! # }
//!
//! async fn embedded(req: Request, _cancel: CancellationToken) -> Result<Option<&'static str>> {
//!     // `None` answers NotFound, letting the next controller try.
//!     Ok((req.id().path() == "motd").then_some("hello"))
//! }
//! ```

mod controller;
mod dispatcher;
mod error;
mod gateway;
mod pipeline;
mod properties;
mod registry;
mod request;
mod resource_id;
mod response;
mod status;
mod verb;

pub mod middleware;

pub use controller::{Controller, ControllerBuilder, Handler};
pub use dispatcher::Dispatcher;
pub use error::{BoxError, Error, Result, ValidationError};
pub use gateway::Gateway;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use properties::{Properties, RoutingHints};
pub use registry::Registry;
pub use request::Request;
pub use resource_id::ResourceId;
pub use response::{Body, ContentType, IntoResponse, Response, ResponseBuilder};
pub use status::Status;
pub use verb::Verb;

//! Unified error type.

use crate::resource_id::ResourceId;
use crate::verb::Verb;

/// Boxed error produced by a backend controller.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// `Result` alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by resmux's fallible operations.
///
/// A missing resource is *not* an error: controllers answer with a
/// [`Status::NotFound`](crate::Status::NotFound) response and the dispatcher
/// treats it as a soft miss. `Error` covers routing failures, validation
/// rejections, cancellation and genuine backend faults.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A mutating request matched no controller.
    #[error("no controller can {verb} `{resource}`")]
    ControllerNotFound { verb: Verb, resource: ResourceId },

    /// A mutating request matched several controllers; none of them ran.
    #[error("{verb} `{resource}` is ambiguous between controllers [{}]", .candidates.join(", "))]
    AmbiguousController {
        verb: Verb,
        resource: ResourceId,
        candidates: Vec<String>,
    },

    #[error(transparent)]
    ValidationFailed(#[from] ValidationError),

    /// The request was cancelled before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// A controller failed. The original error is kept as-is and can be
    /// recovered with [`Error::backend_source`].
    #[error("{source}")]
    Backend {
        #[source]
        source: BoxError,
    },

    #[error("invalid resource id `{0}`")]
    InvalidResourceId(String),

    #[error("invalid socket address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps a backend failure without altering it.
    pub fn backend(err: impl Into<BoxError>) -> Self {
        Self::Backend { source: err.into() }
    }

    /// The backend error as its concrete type, if this is a backend failure
    /// of type `E`.
    pub fn backend_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Backend { source } => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The validation reason code, if the request was rejected by a validator.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::ValidationFailed(v) => Some(v.reason()),
            _ => None,
        }
    }
}

/// Rejection raised by a validator before dispatch.
///
/// `reason` is a stable, machine-readable code (`"resource.empty-path"`);
/// `detail` is for humans and may change between releases.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("validation failed ({reason}): {detail}")]
pub struct ValidationError {
    reason: &'static str,
    detail: String,
}

impl ValidationError {
    pub fn new(reason: &'static str, detail: impl Into<String>) -> Self {
        Self { reason, detail: detail.into() }
    }

    pub fn reason(&self) -> &'static str { self.reason }
    pub fn detail(&self) -> &str { &self.detail }
}

//! Response status as a typed enum.
//!
//! ```rust
//! use resmux::{Response, Status};
//!
//! // soft miss, lets the dispatcher try the next controller
//! Response::status(Status::NotFound);
//!
//! // return Status directly from a handler; resmux wraps it
//! async fn drop_all(
//!     _req: resmux::Request,
//!     _cancel: tokio_util::sync::CancellationToken,
//! ) -> resmux::Result<Status> {
//!     Ok(Status::Ok)
//! }
//! ```

/// Outcome class of a [`Response`](crate::Response).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Status {
    /// The controller served the request.
    Ok,
    /// The controller does not have the resource. Not an error: on reads the
    /// dispatcher moves on to the next candidate.
    NotFound,
    /// The request could not be pinned to one backend.
    Ambiguous,
    /// The request was rejected before reaching a backend.
    ValidationFailed,
    /// The backend answered but reported a failure as a value.
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok               => "ok",
            Self::NotFound         => "not-found",
            Self::Ambiguous        => "ambiguous",
            Self::ValidationFailed => "validation-failed",
            Self::Error            => "error",
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn is_not_found(self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<Status> for http::StatusCode {
    fn from(s: Status) -> http::StatusCode {
        match s {
            Status::Ok               => http::StatusCode::OK,
            Status::NotFound         => http::StatusCode::NOT_FOUND,
            Status::Ambiguous        => http::StatusCode::CONFLICT,
            Status::ValidationFailed => http::StatusCode::UNPROCESSABLE_ENTITY,
            Status::Error            => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

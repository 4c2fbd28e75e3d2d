//! Request verb as a typed enum.
//!
//! Four verbs, nothing else. `Get` is the only idempotent one and the only
//! one the dispatcher is allowed to fan out across several controllers.

use std::fmt;
use std::str::FromStr;

/// The operation a [`Request`](crate::Request) asks a controller to perform.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum Verb {
    Delete,
    Get,
    Post,
    Put,
}

impl Verb {
    /// Returns the uppercase representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Get    => "GET",
            Self::Post   => "POST",
            Self::Put    => "PUT",
        }
    }

    /// `true` for verbs that change backend state and therefore must resolve
    /// to exactly one controller.
    pub fn is_mutating(self) -> bool {
        !matches!(self, Self::Get)
    }

    /// `true` for verbs that carry a request body.
    pub fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }
}

/// Parses a verb name. Case-insensitive: `"get"`, `"Get"` and `"GET"` all work.
impl FromStr for Verb {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DELETE" => Ok(Self::Delete),
            "GET"    => Ok(Self::Get),
            "POST"   => Ok(Self::Post),
            "PUT"    => Ok(Self::Put),
            _        => Err(()),
        }
    }
}

/// Maps an HTTP method onto a verb. Anything outside the four supported
/// methods has no verb and is rejected by the gateway with `405`.
impl TryFrom<&http::Method> for Verb {
    type Error = ();

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        match method.as_str() {
            "DELETE" => Ok(Self::Delete),
            "GET"    => Ok(Self::Get),
            "POST"   => Ok(Self::Post),
            "PUT"    => Ok(Self::Put),
            _        => Err(()),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

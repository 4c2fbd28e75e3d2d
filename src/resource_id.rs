//! URI-like resource identifiers.
//!
//! ```text
//! file:///config/app.json?raw
//! └┬─┘   └──────┬───────┘ └┬┘
//! scheme       path      query
//! ```
//!
//! The scheme picks the family of controllers that may serve the request and
//! is compared case-insensitively (it is stored lowercased). The path is kept
//! verbatim minus leading slashes, so `file:///a.txt`, `file://a.txt` and
//! `file:a.txt` all name the same resource.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Identifier of a resource: scheme, hierarchical path and optional query.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ResourceId {
    scheme: String,
    path: String,
    query: Option<String>,
}

impl ResourceId {
    /// Parses `scheme:[//]path[?query][#fragment]`. The fragment is dropped.
    ///
    /// Fails only when the scheme is missing or contains characters outside
    /// `[A-Za-z0-9+.-]`. An empty path is accepted here; rejecting it is a
    /// validation concern.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidResourceId(s.to_owned()))?;

        let valid_scheme = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c));
        if !valid_scheme {
            return Err(Error::InvalidResourceId(s.to_owned()));
        }

        let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query.to_owned())),
            None => (rest, None),
        };

        Ok(Self::new(scheme, path).with_query_opt(query))
    }

    /// Builds an identifier from parts. The scheme is lowercased and leading
    /// slashes are trimmed from the path.
    pub fn new(scheme: &str, path: &str) -> Self {
        Self {
            scheme: scheme.to_ascii_lowercase(),
            path: path.trim_start_matches('/').to_owned(),
            query: None,
        }
    }

    pub fn scheme(&self) -> &str { &self.scheme }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }

    /// Returns a copy with the path replaced.
    pub fn with_path(&self, path: &str) -> Self {
        Self { path: path.trim_start_matches('/').to_owned(), ..self.clone() }
    }

    /// Returns a copy with the query replaced.
    pub fn with_query(&self, query: impl Into<String>) -> Self {
        Self { query: Some(query.into()), ..self.clone() }
    }

    fn with_query_opt(mut self, query: Option<String>) -> Self {
        self.query = query;
        self
    }

    /// `true` when `self` and `other` name the same resource, ignoring the query.
    pub fn same_resource(&self, other: &ResourceId) -> bool {
        self.scheme == other.scheme && self.path == other.path
    }

    /// `true` when `self` is `parent` itself or lives below it in the path
    /// hierarchy. The query is ignored; an empty `parent` path contains every
    /// resource of the scheme.
    ///
    /// `file:///a/b` is under `file:///a`; `file:///ab` is not.
    pub fn is_under(&self, parent: &ResourceId) -> bool {
        if self.scheme != parent.scheme {
            return false;
        }
        let prefix = parent.path.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        match self.path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:///{}", self.scheme, self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}

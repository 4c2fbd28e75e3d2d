//! `%NAME%` placeholder expansion.
//!
//! `file:///%APPDATA%/app/config.json` becomes
//! `file:///C:/Users/me/AppData/Roaming/app/config.json` before dispatch.
//! Placeholders that do not resolve stay exactly as written; backends may
//! give them their own meaning. Resource paths never start with `/`, so a
//! value that does (`%HOME%` = `/home/me`) loses that slash when it leads
//! the path.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::resource_id::ResourceId;
use crate::response::Response;

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Rewrites the path and query of each request's resource id, substituting
/// `%NAME%` with the value of `NAME`.
#[derive(Clone)]
pub struct ExpandEnv {
    lookup: Lookup,
}

impl ExpandEnv {
    /// Resolves names against the process environment.
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves names with `lookup` instead of the process environment.
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self { lookup: Arc::new(lookup) }
    }
}

impl Default for ExpandEnv {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl Middleware for ExpandEnv {
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response> {
        match self.expand_id(&req) {
            Some(expanded) => {
                debug!(from = %req.id(), to = %expanded, "expanded placeholders");
                next.run(req.with_id(expanded)).await
            }
            None => next.run(req).await,
        }
    }
}

impl ExpandEnv {
    /// The request's id with placeholders substituted, or `None` when
    /// nothing resolved.
    fn expand_id(&self, req: &Request) -> Option<ResourceId> {
        let id = req.id();
        let path = expand(id.path(), &*self.lookup);
        let query = id.query().map(|q| expand(q, &*self.lookup));

        let changed = matches!(path, Cow::Owned(_)) || matches!(query, Some(Cow::Owned(_)));
        if !changed {
            return None;
        }

        let expanded = id.with_path(&path);
        Some(match query {
            Some(query) => expanded.with_query(query),
            None => expanded,
        })
    }
}

/// Replaces every resolvable `%NAME%` in `input`. Borrows when nothing changes.
pub(crate) fn expand<'a>(input: &'a str, lookup: &dyn Fn(&str) -> Option<String>) -> Cow<'a, str> {
    if !input.contains('%') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut replaced = false;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('%') else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };

        let name = &after[..end];
        match is_name(name).then(|| lookup(name)).flatten() {
            Some(value) => {
                out.push_str(&value);
                replaced = true;
                rest = &after[end + 1..];
            }
            None => {
                // The closing `%` may open the next placeholder.
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    if replaced { Cow::Owned(out) } else { Cow::Borrowed(input) }
}

fn is_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

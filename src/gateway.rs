//! HTTP front door for a [`Pipeline`].
//!
//! Each mount maps a URL pattern ending in a `{*path}` catch-all to a scheme
//! and kind. `GET /files/config/app.json` under the mount
//! `/files/{*path} → file` becomes `GET file:///config/app.json`.
//!
//! | HTTP | Request |
//! |---|---|
//! | `GET` `POST` `PUT` `DELETE` | the matching [`Verb`]; any other method is `405` |
//! | query string | the resource id's query |
//! | `x-controller: name` | routing hint: only the controller `name` |
//! | `x-tags: a, b` | routing hint: controllers tagged `a` or `b` |
//! | `x-prop-<key>: value` | property `<key>` |
//! | body | payload of `POST` / `PUT` |
//!
//! Response properties travel back as `x-prop-<key>` headers.
//!
//! # Graceful shutdown
//!
//! [`Gateway::serve`] stops accepting on SIGTERM or Ctrl-C, lets every
//! in-flight connection finish, then returns. Under Kubernetes, set
//! `terminationGracePeriodSeconds` above your slowest backend call.
//! [`Gateway::serve_with_shutdown`] takes any future instead of the signals.
//!
//! A client that disconnects mid-request cancels the request's token, so
//! backends watching it can stop early.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use matchit::Router as MountTable;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::properties::Properties;
use crate::request::Request;
use crate::resource_id::ResourceId;
use crate::response::Response;
use crate::verb::Verb;

const PROP_PREFIX: &str = "x-prop-";

#[derive(Clone, Debug)]
struct Mount {
    scheme: String,
    kind: String,
}

/// Serves a pipeline over HTTP/1.1 and HTTP/2.
///
/// ```rust,no_run
/// use resmux::{Gateway, Pipeline};
///
/// # async fn run(pipeline: Pipeline) -> resmux::Result<()> {
/// Gateway::bind("0.0.0.0:8080")?
///     .mount("/files/{*path}", "file", "file")
///     .mount("/settings/{*path}", "sql", "sql")
///     .serve(pipeline)
///     .await
/// # }
/// ```
pub struct Gateway {
    addr: SocketAddr,
    mounts: MountTable<Mount>,
}

impl Gateway {
    /// Configures the gateway to listen on `addr` (`host:port`).
    pub fn bind(addr: &str) -> Result<Self> {
        Ok(Self { addr: addr.parse()?, mounts: MountTable::new() })
    }

    /// Routes URLs matching `pattern` to resources of `scheme` with `kind`.
    /// The pattern's `{*path}` segment becomes the resource path.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is malformed or conflicts with an earlier mount.
    /// Mounts are fixed at startup, so this surfaces immediately.
    pub fn mount(mut self, pattern: &str, scheme: &str, kind: &str) -> Self {
        let mount = Mount { scheme: scheme.to_ascii_lowercase(), kind: kind.to_owned() };
        self.mounts
            .insert(pattern, mount)
            .unwrap_or_else(|e| panic!("invalid mount `{pattern}`: {e}"));
        self
    }

    /// Serves until SIGTERM or Ctrl-C, then drains in-flight connections.
    pub async fn serve(self, pipeline: Pipeline) -> Result<()> {
        self.serve_with_shutdown(pipeline, shutdown_signal()).await
    }

    /// Serves until `shutdown` resolves, then drains in-flight connections.
    pub async fn serve_with_shutdown(
        self,
        pipeline: Pipeline,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        let local = listener.local_addr()?;
        let mounts = Arc::new(self.mounts);

        info!(addr = %local, "resmux gateway listening");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let mounts = Arc::clone(&mounts);
                    let pipeline = pipeline.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let mounts = Arc::clone(&mounts);
                            let pipeline = pipeline.clone();
                            async move { Ok::<_, Infallible>(handle(&mounts, &pipeline, req).await) }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            debug!(%peer, "connection error: {e}");
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("resmux gateway stopped");
        Ok(())
    }
}

// ── Request handling ──────────────────────────────────────────────────────────

async fn handle(
    mounts: &MountTable<Mount>,
    pipeline: &Pipeline,
    req: hyper::Request<Incoming>,
) -> http::Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();

    let Ok(verb) = Verb::try_from(&parts.method) else {
        return plain(StatusCode::METHOD_NOT_ALLOWED, format!("method {} not supported", parts.method));
    };
    let Ok(matched) = mounts.at(parts.uri.path()) else {
        return plain(StatusCode::NOT_FOUND, format!("nothing mounted at {}", parts.uri.path()));
    };
    let path = matched.params.get("path").unwrap_or_default();

    let body = if verb.has_body() {
        match body.collect().await {
            Ok(collected) => Some(collected.to_bytes()),
            Err(e) => {
                warn!("failed to read request body: {e}");
                return plain(StatusCode::BAD_REQUEST, "unreadable request body");
            }
        }
    } else {
        None
    };

    let request = to_request(verb, matched.value, path, parts.uri.query(), &parts.headers, body);

    // Dropping this future (client gone) cancels the token on the way out.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let outcome = pipeline.invoke_with(request, &cancel).await;
    guard.disarm();

    match outcome {
        Ok(res) => into_http(res),
        Err(e) => from_error(&e),
    }
}

fn to_request(
    verb: Verb,
    mount: &Mount,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    body: Option<Bytes>,
) -> Request {
    let mut id = ResourceId::new(&mount.scheme, path);
    if let Some(query) = query {
        id = id.with_query(query);
    }

    let mut req = Request::new(verb, id).kind(mount.kind.as_str());
    if let Some(name) = header_str(headers, "x-controller") {
        req = req.name(name.trim());
    }
    if let Some(tags) = header_str(headers, "x-tags") {
        for tag in tags.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            req = req.tag(tag);
        }
    }

    let properties: Properties = headers.iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(PROP_PREFIX)?;
            Some((key.to_owned(), value.to_str().ok()?.to_owned()))
        })
        .collect();
    req = req.properties(properties);

    match body {
        Some(body) => req.body(body),
        None => req,
    }
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name)?.to_str().ok()
}

// ── Response mapping ──────────────────────────────────────────────────────────

fn into_http(res: Response) -> http::Response<Full<Bytes>> {
    let (status, content_type, body, properties) = res.into_parts();

    let mut out = http::Response::new(Full::new(body.into_bytes()));
    *out.status_mut() = status.into();

    let headers = out.headers_mut();
    if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(ct.as_str()).ok()) {
        headers.insert(CONTENT_TYPE, value);
    }
    for (key, value) in properties.iter() {
        let name = HeaderName::try_from(format!("{PROP_PREFIX}{key}"));
        match (name, HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => { headers.append(name, value); }
            _ => debug!(property = key, "property not representable as a header, dropped"),
        }
    }
    out
}

fn from_error(err: &Error) -> http::Response<Full<Bytes>> {
    let status = match err {
        Error::ControllerNotFound { .. } => StatusCode::NOT_FOUND,
        Error::AmbiguousController { .. } => StatusCode::CONFLICT,
        Error::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %err, "request failed");
    }
    plain(status, err.to_string())
}

fn plain(status: StatusCode, body: impl Into<Bytes>) -> http::Response<Full<Bytes>> {
    let mut out = http::Response::new(Full::new(body.into()));
    *out.status_mut() = status;
    out.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    out
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on SIGTERM or Ctrl-C (Ctrl-C only on Windows). If a handler
/// cannot be installed, that signal is logged and ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => { term.recv().await; }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}

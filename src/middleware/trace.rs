//! Per-request tracing span.
//!
//! Place it first so the span covers every other stage. All events the
//! pipeline emits further in (candidate resolution, cache hits, validation
//! failures) are recorded inside it.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, info_span, warn, Instrument};

use crate::error::Result;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Opens a `request` span with `verb`, `resource` and `kind`, and logs the
/// outcome with its latency.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

#[async_trait]
impl Middleware for Trace {
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response> {
        let span = info_span!(
            "request",
            verb = %req.verb(),
            resource = %req.id(),
            kind = req.request_kind(),
        );

        async move {
            let started = Instant::now();
            info!("request started");

            let outcome = next.run(req).await;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            match &outcome {
                Ok(res) => info!(status = %res.status_code(), elapsed_ms, "request finished"),
                Err(e) if e.is_cancelled() => info!(elapsed_ms, "request cancelled"),
                Err(e) => warn!(error = %e, elapsed_ms, "request failed"),
            }
            outcome
        }
        .instrument(span)
        .await
    }
}

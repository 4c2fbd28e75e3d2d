//! resmux example: layered file lookup and tagged settings stores behind HTTP.
//!
//! Run with (from the crate root):
//!   RUST_LOG=resmux=debug,info DEMO_DIR=demos cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/files/motd                  # embedded copy
//!   curl http://localhost:3000/files/Cargo.toml            # falls through to disk
//!   curl -X PUT http://localhost:3000/settings/timeout -d 45
//!        # 409: both settings stores serve `sql`
//!   curl -X PUT http://localhost:3000/settings/timeout -H 'x-tags: test' -d 45
//!   curl http://localhost:3000/settings/timeout -H 'x-tags: test'
//!   curl http://localhost:3000/files/%DEMO_DIR%/basic.rs   # %NAME% expansion

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use resmux::middleware::cache::Cache;
use resmux::middleware::env::ExpandEnv;
use resmux::middleware::trace::Trace;
use resmux::middleware::validate::{BodyPattern, NonEmptyPath, ResourceExists, Validate};
use resmux::{Controller, Error, Gateway, Pipeline, Request, Response, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let body_pattern = BodyPattern::new(r"^\d+$").map_err(Error::backend)?;

    let pipeline = Pipeline::builder()
        .controller(embedded_files())
        .controller(physical_files())
        .controller(settings("prod", [("timeout", "30")]))
        .controller(settings("test", [("timeout", "5")]))
        .layer(Trace)
        .layer(ExpandEnv::new())
        .layer_with(move |dispatcher| {
            Validate::new()
                .with(NonEmptyPath)
                .with(ResourceExists::new(dispatcher.clone()))
                .with(body_pattern)
        })
        .layer(Cache::builder().build())
        .build();

    Gateway::bind("0.0.0.0:3000")?
        .mount("/files/{*path}", "file", "file")
        .mount("/settings/{*path}", "sql", "sql")
        .serve(pipeline)
        .await
}

// Answers from a table compiled into the binary; anything else is a soft miss.
fn embedded_files() -> Controller {
    Controller::builder()
        .name("embedded")
        .scheme("file")
        .get(|req: Request, _cancel: CancellationToken| async move {
            let text = match req.id().path() {
                "motd" => Some("served from the binary\n"),
                _ => None,
            };
            Ok::<_, Error>(text)
        })
        .build()
}

// Reads relative to the working directory; resource paths carry no leading
// slash. Missing files are NotFound, other I/O failures are backend errors.
fn physical_files() -> Controller {
    Controller::builder()
        .name("physical")
        .scheme("file")
        .get(|req: Request, cancel: CancellationToken| async move {
            let path = req.id().path().to_owned();
            tokio::select! {
                () = cancel.cancelled() => Err(Error::Cancelled),
                read = tokio::fs::read(&path) => match read {
                    Ok(bytes) => Ok(Response::bytes(bytes)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Response::not_found()),
                    Err(e) => Err(Error::backend(e)),
                },
            }
        })
        .build()
}

// An in-memory key/value store standing in for a settings database.
fn settings<const N: usize>(tag: &str, seed: [(&str, &str); N]) -> Controller {
    let rows: HashMap<String, String> = seed.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    let rows = Arc::new(Mutex::new(rows));
    let (read, write, remove) = (Arc::clone(&rows), Arc::clone(&rows), rows);

    Controller::builder()
        .name(format!("settings-{tag}"))
        .scheme("sql")
        .tag(tag)
        .get(move |req: Request, _cancel: CancellationToken| {
            let value = lock(&read).get(req.id().path()).cloned();
            async move { Ok::<_, Error>(value) }
        })
        .put(move |req: Request, _cancel: CancellationToken| {
            let value = req.payload_str().unwrap_or_default().to_owned();
            lock(&write).insert(req.id().path().to_owned(), value);
            async { Ok::<_, Error>(Response::text("stored")) }
        })
        .delete(move |req: Request, _cancel: CancellationToken| {
            let removed = lock(&remove).remove(req.id().path()).is_some();
            async move { Ok::<_, Error>(removed.then(|| Response::text("deleted"))) }
        })
        .build()
}

fn lock(rows: &Mutex<HashMap<String, String>>) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
    rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

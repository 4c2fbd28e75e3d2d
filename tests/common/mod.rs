//! Controllers that record every call, shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use resmux::{Controller, ControllerBuilder, Error, Request, Response, Verb};
use tokio_util::sync::CancellationToken;

/// Ordered log of `"<controller> <VERB> <path> <body>"` lines.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    /// Names of the controllers called, in order.
    pub fn callers(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|line| line.split(' ').next().unwrap_or_default().to_owned())
            .collect()
    }

    pub fn push(&self, line: impl Into<String>) {
        self.0.lock().unwrap().push(line.into());
    }

    fn record(&self, name: &str, req: &Request) {
        self.push(format!(
            "{name} {} {} {}",
            req.verb(),
            req.id().path(),
            req.payload_str().unwrap_or("-"),
        ));
    }
}

/// A controller named `name` on `scheme` that answers every verb in `verbs`
/// with `answer`, logging each call.
pub fn fixed(log: &CallLog, name: &str, scheme: &str, verbs: &[Verb], answer: Response) -> ControllerBuilder {
    verbs.iter().fold(
        Controller::builder().name(name).scheme(scheme),
        |builder, &verb| {
            let (log, name, answer) = (log.clone(), name.to_owned(), answer.clone());
            builder.on(verb, move |req: Request, _cancel: CancellationToken| {
                log.record(&name, &req);
                let answer = answer.clone();
                async move { Ok::<_, Error>(answer) }
            })
        },
    )
}

/// Answers every `Get` with NotFound.
pub fn empty(log: &CallLog, name: &str, scheme: &str) -> ControllerBuilder {
    fixed(log, name, scheme, &[Verb::Get], Response::not_found())
}

/// Answers `Get` with `text`, and acknowledges `Put` and `Delete`.
pub fn holding(log: &CallLog, name: &str, scheme: &str, text: &str) -> ControllerBuilder {
    fixed(log, name, scheme, &[Verb::Get], Response::text(text))
        .put(ack(log, name))
        .delete(ack(log, name))
}

fn ack(
    log: &CallLog,
    name: &str,
) -> impl Fn(Request, CancellationToken) -> std::future::Ready<resmux::Result<&'static str>> + Send + Sync + 'static {
    let (log, name) = (log.clone(), name.to_owned());
    move |req: Request, _cancel: CancellationToken| {
        log.record(&name, &req);
        std::future::ready(Ok("ack"))
    }
}

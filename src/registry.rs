//! Ordered controller registry.
//!
//! Registration order is priority order. Build it once at startup, hand it to
//! a [`Dispatcher`](crate::Dispatcher) or [`Pipeline`](crate::Pipeline), and
//! never touch it again. Lookups are pure queries over an immutable list, so
//! concurrent requests share it without locking.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::controller::Controller;
use crate::request::Request;

/// The ordered set of controllers a dispatcher chooses from.
#[derive(Debug, Default)]
pub struct Registry {
    controllers: Vec<Arc<Controller>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { controllers: Vec::new() }
    }

    /// Append a controller. Returns `self` for chaining; earlier
    /// registrations win ambiguous reads.
    ///
    /// ```rust
    /// # use resmux::{Controller, Registry};
    /// let registry = Registry::new()
    ///     .register(Controller::builder().name("embedded").scheme("file").build())
    ///     .register(Controller::builder().name("physical").scheme("file").build());
    /// assert_eq!(registry.len(), 2);
    /// ```
    pub fn register(mut self, controller: Controller) -> Self {
        self.controllers.push(Arc::new(controller));
        self
    }

    pub(crate) fn register_shared(mut self, controller: Arc<Controller>) -> Self {
        self.controllers.push(controller);
        self
    }

    pub(crate) fn into_controllers(self) -> Vec<Arc<Controller>> {
        self.controllers
    }

    /// Controllers eligible for `scheme` and `kind`, narrowed by an optional
    /// exact `name` and an optional tag set, in registration order.
    ///
    /// A tag filter matches a controller sharing *at least one* tag with it.
    pub fn filter(
        &self,
        scheme: &str,
        kind: &str,
        name: Option<&str>,
        tags: Option<&BTreeSet<String>>,
    ) -> Vec<Arc<Controller>> {
        self.controllers.iter()
            .filter(|c| c.serves_scheme(scheme))
            .filter(|c| c.kinds().contains(kind))
            .filter(|c| name.is_none_or(|name| c.name() == Some(name)))
            .filter(|c| tags.is_none_or(|tags| !tags.is_disjoint(c.tags())))
            .map(Arc::clone)
            .collect()
    }

    /// [`filter`](Registry::filter) driven by a request's scheme, kind and
    /// routing hints, keeping only controllers that handle its verb.
    pub fn candidates(&self, req: &Request) -> Vec<Arc<Controller>> {
        let hints = req.routing();
        let mut matched = self.filter(req.scheme(), req.request_kind(), hints.name(), hints.tags());
        matched.retain(|c| c.handles(req.verb()));
        matched
    }

    pub fn len(&self) -> usize { self.controllers.len() }
    pub fn is_empty(&self) -> bool { self.controllers.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &Controller> {
        self.controllers.iter().map(AsRef::as_ref)
    }
}

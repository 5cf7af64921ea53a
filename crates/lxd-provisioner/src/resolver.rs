//! Action resolution: lifecycle verb plus instance spec to remote request.
//!
//! The resolver validates input and delegates wire-format decisions to a
//! [`RequestBuilder`]. It never performs I/O.

use crate::models::{RemoteRequest, Resolution};
use crate::Result;
use lxd_core::types::{validate_name, InstanceSpec, LifecycleAction, PlanOptions};
use lxd_core::Error;
use std::sync::Arc;
use tracing::debug;

/// Builds the wire request for a validated action.
///
/// Implementations decide paths, methods and body layout. The shipped
/// implementation is [`RouteTable`](crate::routes::RouteTable).
pub trait RequestBuilder: Send + Sync {
    /// Build the request for a remote action.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the spec lacks a value the request
    /// needs.
    fn build(&self, action: LifecycleAction, spec: &InstanceSpec) -> Result<RemoteRequest>;
}

/// Validates instance specs and resolves them to remote requests.
#[derive(Clone)]
pub struct ActionResolver {
    plans: PlanOptions,
    builder: Arc<dyn RequestBuilder>,
}

impl ActionResolver {
    /// Create a resolver using the default plan options.
    #[must_use]
    pub fn new(builder: Arc<dyn RequestBuilder>) -> Self {
        Self {
            plans: PlanOptions::default(),
            builder,
        }
    }

    /// Override the published plan options.
    #[must_use]
    pub fn with_plan_options(mut self, plans: PlanOptions) -> Self {
        self.plans = plans;
        self
    }

    /// Access the plan options sizes are checked against.
    #[must_use]
    pub fn plan_options(&self) -> &PlanOptions {
        &self.plans
    }

    /// Resolve an action for the given instance.
    ///
    /// `Renew` always resolves to [`Resolution::NoOp`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when a required field is missing, the
    /// name is not a valid hostname, or a size is outside the plan options.
    pub fn resolve(&self, action: LifecycleAction, spec: &InstanceSpec) -> Result<Resolution> {
        if !action.is_remote() {
            debug!(%action, "action resolved locally");
            return Ok(Resolution::NoOp);
        }

        let missing: Vec<&str> = action
            .required_fields()
            .iter()
            .filter(|field| !spec.has(**field))
            .map(|field| field.key())
            .collect();
        if !missing.is_empty() {
            let verb = if missing.len() == 1 { "is" } else { "are" };
            return Err(Error::InvalidInput(format!(
                "{} {verb} required for the {action} action",
                missing.join(", ")
            )));
        }

        if let Some(name) = &spec.name {
            validate_name(name)?;
        }

        self.plans
            .check_partial(spec.cores, spec.memory_gb, spec.storage_gb)?;

        let request = self.builder.build(action, spec)?;
        debug!(%action, method = %request.method, path = %request.path, "action resolved");
        Ok(Resolution::Remote(request))
    }
}

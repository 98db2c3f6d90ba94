//! Mounted component chains.
//!
//! A flat route becomes one instance per component, built innermost first so
//! that every instance gets the one below it as its outlet.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::component::{Component, Signature};
use crate::context::{Context, Instance, InstanceTools, Outlet};
use crate::RenderOutput;

/// Instances of a flat route, each rendered inside the previous one's outlet.
pub struct MountedChain<R> {
    route: String,
    instances: Arc<[Instance<R>]>,
}

impl<R: RenderOutput> MountedChain<R> {
    /// Instantiate `components` innermost first. Cached instances are reused.
    pub(crate) fn build(
        context: &Context<R>,
        route: &str,
        components: &[Component<R>],
        tools: &InstanceTools,
    ) -> Self {
        let mut instances: Vec<Instance<R>> = components
            .iter()
            .rev()
            .map(|component| context.create_instance(component, tools.clone()))
            .collect();
        instances.reverse();

        Self {
            route: route.to_string(),
            instances: instances.into(),
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn instances(&self) -> &[Instance<R>] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Render the outermost instance with the rest nested in its outlet.
    pub fn render(&self, props: &Value) -> R {
        Outlet::new(Arc::clone(&self.instances), 0).render(props)
    }

    pub fn signatures(&self) -> Vec<Signature> {
        self.instances
            .iter()
            .map(|instance| instance.signature().clone())
            .collect()
    }
}

impl<R> fmt::Debug for MountedChain<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountedChain")
            .field("route", &self.route)
            .field("instances", &self.instances)
            .finish()
    }
}

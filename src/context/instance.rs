//! Live component instances.
//!
//! An [`Instance`] is a component connected to a context: it owns its
//! connected actions and child instances and renders through the registry's
//! render-skip decision.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::component::{Component, Signature};
use crate::paths::LocalModel;
use crate::router::{Links, Navigator};
use crate::RenderOutput;

use super::action::ConnectedActions;
use super::registry::Registry;
use super::ContextInner;

/// Everything a render function gets to see.
pub struct RenderTools<'a, R> {
    pub model: &'a LocalModel,
    pub action: &'a ConnectedActions<R>,
    pub child: &'a Children<R>,
    pub props: &'a Value,
    pub outlet: &'a Outlet<R>,
    pub navigate: Option<&'a Navigator>,
    pub link: Option<&'a Links>,
}

/// Router surfaces handed to instances. Empty outside a routed app.
#[derive(Clone, Default)]
pub struct InstanceTools {
    pub navigate: Option<Navigator>,
    pub link: Option<Links>,
}

impl InstanceTools {
    pub fn new(navigate: Navigator, link: Links) -> Self {
        Self {
            navigate: Some(navigate),
            link: Some(link),
        }
    }
}

/// Named child instances of a component.
pub struct Children<R> {
    instances: BTreeMap<String, Instance<R>>,
}

impl<R> Clone for Children<R> {
    fn clone(&self) -> Self {
        Self {
            instances: self.instances.clone(),
        }
    }
}

impl<R: RenderOutput> Children<R> {
    pub(crate) fn new(instances: BTreeMap<String, Instance<R>>) -> Self {
        Self { instances }
    }

    /// Render child `name` with `props`. Unknown children render nothing.
    pub fn render(&self, name: &str, props: &Value) -> R {
        match self.instances.get(name) {
            Some(instance) => instance.render(props, &Outlet::empty()),
            None => {
                tracing::warn!(child = %name, "Render of unknown child component");
                R::default()
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Instance<R>> {
        self.instances.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    fn any_dirty(&self, registry: &Registry<R>) -> bool {
        self.instances.values().any(|child| child.is_dirty(registry))
    }
}

/// Insertion point for the rest of a routed chain.
pub struct Outlet<R> {
    chain: Option<Arc<[Instance<R>]>>,
    position: usize,
}

impl<R> Clone for Outlet<R> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            position: self.position,
        }
    }
}

impl<R: RenderOutput> Outlet<R> {
    pub fn empty() -> Self {
        Self {
            chain: None,
            position: 0,
        }
    }

    pub(crate) fn new(chain: Arc<[Instance<R>]>, position: usize) -> Self {
        Self {
            chain: Some(chain),
            position,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_none()
    }

    fn current(&self) -> Option<&Instance<R>> {
        self.chain.as_ref()?.get(self.position)
    }

    fn rest(&self) -> Outlet<R> {
        match &self.chain {
            Some(chain) => Outlet::new(Arc::clone(chain), self.position + 1),
            None => Outlet::empty(),
        }
    }

    /// Render the next instance of the chain, nesting the remainder inside it.
    pub fn render(&self, props: &Value) -> R {
        match self.current() {
            Some(instance) => instance.render(props, &self.rest()),
            None => R::default(),
        }
    }

    fn any_dirty(&self, registry: &Registry<R>) -> bool {
        let Some(chain) = &self.chain else {
            return false;
        };
        chain
            .iter()
            .skip(self.position)
            .any(|instance| instance.is_dirty(registry))
    }
}

struct InstanceInner<R> {
    component: Component<R>,
    context: Weak<ContextInner<R>>,
    actions: ConnectedActions<R>,
    children: Children<R>,
    tools: InstanceTools,
}

/// A component connected to a context. Cheap to clone.
pub struct Instance<R> {
    inner: Arc<InstanceInner<R>>,
}

impl<R> Clone for Instance<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: RenderOutput> Instance<R> {
    pub(crate) fn new(
        component: Component<R>,
        context: Weak<ContextInner<R>>,
        actions: ConnectedActions<R>,
        children: Children<R>,
        tools: InstanceTools,
    ) -> Self {
        Self {
            inner: Arc::new(InstanceInner {
                component,
                context,
                actions,
                children,
                tools,
            }),
        }
    }

    pub fn signature(&self) -> &Signature {
        self.inner.component.signature()
    }

    pub fn component(&self) -> &Component<R> {
        &self.inner.component
    }

    pub fn actions(&self) -> &ConnectedActions<R> {
        &self.inner.actions
    }

    pub fn children(&self) -> &Children<R> {
        &self.inner.children
    }

    /// Two handles to the same live instance.
    pub fn ptr_eq(&self, other: &Instance<R>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Render without props or outlet.
    pub fn call(&self) -> R {
        self.render(&Value::Null, &Outlet::empty())
    }

    /// Render with `props` and `outlet`.
    ///
    /// The cached output is reused when the last commit came from an
    /// unrelated component, the props are unchanged and nothing nested
    /// inside (children or outlet) needs a render either. A torn-down or
    /// dropped context renders `R::default()`.
    pub fn render(&self, props: &Value, outlet: &Outlet<R>) -> R {
        let Some(context) = self.inner.context.upgrade() else {
            return R::default();
        };
        let signature = self.signature();

        {
            let registry = context.registry.lock();
            if !registry.contains(signature) {
                return R::default();
            }
            if !registry.should_render(signature)
                && !self.inner.children.any_dirty(&registry)
                && !outlet.any_dirty(&registry)
            {
                if let Some(cached) = registry.cached_render(signature) {
                    if cached.props == *props {
                        tracing::trace!(component = %self.inner.component.label(), "Reusing cached render");
                        return cached.value.clone();
                    }
                }
            }
        }

        let component = &self.inner.component;
        let model = context.local_model(&component.projection_paths(), component.defaults());
        let tools = RenderTools {
            model: &model,
            action: &self.inner.actions,
            child: &self.inner.children,
            props,
            outlet,
            navigate: self.inner.tools.navigate.as_ref(),
            link: self.inner.tools.link.as_ref(),
        };
        let value = component.template().render(&tools);

        context
            .registry
            .lock()
            .cache_render(signature, props.clone(), value.clone());
        value
    }

    /// Whether this instance or anything below it would not reuse its cache.
    fn is_dirty(&self, registry: &Registry<R>) -> bool {
        registry.should_render(self.signature()) || self.inner.children.any_dirty(registry)
    }
}

impl<R> std::fmt::Debug for Instance<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("component", &self.inner.component)
            .finish()
    }
}

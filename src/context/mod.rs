//! State context.
//!
//! The [`Context`] owns Global State, the commit queue, the component
//! registry and the runtime error log. Connected actions never write state
//! directly: they queue commits, and the context applies them on
//! [`Context::flush`] or [`Context::settle`]. That keeps the state observed by
//! a render pass stable until the pass is over, even when the render function
//! dispatches actions itself.

mod action;
mod instance;
mod queue;
mod registry;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use crate::component::{Component, INIT_ACTIONS};
use crate::config::{ContextConfig, ValidationMode};
use crate::error::{AppError, SourceType};
use crate::paths::{self, LocalModel, Path, PathMap};
use crate::router::MountedChain;
use crate::RenderOutput;

pub use action::{
    Action, ConnectedAction, ConnectedActions, DeferredTransform, Effect, Provenance, Source,
    Transform,
};
pub use instance::{Children, Instance, InstanceTools, Outlet, RenderTools};

pub(crate) use action::ActionBinding;
pub(crate) use queue::PendingCommit;

use queue::CommitQueue;
use registry::Registry;

/// Called once for every applied commit, with no context locks held.
pub type UpdateSink<R> = Arc<dyn Fn(&Context<R>, &Provenance) + Send + Sync>;

/// Label used for commits that have no owning component.
pub const CONTEXT_SOURCE: &str = "Context";

pub(crate) struct Store<R> {
    state: Value,
    mounted: Option<Arc<MountedChain<R>>>,
}

pub(crate) struct ContextInner<R> {
    store: Mutex<Store<R>>,
    pub(crate) registry: Mutex<Registry<R>>,
    pub(crate) queue: CommitQueue<R>,
    errors: Mutex<Vec<AppError>>,
    sink: RwLock<Option<UpdateSink<R>>>,
    pub(crate) config: ContextConfig,
}

impl<R: RenderOutput> ContextInner<R> {
    pub(crate) fn local_model(&self, paths: &PathMap, defaults: &LocalModel) -> LocalModel {
        paths::project(&self.store.lock().state, paths, defaults)
    }

    pub(crate) fn report(&self, error: AppError) {
        tracing::error!(
            source_type = %error.source_type,
            source = %error.source_name,
            "{}",
            error.message
        );
        self.errors.lock().push(error);
    }
}

/// Shared handle to a state context.
pub struct Context<R> {
    inner: Arc<ContextInner<R>>,
}

impl<R> Clone for Context<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`Context`].
pub struct ContextBuilder<R> {
    initial: Value,
    config: ContextConfig,
    sink: Option<UpdateSink<R>>,
}

impl<R: RenderOutput> ContextBuilder<R> {
    pub fn config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    pub fn on_update<F>(mut self, sink: F) -> Self
    where
        F: Fn(&Context<R>, &Provenance) + Send + Sync + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }

    pub fn build(self) -> Context<R> {
        let state = match self.initial {
            Value::Null => Value::Object(Map::new()),
            state => state,
        };
        Context {
            inner: Arc::new(ContextInner {
                store: Mutex::new(Store {
                    state,
                    mounted: None,
                }),
                registry: Mutex::new(Registry::new()),
                queue: CommitQueue::new(),
                errors: Mutex::new(Vec::new()),
                sink: RwLock::new(self.sink),
                config: self.config,
            }),
        }
    }
}

impl<R: RenderOutput> Context<R> {
    /// Context over `initial` with the default configuration.
    pub fn new(initial: Value) -> Self {
        Self::builder(initial).build()
    }

    pub fn builder(initial: Value) -> ContextBuilder<R> {
        ContextBuilder {
            initial,
            config: ContextConfig::default(),
            sink: None,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.inner.config
    }

    /// Replace the update sink.
    pub fn on_update<F>(&self, sink: F)
    where
        F: Fn(&Context<R>, &Provenance) + Send + Sync + 'static,
    {
        *self.inner.sink.write() = Some(Arc::new(sink));
    }

    /// Live instance of `component`, created on first request.
    ///
    /// A new instance registers the component, instantiates its declared
    /// children with the same tools, connects its actions and fires its
    /// `@init`/`$init` action once.
    pub fn create_instance(&self, component: &Component<R>, tools: InstanceTools) -> Instance<R> {
        let signature = component.signature();
        if let Some(instance) = self.inner.registry.lock().cached_instance(signature) {
            return instance;
        }

        self.inner
            .registry
            .lock()
            .register(signature, component.paths());

        let children = component
            .template()
            .children()
            .iter()
            .map(|(name, child)| (name.clone(), self.create_instance(child, tools.clone())))
            .collect();

        let actions = ConnectedActions::new(ActionBinding {
            context: Arc::downgrade(&self.inner),
            paths: component.projection_paths(),
            defaults: component.defaults().clone(),
            actions: component.template().actions().clone(),
            source: Source::Component {
                signature: signature.clone(),
                name: component.name().map(str::to_string),
            },
            sockets: Some(component.template().sockets().to_vec()),
        });

        let instance = Instance::new(
            component.clone(),
            Arc::downgrade(&self.inner),
            actions.clone(),
            instance::Children::new(children),
            tools,
        );
        self.inner
            .registry
            .lock()
            .cache_instance(signature, instance.clone());

        tracing::debug!(
            component = %component.label(),
            signature = %signature,
            "Instance created"
        );

        for init in INIT_ACTIONS {
            if actions.contains(init) {
                if let Err(e) = actions.dispatch(init, &[]) {
                    self.inner.report(AppError::new(
                        SourceType::Component,
                        component.label(),
                        e.to_string(),
                    ));
                }
            }
        }

        instance
    }

    /// Connect `actions` to `paths` outside of any component.
    ///
    /// Commits from these actions carry an external provenance labelled
    /// `label` (or `Context`), so the next render pass renders everything.
    pub fn connect_actions(
        &self,
        paths: PathMap,
        defaults: LocalModel,
        actions: BTreeMap<String, Action>,
        label: Option<&str>,
    ) -> ConnectedActions<R> {
        ConnectedActions::new(ActionBinding {
            context: Arc::downgrade(&self.inner),
            paths,
            defaults,
            actions,
            source: Source::External(label.unwrap_or(CONTEXT_SOURCE).to_string()),
            sockets: None,
        })
    }

    /// Project the current state through `paths`.
    pub fn local_model(&self, paths: &PathMap, defaults: &LocalModel) -> LocalModel {
        self.inner.local_model(paths, defaults)
    }

    /// Queue a commit that changes nothing and only notifies the sink.
    pub fn trigger_update(&self) {
        self.inner.queue.push(PendingCommit {
            paths: PathMap::new(),
            model: LocalModel::new(),
            provenance: Provenance::new(
                Source::External(CONTEXT_SOURCE.to_string()),
                "triggerUpdate",
            ),
            mount: None,
            check: None,
        });
    }

    pub(crate) fn enqueue(&self, commit: PendingCommit<R>) {
        self.inner.queue.push(commit);
    }

    /// Apply every commit that is ready now. Returns how many were applied.
    ///
    /// Commits queued by the update sink while flushing are applied in the
    /// same call.
    pub fn flush(&self) -> usize {
        let mut applied = 0;
        while let Some(commit) = self.inner.queue.try_next() {
            if self.apply(commit) {
                applied += 1;
            }
        }
        applied
    }

    /// Apply commits until nothing is queued or in flight, waiting for
    /// deferred effects to resolve. Never returns while an effect stalls.
    pub async fn settle(&self) -> usize {
        let mut applied = 0;
        while let Some(commit) = self.inner.queue.next().await {
            if self.apply(commit) {
                applied += 1;
            }
        }
        applied
    }

    /// [`Context::settle`] bounded by `timeout`.
    pub async fn settle_timeout(
        &self,
        timeout: Duration,
    ) -> Result<usize, tokio::time::error::Elapsed> {
        tokio::time::timeout(timeout, self.settle()).await
    }

    /// Number of commits queued or still being resolved.
    pub fn pending(&self) -> usize {
        self.inner.queue.outstanding()
    }

    fn apply(&self, commit: PendingCommit<R>) -> bool {
        let PendingCommit {
            paths,
            model,
            provenance,
            mount,
            check,
        } = commit;

        if let Some(check) = check {
            let mode = self.inner.config.validation;
            if let Some(error) =
                action::check_local_model(mode, &provenance, &model, &check.sockets)
            {
                self.inner.report(error);
                if mode == ValidationMode::Strict {
                    tracing::warn!(source = %provenance, "Commit rejected by strict validation");
                    return false;
                }
            }
        }

        {
            let mut store = self.inner.store.lock();
            paths::commit(&mut store.state, &paths, &model);
            if let Some(chain) = mount {
                store.mounted = Some(chain);
            }
        }
        self.inner.registry.lock().record_action(&provenance);

        if self.inner.config.debug_messages {
            tracing::debug!(
                source = %provenance.source.label(),
                action = %provenance.name,
                "Commit applied"
            );
        }

        let sink = self.inner.sink.read().clone();
        if let Some(sink) = sink {
            sink(self, &provenance);
        }
        true
    }

    /// Snapshot of Global State.
    pub fn state(&self) -> Value {
        self.inner.store.lock().state.clone()
    }

    /// Value at `path`, if present.
    pub fn read(&self, path: &Path) -> Option<Value> {
        paths::read(&self.inner.store.lock().state, path).cloned()
    }

    /// Chain currently mounted by the router.
    pub fn mounted(&self) -> Option<Arc<MountedChain<R>>> {
        self.inner.store.lock().mounted.clone()
    }

    /// Runtime errors recorded so far.
    pub fn errors(&self) -> Vec<AppError> {
        self.inner.errors.lock().clone()
    }

    pub fn report(&self, error: AppError) {
        self.inner.report(error);
    }

    /// Drop every cached instance and render, the mounted chain and pending
    /// commits. Existing instances render `R::default()` afterwards.
    pub fn teardown(&self) {
        self.inner.registry.lock().clear();
        self.inner.store.lock().mounted = None;
        self.inner.queue.clear();
        tracing::info!("Context torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Template;
    use crate::path;
    use crate::paths::path_map;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> Component<String> {
        let template = Template::builder()
            .name("Counter")
            .socket("count")
            .action("increment", |_args| {
                Effect::now(|mut model| {
                    let count = model["count"].as_i64().unwrap_or(0);
                    model.insert("count".to_string(), json!(count + 1));
                    model
                })
            })
            .render(|tools| format!("count={}", tools.model["count"]))
            .build();
        Component::new(&template, path_map([("count", path!["counter"])])).unwrap()
    }

    #[test]
    fn commits_wait_for_flush() {
        let context = Context::new(json!({"counter": 0}));
        let instance = context.create_instance(&counter(), InstanceTools::default());

        instance.actions().dispatch("increment", &[]).unwrap();
        assert_eq!(context.read(&path!["counter"]), Some(json!(0)));
        assert_eq!(context.pending(), 1);

        assert_eq!(context.flush(), 1);
        assert_eq!(context.read(&path!["counter"]), Some(json!(1)));
        assert_eq!(instance.call(), "count=1");
    }

    #[test]
    fn instances_are_cached_per_signature() {
        let context = Context::new(json!({}));
        let component = counter();
        let a = context.create_instance(&component, InstanceTools::default());
        let b = context.create_instance(&component.clone().named("Again"), InstanceTools::default());
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn sink_runs_once_per_commit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let context = Context::builder(json!({"counter": 0}))
            .on_update(move |_, provenance| {
                assert_eq!(provenance.name, "increment");
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        let instance = context.create_instance(&counter(), InstanceTools::default());

        instance.actions().dispatch("increment", &[]).unwrap();
        instance.actions().dispatch("increment", &[]).unwrap();
        context.flush();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_action_is_an_error() {
        let context = Context::new(json!({}));
        let instance = context.create_instance(&counter(), InstanceTools::default());
        let err = instance.actions().dispatch("decrement", &[]).unwrap_err();
        assert!(matches!(err, crate::error::ActionError::UnknownAction { .. }));
    }

    #[test]
    fn teardown_drops_caches() {
        let context = Context::new(json!({"counter": 3}));
        let instance = context.create_instance(&counter(), InstanceTools::default());
        assert_eq!(instance.call(), "count=3");

        instance.actions().dispatch("increment", &[]).unwrap();
        context.teardown();
        assert_eq!(context.pending(), 0);
        assert_eq!(context.flush(), 0);
        assert_eq!(instance.call(), "");
        assert_eq!(context.read(&path!["counter"]), Some(json!(3)));
    }

    #[test]
    fn dropped_context_rejects_actions() {
        let context = Context::new(json!({}));
        let instance = context.create_instance(&counter(), InstanceTools::default());
        drop(context);
        let err = instance.actions().dispatch("increment", &[]).unwrap_err();
        assert!(matches!(err, crate::error::ActionError::ContextDropped { .. }));
    }

    #[test]
    fn trigger_update_notifies_without_changes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let context: Context<String> = Context::builder(json!({"a": 1}))
            .on_update(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        context.trigger_update();
        context.flush();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(context.state(), json!({"a": 1}));
    }
}

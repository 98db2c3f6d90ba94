//! Application wiring.
//!
//! [`App`] connects a context to one top component and renders it after
//! every commit. [`RoutedApp`] does the same for a router, rendering whatever
//! chain is mounted.

use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::component::Component;
use crate::config::Config;
use crate::context::{Context, Instance, InstanceTools};
use crate::error::DeclarationError;
use crate::logging;
use crate::router::{FlatEntry, History, Router, Routes};
use crate::RenderOutput;

type RenderSink<R> = Arc<dyn Fn(R) + Send + Sync>;

/// Context plus a top component instance.
pub struct App<R> {
    context: Context<R>,
    top: Instance<R>,
    render: RenderSink<R>,
}

impl<R: RenderOutput> App<R> {
    pub fn new<F>(initial: Value, top: &Component<R>, render: F) -> Self
    where
        F: Fn(R) + Send + Sync + 'static,
    {
        Self::with_config(initial, top, Config::default(), render)
    }

    pub fn with_config<F>(initial: Value, top: &Component<R>, config: Config, render: F) -> Self
    where
        F: Fn(R) + Send + Sync + 'static,
    {
        logging::init_tracing(&config.context);
        let render: RenderSink<R> = Arc::new(render);
        let slot: Arc<OnceLock<Instance<R>>> = Arc::new(OnceLock::new());

        let sink_slot = Arc::clone(&slot);
        let sink_render = Arc::clone(&render);
        let context = Context::builder(initial)
            .config(config.context)
            .on_update(move |_, _| {
                if let Some(top) = sink_slot.get() {
                    sink_render(top.call());
                }
            })
            .build();

        let top = context.create_instance(top, InstanceTools::default());
        let _ = slot.set(top.clone());

        Self {
            context,
            top,
            render,
        }
    }

    /// First render. Later renders follow commits.
    pub fn start(&self) {
        self.context.flush();
        (self.render)(self.top.call());
    }

    pub fn context(&self) -> &Context<R> {
        &self.context
    }

    pub fn instance(&self) -> &Instance<R> {
        &self.top
    }

    pub fn flush(&self) -> usize {
        self.context.flush()
    }

    pub async fn settle(&self) -> usize {
        self.context.settle().await
    }
}

/// Context plus router; renders the mounted chain.
pub struct RoutedApp<R> {
    context: Context<R>,
    router: Router<R>,
}

pub struct RoutedAppBuilder<R> {
    initial: Value,
    routes: Routes<R>,
    config: Config,
    layout: Option<Component<R>>,
    history: Option<Arc<dyn History>>,
}

impl<R: RenderOutput> RoutedAppBuilder<R> {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn layout(mut self, layout: Component<R>) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn history(mut self, history: Arc<dyn History>) -> Self {
        self.history = Some(history);
        self
    }

    /// Fails on invalid routes, including a tree without a `/` route.
    pub fn build<F>(self, render: F) -> Result<RoutedApp<R>, DeclarationError>
    where
        F: Fn(R) + Send + Sync + 'static,
    {
        logging::init_tracing(&self.config.context);
        let context = Context::builder(self.initial)
            .config(self.config.context)
            .on_update(move |context: &Context<R>, _| {
                if let Some(chain) = context.mounted() {
                    render(chain.render(&Value::Null));
                }
            })
            .build();

        let mut builder = Router::builder(&context, self.routes).config(self.config.router);
        if let Some(layout) = self.layout {
            builder = builder.layout(layout);
        }
        if let Some(history) = self.history {
            builder = builder.history(history);
        }
        let router = builder.build()?;

        if !matches!(router.table().by_path("/"), Some(FlatEntry::Route(_))) {
            return Err(DeclarationError::MissingRootRoute);
        }

        Ok(RoutedApp { context, router })
    }
}

impl<R: RenderOutput> RoutedApp<R> {
    pub fn builder(initial: Value, routes: Routes<R>) -> RoutedAppBuilder<R> {
        RoutedAppBuilder {
            initial,
            routes,
            config: Config::default(),
            layout: None,
            history: None,
        }
    }

    /// Follow the history and activate the route of the current (or
    /// default) location.
    pub fn start(&self) {
        self.router.start();
        if self.router.config().default_path.is_none() {
            self.router.sync();
        }
        self.context.flush();
    }

    pub fn context(&self) -> &Context<R> {
        &self.context
    }

    pub fn router(&self) -> &Router<R> {
        &self.router
    }

    pub fn flush(&self) -> usize {
        self.context.flush()
    }

    pub async fn settle(&self) -> usize {
        self.context.settle().await
    }
}

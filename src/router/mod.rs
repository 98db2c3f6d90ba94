//! Router.
//!
//! A [`Router`] flattens a [`Routes`] tree once and then drives the context:
//! `navigate` and `link` produce locations, `set_route` mounts the chain of a
//! flat route and runs its terminal action, and location changes coming from
//! the [`History`] are matched back to routes.
//!
//! Route state lives in Global State under two reserved fields:
//! `$app.route` (`{name, path, params}`) and `$app.instance` (signatures of
//! the mounted chain). The live chain goes into the context's mounted slot in
//! the same commit.

mod chain;
mod history;
mod links;
mod routes;
mod template;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::component::Component;
use crate::config::RouterConfig;
use crate::context::{Context, InstanceTools, PendingCommit, Provenance, Source};
use crate::error::{AppError, RouteError, SourceType};
use crate::paths::{path_map, LocalModel, PathMap};
use crate::{path, RenderOutput};

pub use chain::MountedChain;
pub use history::{History, Listener, ListenerId, MemoryHistory};
pub use links::{Links, Navigator};
pub use routes::{FlatEntry, FlatRoute, FlatTable, Route, RouteNode, Routes, WILDCARD};
pub use template::{parse_query, split_location, PathTemplate};

/// Provenance label of router commits.
pub const ROUTER_SOURCE: &str = "Router";

/// Oldest switches are dropped past this many.
pub const MAX_SWITCHES: usize = 256;

/// Name under which a route's terminal action is connected.
const ROUTE_ACTION: &str = "action";

fn route_paths() -> PathMap {
    path_map([
        ("route", path!["$app", "route"]),
        ("instance", path!["$app", "instance"]),
    ])
}

/// What a location resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Route {
        name: String,
        params: Map<String, Value>,
    },
    Redirect(String),
    Unmatched,
}

/// One route activation, for debugging.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSwitch {
    pub from: Option<String>,
    pub to: String,
    pub at: SystemTime,
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveRoute {
    name: String,
    params: Map<String, Value>,
}

struct RouterInner<R> {
    context: Context<R>,
    table: FlatTable<R>,
    history: Arc<dyn History>,
    links: Links,
    navigator: Navigator,
    config: RouterConfig,
    chains: Mutex<HashMap<String, Arc<MountedChain<R>>>>,
    active: Mutex<Option<ActiveRoute>>,
    switches: Mutex<VecDeque<RouteSwitch>>,
    redirects: AtomicUsize,
    started: AtomicBool,
}

/// Shared handle to a router.
pub struct Router<R> {
    inner: Arc<RouterInner<R>>,
}

impl<R> Clone for Router<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub struct RouterBuilder<R> {
    context: Context<R>,
    routes: Routes<R>,
    layout: Option<Component<R>>,
    history: Option<Arc<dyn History>>,
    config: RouterConfig,
}

impl<R: RenderOutput> RouterBuilder<R> {
    /// Component prepended to every chain.
    pub fn layout(mut self, layout: Component<R>) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn history(mut self, history: Arc<dyn History>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Router<R>, crate::error::DeclarationError> {
        let mut table = self.routes.flatten()?;
        if let Some(layout) = &self.layout {
            table.prepend_layout(layout);
        }

        let templates: BTreeMap<String, PathTemplate> = table
            .routes()
            .map(|route| (route.name().to_string(), route.template().clone()))
            .collect();
        let links = Links::new(templates, &self.config.root_path);

        let history = self.history.unwrap_or_else(|| {
            let initial = links.prefixed("/");
            Arc::new(MemoryHistory::new(&initial))
        });
        let navigator = Navigator::new(links.clone(), Arc::clone(&history));

        tracing::info!(
            routes = table.routes().count(),
            root = %self.config.root_path,
            "Router created"
        );

        Ok(Router {
            inner: Arc::new(RouterInner {
                context: self.context,
                table,
                history,
                links,
                navigator,
                config: self.config,
                chains: Mutex::new(HashMap::new()),
                active: Mutex::new(None),
                switches: Mutex::new(VecDeque::new()),
                redirects: AtomicUsize::new(0),
                started: AtomicBool::new(false),
            }),
        })
    }
}

impl<R: RenderOutput> Router<R> {
    pub fn builder(context: &Context<R>, routes: Routes<R>) -> RouterBuilder<R> {
        RouterBuilder {
            context: context.clone(),
            routes,
            layout: None,
            history: None,
            config: RouterConfig::default(),
        }
    }

    pub fn context(&self) -> &Context<R> {
        &self.inner.context
    }

    pub fn table(&self) -> &FlatTable<R> {
        &self.inner.table
    }

    pub fn history(&self) -> &Arc<dyn History> {
        &self.inner.history
    }

    pub fn links(&self) -> &Links {
        &self.inner.links
    }

    pub fn navigator(&self) -> &Navigator {
        &self.inner.navigator
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    /// Tools handed to every instance mounted by this router.
    pub fn tools(&self) -> InstanceTools {
        InstanceTools::new(self.inner.navigator.clone(), self.inner.links.clone())
    }

    /// Location of route `name`.
    pub fn link(&self, name: &str, params: &Value) -> Result<String, RouteError> {
        self.inner.links.link(name, params)
    }

    /// Push the location of route `name` to the history.
    pub fn navigate(&self, name: &str, params: &Value) -> Result<(), RouteError> {
        self.inner.navigator.navigate(name, params)
    }

    /// Name of the active route.
    pub fn current(&self) -> Option<String> {
        self.inner.active.lock().as_ref().map(|a| a.name.clone())
    }

    /// Most recent activations, oldest first.
    pub fn switches(&self) -> Vec<RouteSwitch> {
        self.inner.switches.lock().iter().cloned().collect()
    }

    /// Activate route `name` with `params`.
    ///
    /// The chain is built on the first activation and reused afterwards. The
    /// terminal action, if any, runs once per activation with the params
    /// object as its argument; then `$app.route`, `$app.instance` and the
    /// mounted chain change in one commit. Activating the active route with
    /// equal params again changes nothing.
    pub fn set_route(&self, name: &str, params: &Value) -> Result<(), RouteError> {
        let route = self
            .inner
            .table
            .get(name)
            .ok_or_else(|| RouteError::UnknownRoute {
                name: name.to_string(),
            })?;
        let params = links::as_params(params);
        let next = ActiveRoute {
            name: name.to_string(),
            params: params.clone(),
        };

        let previous = {
            let mut active = self.inner.active.lock();
            if active.as_ref() == Some(&next) {
                tracing::debug!(route = %name, "Route already active");
                return Ok(());
            }
            active.replace(next).map(|a| a.name)
        };

        let chain = self.chain_for(route);

        if let Some((component, action)) = route.terminal_action() {
            let mut actions = BTreeMap::new();
            actions.insert(ROUTE_ACTION.to_string(), Arc::clone(action));
            let connected = self.inner.context.connect_actions(
                component.projection_paths(),
                component.defaults().clone(),
                actions,
                Some(ROUTER_SOURCE),
            );
            if let Err(e) = connected.dispatch(ROUTE_ACTION, &[Value::Object(params.clone())]) {
                self.inner
                    .context
                    .report(AppError::new(SourceType::Route, name, e.to_string()));
            }
        }

        let mut model = LocalModel::new();
        model.insert(
            "route".to_string(),
            json!({"name": name, "path": route.path(), "params": params}),
        );
        model.insert(
            "instance".to_string(),
            Value::Array(
                chain
                    .signatures()
                    .into_iter()
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            ),
        );
        self.inner.context.enqueue(PendingCommit {
            paths: route_paths(),
            model,
            provenance: Provenance::new(Source::External(ROUTER_SOURCE.to_string()), name),
            mount: Some(chain),
            check: None,
        });

        tracing::info!(
            from = previous.as_deref().unwrap_or("-"),
            route = %name,
            "Route switch"
        );
        let mut switches = self.inner.switches.lock();
        if switches.len() == MAX_SWITCHES {
            switches.pop_front();
        }
        switches.push_back(RouteSwitch {
            from: previous,
            to: name.to_string(),
            at: SystemTime::now(),
        });
        Ok(())
    }

    fn chain_for(&self, route: &FlatRoute<R>) -> Arc<MountedChain<R>> {
        if let Some(chain) = self.inner.chains.lock().get(route.name()) {
            return Arc::clone(chain);
        }
        // Built without holding the lock: instance creation runs init actions.
        let chain = Arc::new(MountedChain::build(
            &self.inner.context,
            route.name(),
            route.components(),
            &self.tools(),
        ));
        Arc::clone(
            self.inner
                .chains
                .lock()
                .entry(route.name().to_string())
                .or_insert(chain),
        )
    }

    /// Match `location` against the flat table.
    ///
    /// Routes and redirects are tried in declaration order; the wildcard
    /// redirect applies only when nothing else matches. Query parameters are
    /// merged under the path parameters.
    pub fn resolve(&self, location: &str) -> Resolution {
        let Some(relative) = self.inner.links.strip_root(location) else {
            return Resolution::Unmatched;
        };
        let (path, query) = split_location(&relative);

        for entry in self.inner.table.entries() {
            match entry {
                FlatEntry::Route(route) => {
                    if let Some(found) = route.template().matches(path) {
                        let mut params = query;
                        params.extend(found);
                        return Resolution::Route {
                            name: route.name().to_string(),
                            params,
                        };
                    }
                }
                FlatEntry::Redirect { path: from, to } => {
                    if from != WILDCARD && from == path {
                        return Resolution::Redirect(to.clone());
                    }
                }
            }
        }

        match self.inner.table.wildcard() {
            Some(to) => Resolution::Redirect(to.to_string()),
            None => Resolution::Unmatched,
        }
    }

    /// React to a location change.
    ///
    /// A route match activates the route; a redirect pushes its target; an
    /// unmatched location does nothing.
    pub fn handle_location(&self, location: &str) {
        match self.resolve(location) {
            Resolution::Route { name, params } => {
                self.inner.redirects.store(0, Ordering::SeqCst);
                if let Err(e) = self.set_route(&name, &Value::Object(params)) {
                    self.inner
                        .context
                        .report(AppError::new(SourceType::Route, name, e.to_string()));
                }
            }
            Resolution::Redirect(to) => {
                let hops = self.inner.redirects.fetch_add(1, Ordering::SeqCst) + 1;
                if hops > self.inner.config.max_redirects {
                    tracing::warn!(
                        location = %location,
                        hops = hops - 1,
                        "Redirect chain too long; giving up"
                    );
                    self.inner.redirects.store(0, Ordering::SeqCst);
                    return;
                }
                tracing::debug!(from = %location, to = %to, "Redirect");
                self.inner.navigator.push(&to);
            }
            Resolution::Unmatched => {
                self.inner.redirects.store(0, Ordering::SeqCst);
                tracing::debug!(location = %location, "No route matches location");
            }
        }
    }

    /// Start following the history. Pushes the default path if configured.
    /// Calling it again does nothing.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let router: Weak<RouterInner<R>> = Arc::downgrade(&self.inner);
        self.inner.history.listen(Arc::new(move |location: &str| {
            if let Some(inner) = router.upgrade() {
                Router { inner }.handle_location(location);
            }
        }));

        if let Some(default_path) = &self.inner.config.default_path {
            self.inner.navigator.push(default_path);
        }
    }

    /// Handle the current history location.
    pub fn sync(&self) {
        let location = self.inner.history.location();
        self.handle_location(&location);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Template;

    fn page(name: &'static str) -> Component<String> {
        let template = Template::builder()
            .name(name)
            .render(move |tools| format!("{}[{}]", name, tools.outlet.render(&Value::Null)))
            .build();
        Component::new(&template, PathMap::new()).unwrap()
    }

    fn router(context: &Context<String>) -> Router<String> {
        let routes = Routes::new()
            .route(
                "/",
                Route::new("Home", page("Home"))
                    .subroutes(Routes::new().route("/about", Route::new("About", page("About")))),
            )
            .route("/books/:id", Route::new("Book", page("Book")))
            .redirect("/old", "/about")
            .redirect("*", "/");
        Router::builder(context, routes).build().unwrap()
    }

    #[test]
    fn resolve_routes_redirects_and_wildcard() {
        let context = Context::new(json!({}));
        let router = router(&context);

        assert_eq!(
            router.resolve("/books/9?tab=x"),
            Resolution::Route {
                name: "Book".to_string(),
                params: json!({"id": "9", "tab": "x"}).as_object().cloned().unwrap(),
            }
        );
        assert_eq!(router.resolve("/old"), Resolution::Redirect("/about".to_string()));
        assert_eq!(router.resolve("/nope"), Resolution::Redirect("/".to_string()));
    }

    #[test]
    fn set_route_commits_route_and_chain_together() {
        let context = Context::new(json!({}));
        let router = router(&context);

        router.set_route("About", &Value::Null).unwrap();
        assert!(context.mounted().is_none());
        context.flush();

        let mounted = context.mounted().unwrap();
        assert_eq!(mounted.render(&Value::Null), "Home[About[]]");
        assert_eq!(
            context.read(&path!["$app", "route"]),
            Some(json!({"name": "About", "path": "/about", "params": {}}))
        );
        let signatures = context.read(&path!["$app", "instance"]).unwrap();
        assert_eq!(signatures.as_array().unwrap().len(), 2);
    }

    #[test]
    fn unknown_route_is_rejected() {
        let context = Context::new(json!({}));
        let router = router(&context);
        assert!(matches!(
            router.set_route("Missing", &Value::Null),
            Err(RouteError::UnknownRoute { .. })
        ));
    }

    #[test]
    fn switch_log_records_activations() {
        let context = Context::new(json!({}));
        let router = router(&context);
        router.set_route("Home", &Value::Null).unwrap();
        router.set_route("About", &Value::Null).unwrap();

        let switches = router.switches();
        assert_eq!(switches.len(), 2);
        assert_eq!(switches[1].from.as_deref(), Some("Home"));
        assert_eq!(switches[1].to, "About");
        assert_eq!(router.current().as_deref(), Some("About"));
    }

    #[test]
    fn switch_log_is_capped() {
        let context = Context::new(json!({}));
        let router = router(&context);
        for _ in 0..MAX_SWITCHES {
            router.set_route("Home", &Value::Null).unwrap();
            router.set_route("About", &Value::Null).unwrap();
        }

        let switches = router.switches();
        assert_eq!(switches.len(), MAX_SWITCHES);
        assert_eq!(switches[0].from.as_deref(), Some("About"));
        assert_eq!(switches[MAX_SWITCHES - 1].to, "About");
    }

    #[test]
    fn redirect_loops_are_cut() {
        let context = Context::new(json!({}));
        let routes = Routes::new()
            .route("/", Route::new("Home", page("Home")))
            .redirect("/a", "/b")
            .redirect("/b", "/a");
        let config = RouterConfig {
            max_redirects: 4,
            ..RouterConfig::default()
        };
        let router = Router::builder(&context, routes).config(config).build().unwrap();
        router.start();

        router.history().push("/a");
        assert_eq!(router.current(), None);
        assert!(router.history().location() == "/a" || router.history().location() == "/b");
    }
}

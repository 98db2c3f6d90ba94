//! Route declarations and flattening.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::component::Component;
use crate::context::{Action, Effect};
use crate::error::DeclarationError;
use crate::RenderOutput;

use super::template::PathTemplate;

/// Segment key of the wildcard redirect.
pub const WILDCARD: &str = "*";

/// A navigable node of the route tree.
pub struct Route<R> {
    name: String,
    component: Component<R>,
    action: Option<Action>,
    subroutes: Routes<R>,
}

impl<R: RenderOutput> Route<R> {
    pub fn new(name: impl Into<String>, component: Component<R>) -> Self {
        Self {
            name: name.into(),
            component,
            action: None,
            subroutes: Routes::new(),
        }
    }

    /// Action run against the component's local model when the route is
    /// activated. It receives the route params object as its only argument.
    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&[Value]) -> Effect + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn subroutes(mut self, subroutes: Routes<R>) -> Self {
        self.subroutes = subroutes;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub enum RouteNode<R> {
    Route(Route<R>),
    Redirect(String),
}

/// Ordered route tree level: path segment to node.
pub struct Routes<R> {
    nodes: Vec<(String, RouteNode<R>)>,
}

impl<R> Default for Routes<R> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<R: RenderOutput> Routes<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, segment: impl Into<String>, route: Route<R>) -> Self {
        self.nodes.push((segment.into(), RouteNode::Route(route)));
        self
    }

    pub fn redirect(mut self, segment: impl Into<String>, to: impl Into<String>) -> Self {
        self.nodes
            .push((segment.into(), RouteNode::Redirect(to.into())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Linearize the tree depth-first.
    ///
    /// Fails when a route path does not start with `/` or when two routes share
    /// a name or a full path.
    pub fn flatten(&self) -> Result<FlatTable<R>, DeclarationError> {
        let mut entries = Vec::new();
        flatten_level(self, "", &[], &[], &mut entries)?;
        Ok(FlatTable::new(entries))
    }
}

fn join(parent: &str, segment: &str) -> String {
    if parent == "/" && segment.starts_with('/') {
        segment.to_string()
    } else {
        format!("{}{}", parent, segment)
    }
}

fn flatten_level<R: RenderOutput>(
    routes: &Routes<R>,
    parent: &str,
    components: &[Component<R>],
    actions: &[Option<Action>],
    entries: &mut Vec<FlatEntry<R>>,
) -> Result<(), DeclarationError> {
    for (segment, node) in &routes.nodes {
        let route = match node {
            RouteNode::Redirect(to) => {
                entries.push(FlatEntry::Redirect {
                    path: format!("{}{}", parent, segment),
                    to: to.clone(),
                });
                continue;
            }
            RouteNode::Route(route) => route,
        };

        let path = join(parent, segment);
        if !path.starts_with('/') {
            return Err(DeclarationError::RoutePathWithoutSlash {
                name: route.name.clone(),
                path,
            });
        }

        for existing in entries.iter().filter_map(FlatEntry::as_route) {
            if existing.name == route.name {
                return Err(DeclarationError::DuplicateRouteName {
                    name: route.name.clone(),
                });
            }
            if existing.path == path {
                return Err(DeclarationError::DuplicateRoutePath {
                    name: route.name.clone(),
                    path,
                });
            }
        }

        let chain: Vec<Component<R>> = components
            .iter()
            .cloned()
            .chain(std::iter::once(route.component.clone()))
            .collect();
        let action_chain: Vec<Option<Action>> = actions
            .iter()
            .cloned()
            .chain(std::iter::once(route.action.clone()))
            .collect();

        entries.push(FlatEntry::Route(FlatRoute {
            name: route.name.clone(),
            template: PathTemplate::parse(&path),
            path: path.clone(),
            components: chain.clone(),
            actions: action_chain.clone(),
        }));

        flatten_level(&route.subroutes, &path, &chain, &action_chain, entries)?;
    }
    Ok(())
}

/// A single linearized route with its ancestor chain.
pub struct FlatRoute<R> {
    name: String,
    path: String,
    template: PathTemplate,
    components: Vec<Component<R>>,
    /// Index-aligned with `components`; `None` where a node has no action.
    actions: Vec<Option<Action>>,
}

impl<R> Clone for FlatRoute<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            path: self.path.clone(),
            template: self.template.clone(),
            components: self.components.clone(),
            actions: self.actions.clone(),
        }
    }
}

impl<R: RenderOutput> FlatRoute<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn components(&self) -> &[Component<R>] {
        &self.components
    }

    pub fn actions(&self) -> &[Option<Action>] {
        &self.actions
    }

    /// Last component of the chain and its action, if it has one.
    pub fn terminal_action(&self) -> Option<(&Component<R>, &Action)> {
        let component = self.components.last()?;
        let action = self.actions.last()?.as_ref()?;
        Some((component, action))
    }

    fn prepend(&mut self, component: Component<R>) {
        self.components.insert(0, component);
        self.actions.insert(0, None);
    }
}

impl<R> fmt::Debug for FlatRoute<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatRoute")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("components", &self.components.len())
            .field(
                "actions",
                &self.actions.iter().map(Option::is_some).collect::<Vec<_>>(),
            )
            .finish()
    }
}

pub enum FlatEntry<R> {
    Route(FlatRoute<R>),
    Redirect { path: String, to: String },
}

impl<R> FlatEntry<R> {
    pub fn path(&self) -> &str {
        match self {
            FlatEntry::Route(route) => &route.path,
            FlatEntry::Redirect { path, .. } => path,
        }
    }

    pub fn as_route(&self) -> Option<&FlatRoute<R>> {
        match self {
            FlatEntry::Route(route) => Some(route),
            FlatEntry::Redirect { .. } => None,
        }
    }
}

impl<R> fmt::Debug for FlatEntry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlatEntry::Route(route) => f.debug_tuple("Route").field(route).finish(),
            FlatEntry::Redirect { path, to } => f
                .debug_struct("Redirect")
                .field("path", path)
                .field("to", to)
                .finish(),
        }
    }
}

/// Flattened route table, in declaration order.
pub struct FlatTable<R> {
    entries: Vec<FlatEntry<R>>,
    by_name: HashMap<String, usize>,
}

impl<R: RenderOutput> FlatTable<R> {
    fn new(entries: Vec<FlatEntry<R>>) -> Self {
        let by_name = entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_route().map(|r| (r.name.clone(), index)))
            .collect();
        Self { entries, by_name }
    }

    pub fn entries(&self) -> &[FlatEntry<R>] {
        &self.entries
    }

    pub fn routes(&self) -> impl Iterator<Item = &FlatRoute<R>> {
        self.entries.iter().filter_map(FlatEntry::as_route)
    }

    pub fn get(&self, name: &str) -> Option<&FlatRoute<R>> {
        self.entries.get(*self.by_name.get(name)?)?.as_route()
    }

    /// Entry stored under the full path `path`.
    pub fn by_path(&self, path: &str) -> Option<&FlatEntry<R>> {
        self.entries.iter().find(|entry| entry.path() == path)
    }

    /// Target of the `*` redirect, if declared.
    pub fn wildcard(&self) -> Option<&str> {
        self.entries.iter().find_map(|entry| match entry {
            FlatEntry::Redirect { path, to } if path == WILDCARD => Some(to.as_str()),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prepend `layout` to every route chain with an empty action slot.
    pub(crate) fn prepend_layout(&mut self, layout: &Component<R>) {
        for entry in &mut self.entries {
            if let FlatEntry::Route(route) = entry {
                route.prepend(layout.clone());
            }
        }
    }
}

impl<R> fmt::Debug for FlatTable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.entries).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Template;
    use crate::paths::PathMap;

    fn component(name: &str) -> Component<String> {
        let label = name.to_string();
        let template = Template::builder()
            .name(name)
            .render(move |_| label.clone())
            .build();
        Component::new(&template, PathMap::new()).unwrap()
    }

    #[test]
    fn home_and_about_flatten_to_two_entries() {
        let routes = Routes::new().route(
            "/",
            Route::new("Home", component("Home"))
                .subroutes(Routes::new().route("/about", Route::new("About", component("About")))),
        );
        let table = routes.flatten().unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("Home").unwrap().path(), "/");
        assert_eq!(table.get("Home").unwrap().components().len(), 1);
        assert_eq!(table.get("About").unwrap().path(), "/about");
        assert_eq!(table.get("About").unwrap().components().len(), 2);
    }

    #[test]
    fn nested_paths_concatenate() {
        let routes = Routes::new()
            .route("/", Route::new("Home", component("Home")))
            .route(
                "/books",
                Route::new("Books", component("Books")).subroutes(
                    Routes::new().route("/:id", Route::new("Book", component("Book")).action(|_| Effect::identity())),
                ),
            )
            .redirect("*", "/");
        let table = routes.flatten().unwrap();

        let book = table.get("Book").unwrap();
        assert_eq!(book.path(), "/books/:id");
        assert_eq!(book.actions().len(), 2);
        assert!(book.actions()[0].is_none());
        assert!(book.terminal_action().is_some());
        assert_eq!(table.wildcard(), Some("/"));
        assert!(table.get("Books").unwrap().terminal_action().is_none());
    }

    #[test]
    fn sibling_chains_do_not_alias() {
        let routes = Routes::new().route(
            "/a",
            Route::new("A", component("A")).subroutes(
                Routes::new()
                    .route("/x", Route::new("X", component("X")))
                    .route("/y", Route::new("Y", component("Y"))),
            ),
        );
        let table = routes.flatten().unwrap();
        let names = |route: &str| -> Vec<String> {
            table
                .get(route)
                .unwrap()
                .components()
                .iter()
                .map(|c| c.template().name().unwrap_or_default().to_string())
                .collect()
        };
        assert_eq!(names("X"), vec!["A", "X"]);
        assert_eq!(names("Y"), vec!["A", "Y"]);
    }

    #[test]
    fn path_without_slash_is_rejected() {
        let routes = Routes::new().route("about", Route::new("About", component("About")));
        assert_eq!(
            routes.flatten().unwrap_err(),
            DeclarationError::RoutePathWithoutSlash {
                name: "About".to_string(),
                path: "about".to_string(),
            }
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let routes = Routes::new()
            .route("/a", Route::new("Same", component("A")))
            .route("/b", Route::new("Same", component("B")));
        assert_eq!(
            routes.flatten().unwrap_err(),
            DeclarationError::DuplicateRouteName {
                name: "Same".to_string()
            }
        );
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let routes = Routes::new().route(
            "/",
            Route::new("Home", component("Home"))
                .subroutes(Routes::new().route("/", Route::new("Index", component("Index")))),
        );
        assert_eq!(
            routes.flatten().unwrap_err(),
            DeclarationError::DuplicateRoutePath {
                name: "Index".to_string(),
                path: "/".to_string(),
            }
        );
    }

    #[test]
    fn layout_is_prepended_with_empty_action() {
        let routes = Routes::new().route(
            "/",
            Route::new("Home", component("Home")).action(|_| Effect::identity()),
        );
        let mut table = routes.flatten().unwrap();
        table.prepend_layout(&component("Layout"));

        let home = table.get("Home").unwrap();
        assert_eq!(home.components().len(), 2);
        assert!(home.actions()[0].is_none());
        assert!(home.actions()[1].is_some());
    }
}

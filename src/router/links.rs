//! Link generation and navigation handles.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::RouteError;

use super::history::History;
use super::template::PathTemplate;

/// Location generators, one per named route. Pure.
#[derive(Clone)]
pub struct Links {
    templates: Arc<BTreeMap<String, PathTemplate>>,
    root: Arc<str>,
}

impl Links {
    pub(crate) fn new(templates: BTreeMap<String, PathTemplate>, root: &str) -> Self {
        Self {
            templates: Arc::new(templates),
            root: Arc::from(root),
        }
    }

    /// Location of route `name` with `params` substituted.
    ///
    /// `params` is an object (or `Null` for none); unused entries become the
    /// query string.
    pub fn link(&self, name: &str, params: &Value) -> Result<String, RouteError> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| RouteError::UnknownRoute {
                name: name.to_string(),
            })?;
        let location = template.stringify(name, &as_params(params))?;
        Ok(self.prefixed(&location))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// `location` under the root path.
    pub fn prefixed(&self, location: &str) -> String {
        if self.root.is_empty() {
            return location.to_string();
        }
        match location.strip_prefix('/') {
            Some("") => self.root.to_string(),
            Some(rest) if rest.starts_with('?') => format!("{}{}", self.root, rest),
            _ => format!("{}{}", self.root, location),
        }
    }

    /// `location` relative to the root path, or `None` outside of it.
    pub fn strip_root<'a>(&self, location: &'a str) -> Option<std::borrow::Cow<'a, str>> {
        use std::borrow::Cow;

        if self.root.is_empty() {
            return Some(Cow::Borrowed(location));
        }
        let rest = location.strip_prefix(&*self.root)?;
        if rest.is_empty() || rest.starts_with('?') {
            Some(Cow::Owned(format!("/{}", rest)))
        } else if rest.starts_with('/') {
            Some(Cow::Borrowed(rest))
        } else {
            None
        }
    }
}

impl fmt::Debug for Links {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("root", &self.root)
            .field("routes", &self.templates.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub(crate) fn as_params(params: &Value) -> Map<String, Value> {
    match params {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            tracing::warn!(params = %other, "Route params must be an object; ignoring");
            Map::new()
        }
    }
}

/// Location changers, one per named route.
#[derive(Clone)]
pub struct Navigator {
    links: Links,
    history: Arc<dyn History>,
}

impl Navigator {
    pub(crate) fn new(links: Links, history: Arc<dyn History>) -> Self {
        Self { links, history }
    }

    /// Push the location of route `name`.
    pub fn navigate(&self, name: &str, params: &Value) -> Result<(), RouteError> {
        let location = self.links.link(name, params)?;
        self.history.push(&location);
        Ok(())
    }

    /// Push a location relative to the root path.
    pub fn push(&self, location: &str) {
        self.history.push(&self.links.prefixed(location));
    }

    pub fn links(&self) -> &Links {
        &self.links
    }
}

impl fmt::Debug for Navigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator")
            .field("links", &self.links)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::history::MemoryHistory;
    use serde_json::json;

    fn links(root: &str) -> Links {
        let mut templates = BTreeMap::new();
        templates.insert("Home".to_string(), PathTemplate::parse("/"));
        templates.insert("Book".to_string(), PathTemplate::parse("/books/:id"));
        Links::new(templates, root)
    }

    #[test]
    fn link_without_root() {
        let links = links("");
        assert_eq!(links.link("Home", &Value::Null).unwrap(), "/");
        assert_eq!(links.link("Book", &json!({"id": 3})).unwrap(), "/books/3");
    }

    #[test]
    fn link_with_root() {
        let links = links("/app");
        assert_eq!(links.link("Home", &Value::Null).unwrap(), "/app");
        assert_eq!(
            links.link("Book", &json!({"id": 3, "q": "x"})).unwrap(),
            "/app/books/3?q=x"
        );
    }

    #[test]
    fn unknown_route_is_an_error() {
        let err = links("").link("Nope", &Value::Null).unwrap_err();
        assert_eq!(
            err,
            RouteError::UnknownRoute {
                name: "Nope".to_string()
            }
        );
    }

    #[test]
    fn strip_root_rejects_foreign_locations() {
        let links = links("/app");
        assert_eq!(links.strip_root("/app").as_deref(), Some("/"));
        assert_eq!(links.strip_root("/app?x=1").as_deref(), Some("/?x=1"));
        assert_eq!(links.strip_root("/app/books/1").as_deref(), Some("/books/1"));
        assert_eq!(links.strip_root("/application"), None);
        assert_eq!(links.strip_root("/other"), None);
    }

    #[test]
    fn navigate_pushes_location() {
        let history = Arc::new(MemoryHistory::default());
        let navigator = Navigator::new(links("/app"), history.clone());
        navigator.navigate("Book", &json!({"id": "a b"})).unwrap();
        assert_eq!(history.location(), "/app/books/a%20b");
    }
}

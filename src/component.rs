//! Templates and components.
//!
//! A [`Template`] declares behavior: sockets, actions, child components and a
//! render function. A [`Component`] binds a template to concrete paths and
//! carries the [`Signature`] used for instance and render caching.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::context::{Action, Effect, RenderTools};
use crate::error::DeclarationError;
use crate::paths::{LocalModel, Path, PathMap};
use crate::RenderOutput;

/// Socket every component gets implicitly, bound to a private area of state.
pub const LOCAL_SOCKET: &str = "$local";

/// Actions fired once when an instance is constructed.
pub const INIT_ACTIONS: [&str; 2] = ["@init", "$init"];

static NEXT_TEMPLATE_ID: AtomicU64 = AtomicU64::new(1);

pub type RenderFn<R> = Arc<dyn Fn(&RenderTools<'_, R>) -> R + Send + Sync>;

/// Process-unique identity of a built template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(u64);

/// Immutable behavior definition, shared by every component built from it.
pub struct Template<R> {
    id: TemplateId,
    name: Option<String>,
    sockets: Vec<String>,
    actions: BTreeMap<String, Action>,
    children: BTreeMap<String, Component<R>>,
    render: RenderFn<R>,
}

impl<R: RenderOutput> Template<R> {
    pub fn builder() -> TemplateBuilder<R> {
        TemplateBuilder::default()
    }

    pub fn id(&self) -> TemplateId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn sockets(&self) -> &[String] {
        &self.sockets
    }

    pub fn actions(&self) -> &BTreeMap<String, Action> {
        &self.actions
    }

    pub fn children(&self) -> &BTreeMap<String, Component<R>> {
        &self.children
    }

    pub(crate) fn render(&self, tools: &RenderTools<'_, R>) -> R {
        (self.render)(tools)
    }
}

impl<R> fmt::Debug for Template<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("sockets", &self.sockets)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`Template`]. Unset parts default to no sockets, no actions
/// and a render function returning `R::default()`.
pub struct TemplateBuilder<R> {
    name: Option<String>,
    sockets: Vec<String>,
    actions: BTreeMap<String, Action>,
    children: BTreeMap<String, Component<R>>,
    render: Option<RenderFn<R>>,
}

impl<R> Default for TemplateBuilder<R> {
    fn default() -> Self {
        Self {
            name: None,
            sockets: Vec::new(),
            actions: BTreeMap::new(),
            children: BTreeMap::new(),
            render: None,
        }
    }
}

impl<R: RenderOutput> TemplateBuilder<R> {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn socket(mut self, socket: impl Into<String>) -> Self {
        let socket = socket.into();
        if !self.sockets.contains(&socket) {
            self.sockets.push(socket);
        }
        self
    }

    pub fn sockets<I, S>(self, sockets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        sockets.into_iter().fold(self, |builder, s| builder.socket(s))
    }

    /// Add a named action: call arguments in, [`Effect`] out.
    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&[Value]) -> Effect + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(action));
        self
    }

    pub fn child(mut self, name: impl Into<String>, component: Component<R>) -> Self {
        self.children.insert(name.into(), component);
        self
    }

    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&RenderTools<'_, R>) -> R + Send + Sync + 'static,
    {
        self.render = Some(Arc::new(render));
        self
    }

    pub fn build(self) -> Arc<Template<R>> {
        let id = TemplateId(NEXT_TEMPLATE_ID.fetch_add(1, Ordering::Relaxed));
        let render: RenderFn<R> = match self.render {
            Some(render) => render,
            None => Arc::new(render_nothing::<R>),
        };
        Arc::new(Template {
            id,
            name: self.name,
            sockets: self.sockets,
            actions: self.actions,
            children: self.children,
            render,
        })
    }
}

fn render_nothing<R: Default>(_: &RenderTools<'_, R>) -> R {
    R::default()
}

/// Stable identity of a (template, paths) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    fn compute<R>(template: &Template<R>, paths: &PathMap) -> Self {
        let mut hasher = DefaultHasher::new();
        template.id.hash(&mut hasher);
        template.sockets.hash(&mut hasher);
        for name in template.actions.keys() {
            name.hash(&mut hasher);
        }
        for (name, child) in &template.children {
            name.hash(&mut hasher);
            child.signature.hash(&mut hasher);
        }
        // PathMap is ordered, so the serialization is canonical.
        for (socket, path) in paths {
            socket.hash(&mut hasher);
            path.hash(&mut hasher);
        }
        Signature(format!("{:016x}", hasher.finish()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: &str) -> Self {
        Signature(raw.to_string())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A template bound to concrete paths.
pub struct Component<R> {
    template: Arc<Template<R>>,
    paths: PathMap,
    signature: Signature,
    name: Option<String>,
    defaults: LocalModel,
}

impl<R> Clone for Component<R> {
    fn clone(&self) -> Self {
        Self {
            template: Arc::clone(&self.template),
            paths: self.paths.clone(),
            signature: self.signature.clone(),
            name: self.name.clone(),
            defaults: self.defaults.clone(),
        }
    }
}

impl<R: RenderOutput> Component<R> {
    /// Bind `template` to `paths`.
    ///
    /// Every declared socket needs exactly one non-empty path and no path may
    /// name an undeclared socket.
    pub fn new(template: &Arc<Template<R>>, paths: PathMap) -> Result<Self, DeclarationError> {
        let label = template
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("template#{}", template.id().0));
        validate_paths(&label, template.sockets(), &paths)?;

        Ok(Self {
            signature: Signature::compute(template, &paths),
            template: Arc::clone(template),
            paths,
            name: None,
            defaults: LocalModel::new(),
        })
    }

    /// Human readable name used in logs and provenance.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Values used when a socket's path is absent from state.
    pub fn with_defaults(mut self, defaults: LocalModel) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn template(&self) -> &Arc<Template<R>> {
        &self.template
    }

    pub fn paths(&self) -> &PathMap {
        &self.paths
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn defaults(&self) -> &LocalModel {
        &self.defaults
    }

    /// Name if one was given, else the signature.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.signature.to_string())
    }

    /// Path of the private `$local` area.
    pub fn local_path(&self) -> Path {
        Path::new([LOCAL_SOCKET, self.signature.as_str()])
    }

    /// Declared paths plus the implicit `$local` binding.
    pub fn projection_paths(&self) -> PathMap {
        let mut paths = self.paths.clone();
        paths.insert(LOCAL_SOCKET.to_string(), self.local_path());
        paths
    }
}

impl<R> fmt::Debug for Component<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("paths", &self.paths)
            .finish()
    }
}

fn validate_paths(
    component: &str,
    sockets: &[String],
    paths: &PathMap,
) -> Result<(), DeclarationError> {
    if let Some(socket) = sockets.iter().find(|s| !paths.contains_key(*s)) {
        return Err(DeclarationError::MissingSocketPath {
            component: component.to_string(),
            socket: socket.clone(),
        });
    }

    if let Some((socket, _)) = paths.iter().find(|(_, path)| path.is_empty()) {
        return Err(DeclarationError::RootSocketPath {
            component: component.to_string(),
            socket: socket.clone(),
        });
    }

    let unknown: Vec<String> = paths
        .keys()
        .filter(|key| !sockets.contains(key))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(DeclarationError::UnknownSockets {
            component: component.to_string(),
            sockets: unknown,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use crate::paths::path_map;

    fn person_template() -> Arc<Template<String>> {
        Template::builder()
            .name("Person")
            .sockets(["name", "age"])
            .build()
    }

    #[test]
    fn matching_paths_are_accepted() {
        let template = person_template();
        let component = Component::new(
            &template,
            path_map([("name", path!["this", "matches"]), ("age", path!["this", "also"])]),
        );
        assert!(component.is_ok());
    }

    #[test]
    fn missing_socket_path_is_rejected() {
        let template = person_template();
        let err = Component::new(&template, path_map([("name", path!["person", "name"])]))
            .unwrap_err();
        assert_eq!(
            err,
            DeclarationError::MissingSocketPath {
                component: "Person".to_string(),
                socket: "age".to_string(),
            }
        );
    }

    #[test]
    fn unknown_socket_is_rejected() {
        let template = person_template();
        let err = Component::new(
            &template,
            path_map([
                ("name", path!["person", "name"]),
                ("age", path!["person", "age"]),
                ("city", path!["person", "city"]),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, DeclarationError::UnknownSockets { sockets, .. } if sockets == ["city"]));
    }

    #[test]
    fn root_path_is_rejected() {
        let template = person_template();
        let err = Component::new(
            &template,
            path_map([("name", path![]), ("age", path!["person", "age"])]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DeclarationError::RootSocketPath {
                component: "Person".to_string(),
                socket: "name".to_string(),
            }
        );
    }

    #[test]
    fn identical_bindings_share_a_signature() {
        let template = person_template();
        let paths = path_map([("name", path!["p", "name"]), ("age", path!["p", "age"])]);
        let a = Component::new(&template, paths.clone()).unwrap();
        let b = Component::new(&template, paths).unwrap().named("Other name");
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn different_paths_or_templates_differ() {
        let template = person_template();
        let twin = person_template();
        let paths = path_map([("name", path!["p", "name"]), ("age", path!["p", "age"])]);
        let moved = path_map([("name", path!["q", "name"]), ("age", path!["p", "age"])]);

        let base = Component::new(&template, paths.clone()).unwrap();
        let other_paths = Component::new(&template, moved).unwrap();
        let other_template = Component::new(&twin, paths).unwrap();

        assert_ne!(base.signature(), other_paths.signature());
        assert_ne!(base.signature(), other_template.signature());
    }

    #[test]
    fn projection_paths_include_local_area() {
        let template = person_template();
        let component = Component::new(
            &template,
            path_map([("name", path!["p", "name"]), ("age", path!["p", "age"])]),
        )
        .unwrap();
        let paths = component.projection_paths();
        assert_eq!(
            paths.get(LOCAL_SOCKET),
            Some(&path![LOCAL_SOCKET, component.signature().as_str()])
        );
        assert_eq!(paths.len(), 3);
    }
}

//! Action connector.
//!
//! A raw [`Action`] turns call arguments into an [`Effect`]. Connecting it to
//! a path map yields a [`ConnectedAction`] that projects the pre-action local
//! model, resolves the effect's transforms and queues their commits.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use serde::Serialize;
use serde_json::Value;

use crate::component::{Signature, LOCAL_SOCKET};
use crate::config::ValidationMode;
use crate::error::{ActionError, AppError, SourceType};
use crate::paths::{LocalModel, PathMap};
use crate::RenderOutput;

use super::queue::{PendingCommit, ShapeCheck};
use super::ContextInner;

/// Raw state transition: call arguments in, effect out.
pub type Action = Arc<dyn Fn(&[Value]) -> Effect + Send + Sync>;

/// Local model transform produced by an action.
pub type Transform = Box<dyn FnOnce(LocalModel) -> LocalModel + Send>;

/// Transform that becomes available later.
pub type DeferredTransform = Pin<Box<dyn Future<Output = Transform> + Send>>;

/// What an action asks the connector to do.
pub enum Effect {
    /// Apply now; the commit lands at the next flush.
    Immediate(Transform),
    /// Apply once the future resolves; commits in resolution order.
    Deferred(DeferredTransform),
    /// Several effects, each committed on its own.
    Sequence(Vec<Effect>),
}

impl Effect {
    pub fn now<F>(transform: F) -> Self
    where
        F: FnOnce(LocalModel) -> LocalModel + Send + 'static,
    {
        Effect::Immediate(Box::new(transform))
    }

    pub fn later<Fut, F>(future: Fut) -> Self
    where
        Fut: Future<Output = F> + Send + 'static,
        F: FnOnce(LocalModel) -> LocalModel + Send + 'static,
    {
        Effect::Deferred(Box::pin(async move {
            let transform: Transform = Box::new(future.await);
            transform
        }))
    }

    pub fn sequence(effects: impl IntoIterator<Item = Effect>) -> Self {
        Effect::Sequence(effects.into_iter().collect())
    }

    /// Commit the pre-action model unchanged. Only notifies.
    pub fn identity() -> Self {
        Effect::now(|model| model)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Immediate(_) => f.write_str("Effect::Immediate"),
            Effect::Deferred(_) => f.write_str("Effect::Deferred"),
            Effect::Sequence(effects) => f.debug_tuple("Effect::Sequence").field(effects).finish(),
        }
    }
}

/// Who caused a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Source {
    /// An action owned by a component instance.
    Component {
        signature: Signature,
        name: Option<String>,
    },
    /// Anything else: standalone actions, the router, forced updates.
    External(String),
}

impl Source {
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Source::Component { signature, .. } => Some(signature),
            Source::External(_) => None,
        }
    }

    /// Component name, else its signature, else the external label.
    pub fn label(&self) -> String {
        match self {
            Source::Component {
                name: Some(name), ..
            } => name.clone(),
            Source::Component { signature, .. } => signature.to_string(),
            Source::External(label) => label.clone(),
        }
    }
}

/// `{source, name}` pair attached to every commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub source: Source,
    pub name: String,
}

impl Provenance {
    pub fn new(source: Source, name: impl Into<String>) -> Self {
        Self {
            source,
            name: name.into(),
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.source.label(), self.name)
    }
}

pub(crate) struct ActionBinding<R> {
    pub(crate) context: Weak<ContextInner<R>>,
    pub(crate) paths: PathMap,
    pub(crate) defaults: LocalModel,
    pub(crate) actions: BTreeMap<String, Action>,
    pub(crate) source: Source,
    /// Declared sockets, present only for component-owned actions.
    pub(crate) sockets: Option<Vec<String>>,
}

/// Actions connected to a context through one path map.
pub struct ConnectedActions<R> {
    binding: Arc<ActionBinding<R>>,
}

impl<R> Clone for ConnectedActions<R> {
    fn clone(&self) -> Self {
        Self {
            binding: Arc::clone(&self.binding),
        }
    }
}

impl<R: RenderOutput> ConnectedActions<R> {
    pub(crate) fn new(binding: ActionBinding<R>) -> Self {
        Self {
            binding: Arc::new(binding),
        }
    }

    /// Invoke `name` with `args`.
    ///
    /// Immediate transforms are applied against the local model projected
    /// right now; their commits become visible at the next flush.
    pub fn dispatch(&self, name: &str, args: &[Value]) -> Result<(), ActionError> {
        self.get(name)
            .ok_or_else(|| ActionError::UnknownAction {
                source_name: self.binding.source.label(),
                name: name.to_string(),
            })?
            .call(args)
    }

    /// Handle to a single action, callable later.
    pub fn get(&self, name: &str) -> Option<ConnectedAction<R>> {
        self.binding.actions.contains_key(name).then(|| ConnectedAction {
            binding: Arc::clone(&self.binding),
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.binding.actions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.binding.actions.keys().map(String::as_str)
    }

    pub fn source(&self) -> &Source {
        &self.binding.source
    }
}

/// One connected action.
pub struct ConnectedAction<R> {
    binding: Arc<ActionBinding<R>>,
    name: String,
}

impl<R> Clone for ConnectedAction<R> {
    fn clone(&self) -> Self {
        Self {
            binding: Arc::clone(&self.binding),
            name: self.name.clone(),
        }
    }
}

impl<R: RenderOutput> ConnectedAction<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Result<(), ActionError> {
        let context = self
            .binding
            .context
            .upgrade()
            .ok_or_else(|| ActionError::ContextDropped {
                name: self.name.clone(),
            })?;
        let Some(action) = self.binding.actions.get(&self.name) else {
            return Err(ActionError::UnknownAction {
                source_name: self.binding.source.label(),
                name: self.name.clone(),
            });
        };

        let pre_action = context.local_model(&self.binding.paths, &self.binding.defaults);
        let effect = action(args);
        let provenance = Provenance::new(self.binding.source.clone(), self.name.clone());

        schedule(&context, &self.binding, &provenance, &pre_action, effect)
    }
}

/// One commit an effect resolves to.
enum Step {
    Ready(LocalModel),
    Deferred(DeferredTransform),
}

/// Resolve `effect` into steps. Immediate transforms run and are validated
/// here, so a strict rejection anywhere in a sequence leaves the queue
/// untouched.
fn plan<R: RenderOutput>(
    context: &ContextInner<R>,
    binding: &ActionBinding<R>,
    provenance: &Provenance,
    pre_action: &LocalModel,
    effect: Effect,
    steps: &mut Vec<Step>,
) -> Result<(), ActionError> {
    match effect {
        Effect::Immediate(transform) => {
            let model = transform(pre_action.clone());
            if let Some(sockets) = &binding.sockets {
                if let Some(error) =
                    check_local_model(context.config.validation, provenance, &model, sockets)
                {
                    context.report(error.clone());
                    if context.config.validation == ValidationMode::Strict {
                        return Err(ActionError::ShapeMismatch(error));
                    }
                }
            }
            steps.push(Step::Ready(model));
        }
        Effect::Deferred(future) => steps.push(Step::Deferred(future)),
        Effect::Sequence(effects) => {
            for effect in effects {
                plan(context, binding, provenance, pre_action, effect, steps)?;
            }
        }
    }
    Ok(())
}

fn schedule<R: RenderOutput>(
    context: &Arc<ContextInner<R>>,
    binding: &ActionBinding<R>,
    provenance: &Provenance,
    pre_action: &LocalModel,
    effect: Effect,
) -> Result<(), ActionError> {
    let mut steps = Vec::new();
    plan(context, binding, provenance, pre_action, effect, &mut steps)?;

    for step in steps {
        match step {
            Step::Ready(model) => context.queue.push(PendingCommit {
                paths: binding.paths.clone(),
                model,
                provenance: provenance.clone(),
                mount: None,
                check: None,
            }),
            Step::Deferred(future) => {
                let paths = binding.paths.clone();
                let check = binding.sockets.clone().map(|sockets| ShapeCheck { sockets });
                let provenance_for_task = provenance.clone();
                let pre_action = pre_action.clone();
                let spawned = context.queue.defer(async move {
                    let transform = future.await;
                    PendingCommit {
                        paths,
                        model: transform(pre_action),
                        provenance: provenance_for_task,
                        mount: None,
                        check,
                    }
                });
                if spawned.is_err() {
                    context.report(AppError::new(
                        SourceType::Action,
                        provenance.to_string(),
                        "Deferred action needs a running tokio runtime; it was dropped",
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Compare a returned local model against the declared sockets.
pub(crate) fn check_local_model(
    mode: ValidationMode,
    provenance: &Provenance,
    model: &LocalModel,
    sockets: &[String],
) -> Option<AppError> {
    if mode == ValidationMode::Off {
        return None;
    }

    let extra: Vec<&str> = model
        .keys()
        .filter(|key| key.as_str() != LOCAL_SOCKET && !sockets.contains(key))
        .map(String::as_str)
        .collect();
    let missing: Vec<&str> = sockets
        .iter()
        .filter(|socket| !model.contains_key(socket.as_str()))
        .map(String::as_str)
        .collect();

    if extra.is_empty() && missing.is_empty() {
        return None;
    }

    let mut problem = String::new();
    if !extra.is_empty() {
        problem.push_str(&format!(" extra fields: [{}]", extra.join(",")));
    }
    if !missing.is_empty() {
        problem.push_str(&format!(" missing fields: [{}]", missing.join(",")));
    }

    Some(AppError::new(
        SourceType::Action,
        provenance.to_string(),
        format!(
            "Local model returned from action does not match component sockets. Expected fields [{}], but got{}.",
            sockets.join(","),
            problem
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provenance() -> Provenance {
        Provenance::new(Source::External("Test".to_string()), "addCity")
    }

    fn model(value: Value) -> LocalModel {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn provenance_serializes_signature_as_string() {
        let provenance = Provenance::new(
            Source::Component {
                signature: Signature::from_raw("00ff"),
                name: Some("Person".to_string()),
            },
            "setName",
        );
        assert_eq!(
            serde_json::to_value(&provenance).unwrap(),
            json!({
                "source": {"Component": {"signature": "00ff", "name": "Person"}},
                "name": "setName",
            })
        );
    }

    #[test]
    fn matching_model_passes() {
        let sockets = vec!["name".to_string(), "age".to_string()];
        let m = model(json!({"name": "John", "age": 21, "$local": null}));
        assert!(check_local_model(ValidationMode::Permissive, &provenance(), &m, &sockets).is_none());
    }

    #[test]
    fn extra_and_missing_fields_are_reported() {
        let sockets = vec!["name".to_string(), "age".to_string()];
        let m = model(json!({"name": "John", "city": "Hong Kong"}));
        let error = check_local_model(ValidationMode::Strict, &provenance(), &m, &sockets).unwrap();

        assert_eq!(error.source_type, SourceType::Action);
        assert!(error.source_name.contains("addCity"));
        assert!(error.message.contains("extra fields: [city]"));
        assert!(error.message.contains("missing fields: [age]"));
    }

    #[test]
    fn off_mode_skips_checks() {
        let sockets = vec!["name".to_string()];
        let m = model(json!({"other": 1}));
        assert!(check_local_model(ValidationMode::Off, &provenance(), &m, &sockets).is_none());
    }

    #[test]
    fn component_source_label_prefers_name() {
        let source = Source::External("Router".to_string());
        assert_eq!(source.label(), "Router");
        assert!(source.signature().is_none());
    }
}

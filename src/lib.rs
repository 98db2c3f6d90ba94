//! socketry: a state context and router core.
//!
//! Components declare named sockets; each socket is bound to a path inside
//! one shared state tree. Actions transform a component's local model and
//! are committed back through the same paths. A registry of components and
//! their path overlaps decides when a cached render can be reused, and a
//! router mounts chains of components for navigable routes.

pub mod app;
pub mod component;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod paths;
pub mod router;

pub use app::{App, RoutedApp};
pub use component::{Component, Signature, Template};
pub use config::{Config, ContextConfig, RouterConfig, ValidationMode};
pub use context::{Context, Effect, Instance, InstanceTools, Provenance, RenderTools, Source};
pub use error::{ActionError, AppError, DeclarationError, RouteError};
pub use paths::{LocalModel, Path, PathMap, Segment};
pub use router::{Route, Router, Routes};

/// Anything a render function can produce.
pub trait RenderOutput: Clone + Default + Send + Sync + 'static {}

impl<T: Clone + Default + Send + Sync + 'static> RenderOutput for T {}

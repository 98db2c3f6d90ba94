//! Error types.
//!
//! Two families:
//! - Declaration errors happen while components and routes are being declared.
//!   They are returned from the declaring call and never recovered.
//! - Runtime errors ([`AppError`]) are recorded in the context error log and
//!   reported through `tracing`; they never abort a render pass.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Errors raised while declaring components and routes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    #[error("[Component {component}] - No path defined for socket {socket}")]
    MissingSocketPath { component: String, socket: String },

    #[error("[Component {component}] - Unknown sockets [{}]", sockets.join(","))]
    UnknownSockets {
        component: String,
        sockets: Vec<String>,
    },

    #[error("[Component {component}] - Socket {socket} is bound to the state root")]
    RootSocketPath { component: String, socket: String },

    #[error("[Route {name}] - Path '{path}' does not start with slash")]
    RoutePathWithoutSlash { name: String, path: String },

    #[error("[Route {name}] - Name is already used")]
    DuplicateRouteName { name: String },

    #[error("[Route {name}] - Path '{path}' is already used")]
    DuplicateRoutePath { name: String, path: String },

    #[error("Route tree has no root route '/'")]
    MissingRootRoute,
}

/// Errors returned by link generation and navigation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("Route '{name}' not found")]
    UnknownRoute { name: String },

    #[error("Route '{route}' requires parameter '{param}'")]
    MissingParam { route: String, param: String },
}

/// Errors returned when dispatching a connected action.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("Action '{name}' is not defined for {source_name}")]
    UnknownAction { source_name: String, name: String },

    #[error("{0}")]
    ShapeMismatch(AppError),

    #[error("Context was dropped before action '{name}' could run")]
    ContextDropped { name: String },
}

/// Which kind of declaration produced a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceType {
    Route,
    Template,
    Component,
    Action,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceType::Route => "Route",
            SourceType::Template => "Template",
            SourceType::Component => "Component",
            SourceType::Action => "Action",
        };
        f.write_str(label)
    }
}

/// A recoverable runtime error with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("ERROR: [{source_type} {source_name}] - {message}")]
pub struct AppError {
    pub source_type: SourceType,
    pub source_name: String,
    pub message: String,
}

impl AppError {
    pub fn new(
        source_type: SourceType,
        source_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_type,
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

//! Context and router configuration.
//!
//! Plain serde types with defaults, loadable from TOML:
//!
//! ```toml
//! [context]
//! debug_messages = false
//! validation = "strict"
//!
//! [router]
//! root_path = "/app"
//! default_path = "/"
//! ```

mod loader;
mod types;

pub use loader::ConfigError;
pub use types::{Config, ContextConfig, RouterConfig, ValidationMode};

use serde::{Deserialize, Serialize};

/// Root configuration container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub router: RouterConfig,
}

/// How the shape of a local model returned from an action is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// No checks.
    Off,
    /// Mismatches are recorded in the error log and the commit proceeds.
    #[default]
    Permissive,
    /// Mismatches reject the commit.
    Strict,
}

/// Settings of a state context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Emit a debug event for every applied commit (default: true).
    #[serde(default = "default_debug_messages")]
    pub debug_messages: bool,
    /// Local model shape checks for component actions (default: permissive).
    #[serde(default)]
    pub validation: ValidationMode,
}

/// Settings of a router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Prefix of every location handled by the router (e.g., "/app").
    /// Empty means the router owns the whole location space.
    #[serde(default)]
    pub root_path: String,
    /// Location navigated to when the router starts, if any.
    #[serde(default)]
    pub default_path: Option<String>,
    /// Longest redirect chain followed before giving up (default: 16).
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_debug_messages() -> bool {
    true
}

fn default_max_redirects() -> usize {
    16
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            debug_messages: default_debug_messages(),
            validation: ValidationMode::default(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            root_path: String::new(),
            default_path: None,
            max_redirects: default_max_redirects(),
        }
    }
}

//! Runtime configuration loaded from the environment AMPL was started in.
//!
//! The plugin has no configuration file of its own; AMPL users set these variables in
//! the shell (or with AMPL's `option` / `environ` mechanisms) before loading it.

use std::env;
use std::path::PathBuf;

/// Module imported when `AMPLPY_MODULE` is not set.
pub const DEFAULT_MODULE: &str = "amplfunc";
/// Log filter used when `AMPLPY_LOG` is not set or does not parse.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Snapshot of configuration values consumed by the plugin.
#[derive(Clone, Debug, PartialEq)]
pub struct AppCfg {
    /// Name of the Python module holding the user functions.
    pub module: String,
    /// Directories prepended to `sys.path` once the interpreter is up.
    pub search_path: Vec<PathBuf>,
    /// `tracing` filter directive.
    pub log_filter: String,
    /// Print the Python traceback to stderr when a foreign call fails.
    pub traceback: bool,
}

impl AppCfg {
    /// Create a configuration snapshot from the process environment.
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a snapshot from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let search_path = match non_empty("AMPLPY_PATH") {
            Some(raw) => env::split_paths(&raw).collect(),
            None => vec![PathBuf::from(".")],
        };

        Self {
            module: non_empty("AMPLPY_MODULE")
                .map(|m| m.trim().to_string())
                .unwrap_or_else(|| DEFAULT_MODULE.to_string()),
            search_path,
            log_filter: non_empty("AMPLPY_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            traceback: non_empty("AMPLPY_TRACEBACK")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }
}

impl Default for AppCfg {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

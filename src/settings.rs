//! Process-wide configuration, read once from the environment.
//!
//! Mirrors the handful of environment variables the source project
//! recognizes (see `spec.md` §6): initial enable state, an optional
//! max-depth ceiling, a free-form directive passed to user component
//! initializers, and the directory finalize artifacts are written under.

use std::env;
use std::path::PathBuf;

/// Snapshot of the environment variables this crate recognizes at startup.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Initial value of the global enable flag. Env: `ENABLED` (default `true`).
    pub enabled: bool,
    /// Initial max-depth ceiling. Env: `MAX_DEPTH` (default: unbounded, `u32::MAX`).
    pub max_depth: u32,
    /// Free-form directive forwarded to user component initializers.
    /// Env: `AUTO_LIST_INIT` (default: empty string).
    pub auto_list_init: String,
    /// Directory finalize artifacts are written under. Env: `OUTPUT_PATH`
    /// (default: current working directory).
    pub output_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enabled: true,
            max_depth: u32::MAX,
            auto_list_init: String::new(),
            output_path: PathBuf::from("."),
        }
    }
}

impl Settings {
    /// Build settings from the process environment, falling back to
    /// defaults for variables that are absent or fail to parse.
    ///
    /// A malformed value is logged at `debug` and treated as absent —
    /// configuration is a soft input, never a fatal one.
    pub fn from_env() -> Self {
        let defaults = Settings::default();

        let enabled = env::var("ENABLED")
            .ok()
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.enabled);

        let max_depth = env::var("MAX_DEPTH")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(defaults.max_depth);

        let auto_list_init = env::var("AUTO_LIST_INIT").unwrap_or(defaults.auto_list_init);

        let output_path = env::var("OUTPUT_PATH")
            .ok()
            .map(PathBuf::from)
            .unwrap_or(defaults.output_path);

        if env::var("MAX_DEPTH").is_ok() && max_depth == u32::MAX {
            log::debug!("MAX_DEPTH set but unparsable, falling back to unbounded");
        }

        Settings {
            enabled,
            max_depth,
            auto_list_init,
            output_path,
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let s = Settings::default();
        assert!(s.enabled);
        assert_eq!(s.max_depth, u32::MAX);
        assert_eq!(s.auto_list_init, "");
    }

    #[test]
    fn parses_bool_variants() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nope"), None);
    }
}

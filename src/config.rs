//! Configuration module for sl-lua.

use serde::Deserialize;
use std::path::Path;

use crate::{Error, Result};

/// Script runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Path to the script file the runtime loads.
    #[serde(default = "default_script")]
    pub script: String,
    /// Re-execute the script when its content changes.
    #[serde(default = "default_hot_reload")]
    pub hot_reload: bool,
    /// Chunk name used in script error messages (empty = file name).
    #[serde(default)]
    pub chunk_name: String,
}

fn default_script() -> String {
    "scripts/main.lua".to_string()
}

fn default_hot_reload() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            script: default_script(),
            hot_reload: default_hot_reload(),
            chunk_name: String::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error, off).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/sl-lua.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Script runtime configuration.
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(Error::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `SL_LUA_SCRIPT`: Override the script path
    /// - `SL_LUA_LOG_LEVEL`: Override the log level
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(script) = lookup("SL_LUA_SCRIPT").filter(|s| !s.is_empty()) {
            self.runtime.script = script;
        }
        if let Some(level) = lookup("SL_LUA_LOG_LEVEL").filter(|s| !s.is_empty()) {
            self.logging.level = level;
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if the script path is empty.
    pub fn validate(&self) -> Result<()> {
        if self.runtime.script.trim().is_empty() {
            return Err(Error::Config(
                "runtime.script is empty. \
                 Set it in the config file or via the SL_LUA_SCRIPT environment variable."
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.runtime.script, "scripts/main.lua");
        assert!(config.runtime.hot_reload);
        assert!(config.runtime.chunk_name.is_empty());

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/sl-lua.log");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[runtime]
script = "game/init.lua"
hot_reload = false
chunk_name = "init"

[logging]
level = "debug"
file = "var/sl-lua.log"
"#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.runtime.script, "game/init.lua");
        assert!(!config.runtime.hot_reload);
        assert_eq!(config.runtime.chunk_name, "init");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, "var/sl-lua.log");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[runtime]
script = "other.lua"
"#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.runtime.script, "other.lua");
        assert!(config.runtime.hot_reload);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.runtime.script, "scripts/main.lua");
    }

    #[test]
    fn test_parse_invalid_config() {
        let err = Config::parse("[runtime\nscript = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[runtime]\nscript = \"a.lua\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.runtime.script, "a.lua");
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/config.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "SL_LUA_SCRIPT" => Some("override.lua".to_string()),
            "SL_LUA_LOG_LEVEL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.runtime.script, "override.lua");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.runtime.script = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("SL_LUA_SCRIPT"));
    }
}

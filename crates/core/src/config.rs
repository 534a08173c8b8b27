//! TOML-based configuration for the diff/merge engine.
//!
//! Every section is optional; an empty file yields the defaults. The loaded
//! [`EngineConfig`] is turned into a [`DiffContext`](crate::context::DiffContext)
//! once by the caller and passed by reference into every operation.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level engine configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Property differ settings.
    #[serde(default)]
    pub diff: DiffConfig,

    /// Identity matcher settings.
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Conflict suggestion settings.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Script GUID -> display name. Presentation only.
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,

    /// Asset GUID -> project-relative path. Presentation only.
    #[serde(default)]
    pub assets: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Property differ configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Glob patterns over rendered property paths (e.g. `m_RootOrder`,
    /// `m_LocalEulerAnglesHint.*`). Matching paths never produce changes
    /// or conflicts.
    #[serde(default)]
    pub ignored_properties: Vec<String>,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Identity matcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Pair objects the hierarchy walk never reached by raw local ID.
    #[serde(default = "default_true")]
    pub orphan_fallback: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            orphan_fallback: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Conflict suggestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// A side is suggested only when its relevance score beats the other
    /// side's by more than this margin.
    #[serde(default = "default_score_margin")]
    pub score_margin: i32,

    /// Apply Ours/Theirs suggestions without asking.
    #[serde(default)]
    pub auto_resolve: bool,
}

fn default_score_margin() -> i32 {
    2
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            score_margin: default_score_margin(),
            auto_resolve: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl EngineConfig {
    /// Parse an [`EngineConfig`] from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load an [`EngineConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.level".into(),
                detail: format!(
                    "'{}' is not one of {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }
        if self
            .diff
            .ignored_properties
            .iter()
            .any(|p| p.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                field: "diff.ignored_properties".into(),
                detail: "patterns must not be empty".into(),
            });
        }
        if self.resolver.score_margin < 0 {
            return Err(ConfigError::InvalidValue {
                field: "resolver.score_margin".into(),
                detail: "score margin must be >= 0".into(),
            });
        }
        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[logging]
level = "debug"

[diff]
ignored_properties = ["m_RootOrder", "m_LocalEulerAnglesHint.*"]

[matching]
orphan_fallback = false

[resolver]
score_margin = 3
auto_resolve = true

[scripts]
"a1b2c3" = "PlayerController"

[assets]
"d4e5f6" = "Assets/Prefabs/Enemy.prefab"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config = EngineConfig::from_toml_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.diff.ignored_properties.len(), 2);
        assert!(!config.matching.orphan_fallback);
        assert_eq!(config.resolver.score_margin, 3);
        assert!(config.resolver.auto_resolve);
        assert_eq!(config.scripts["a1b2c3"], "PlayerController");
        assert_eq!(config.assets["d4e5f6"], "Assets/Prefabs/Enemy.prefab");
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(config.diff.ignored_properties.is_empty());
        assert!(config.matching.orphan_fallback);
        assert_eq!(config.resolver.score_margin, 2);
        assert!(!config.resolver.auto_resolve);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenemerge.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = EngineConfig::load_and_validate(&path).expect("load failed");
        assert_eq!(config.resolver.score_margin, 3);
    }

    #[test]
    fn test_file_not_found() {
        let result = EngineConfig::load_from_file("/nonexistent/scenemerge.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let result = EngineConfig::from_toml_str("[resolver]\nscore_margin = \"high\"");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let mut config = EngineConfig::default();
        config.logging.level = "loud".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "logging.level"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_pattern() {
        let mut config = EngineConfig::default();
        config.diff.ignored_properties.push("  ".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "diff.ignored_properties"
        ));
    }

    #[test]
    fn test_validate_rejects_negative_margin() {
        let mut config = EngineConfig::default();
        config.resolver.score_margin = -1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "resolver.score_margin"
        ));
    }
}

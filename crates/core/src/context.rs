//! Explicit per-run context passed into build, diff and merge.
//!
//! Holds the presentation indices (script and asset names) and the knobs
//! taken from configuration. Constructed once by the caller; nothing in the
//! library caches project state behind its back.

use std::collections::BTreeMap;

use glob_match::glob_match;

use crate::config::EngineConfig;

#[derive(Debug, Clone)]
pub struct DiffContext {
    /// Script GUID -> display name.
    pub script_names: BTreeMap<String, String>,
    /// Asset GUID -> project-relative path.
    pub asset_paths: BTreeMap<String, String>,
    /// Glob patterns over rendered property paths.
    pub ignored_properties: Vec<String>,
    /// Pair unreached objects by raw local ID.
    pub orphan_fallback: bool,
    /// Minimum relevance lead for a side suggestion.
    pub score_margin: i32,
    /// Apply confident side suggestions without asking.
    pub auto_resolve: bool,
}

impl Default for DiffContext {
    fn default() -> Self {
        Self {
            script_names: BTreeMap::new(),
            asset_paths: BTreeMap::new(),
            ignored_properties: Vec::new(),
            orphan_fallback: true,
            score_margin: 2,
            auto_resolve: false,
        }
    }
}

impl DiffContext {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            script_names: config.scripts.clone(),
            asset_paths: config.assets.clone(),
            ignored_properties: config.diff.ignored_properties.clone(),
            orphan_fallback: config.matching.orphan_fallback,
            score_margin: config.resolver.score_margin,
            auto_resolve: config.resolver.auto_resolve,
        }
    }

    pub fn with_ignored(mut self, pattern: impl Into<String>) -> Self {
        self.ignored_properties.push(pattern.into());
        self
    }

    pub fn script_name(&self, guid: &str) -> Option<&str> {
        self.script_names.get(guid).map(String::as_str)
    }

    pub fn asset_path(&self, guid: &str) -> Option<&str> {
        self.asset_paths.get(guid).map(String::as_str)
    }

    /// Whether a rendered property path matches an ignore pattern.
    pub fn is_ignored(&self, path: &str) -> bool {
        !path.is_empty()
            && self
                .ignored_properties
                .iter()
                .any(|pattern| glob_match(pattern, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = EngineConfig::from_toml_str(
            r#"
[matching]
orphan_fallback = false
[scripts]
"g1" = "Enemy"
"#,
        )
        .unwrap();
        let ctx = DiffContext::from_config(&config);
        assert!(!ctx.orphan_fallback);
        assert_eq!(ctx.script_name("g1"), Some("Enemy"));
        assert_eq!(ctx.script_name("g2"), None);
    }

    #[test]
    fn test_ignore_patterns() {
        let ctx = DiffContext::default()
            .with_ignored("m_RootOrder")
            .with_ignored("m_LocalEulerAnglesHint.*");
        assert!(ctx.is_ignored("m_RootOrder"));
        assert!(ctx.is_ignored("m_LocalEulerAnglesHint.y"));
        assert!(!ctx.is_ignored("m_LocalPosition.x"));
        assert!(!ctx.is_ignored(""));
    }
}

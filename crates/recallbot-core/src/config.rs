//! Memory engine configuration
//!
//! All tunable bounds in one place. Loaded from TOML at startup, then
//! overridden from the environment, then validated. Any error here is fatal
//! and happens before bootstrap.

use crate::error::{Error, Result};
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level memory configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Max turns held in memory per surface.
    pub max_history: usize,
    /// Log records replayed into each surface at startup. 0 disables the
    /// replay; ordinals are still recovered from the whole log.
    pub bootstrap_lines: usize,
    /// Root directory for surface logs and alias files.
    pub data_dir: PathBuf,
    /// Manual recall defaults.
    pub recall: RecallConfig,
    /// Keyword-triggered recall.
    pub auto_recall: AutoRecallConfig,
    /// Reserved alias policy.
    pub names: NamesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecallConfig {
    /// Window used when a recall request names no line count.
    pub default_window: usize,
    /// Records merged from the window when no pick count is given.
    pub default_pick: usize,
    /// Upper bound on a requested window for everyone but the authorized user.
    pub max_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutoRecallConfig {
    pub window: usize,
    pub pick: usize,
    /// Literal, case-sensitive trigger terms.
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NamesConfig {
    pub reserved_alias: String,
    /// The only identity allowed to take the reserved alias. Unset means
    /// nobody may.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_user: Option<UserId>,
}

// ============================================================
// Defaults
// ============================================================

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history: 12,
            bootstrap_lines: 500,
            data_dir: PathBuf::from("data"),
            recall: RecallConfig::default(),
            auto_recall: AutoRecallConfig::default(),
            names: NamesConfig::default(),
        }
    }
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self { default_window: 30, default_pick: 12, max_window: 30 }
    }
}

impl Default for AutoRecallConfig {
    fn default() -> Self {
        Self {
            window: 40,
            pick: 12,
            keywords: parse_keywords("前に,前回,以前,昔,過去,覚えて,覚えてる,記憶,ログ,履歴"),
        }
    }
}

impl Default for NamesConfig {
    fn default() -> Self {
        Self { reserved_alias: "しゆい".to_string(), authorized_user: None }
    }
}

/// Split a comma-delimited keyword list, dropping blanks.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

// ============================================================
// Loading
// ============================================================

impl MemoryConfig {
    /// Load config from a TOML file, falling back to defaults when the file
    /// does not exist. Parse errors are fatal.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::from_toml(&content)
                    .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
                tracing::info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::config(format!("{}: {}", path.display(), e))),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(e.to_string()))
    }

    /// Load, apply process environment overrides, and validate.
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("MAX_HISTORY") {
            self.max_history = parse_count("MAX_HISTORY", &v)?;
        }
        if let Some(v) = get("BOOTSTRAP_LOG_LINES") {
            self.bootstrap_lines = parse_count("BOOTSTRAP_LOG_LINES", &v)?;
        }
        if let Some(v) = get("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("RECALL_WINDOW") {
            self.recall.default_window = parse_count("RECALL_WINDOW", &v)?;
        }
        if let Some(v) = get("RECALL_PICK") {
            self.recall.default_pick = parse_count("RECALL_PICK", &v)?;
        }
        if let Some(v) = get("RECALL_MAX_LINES") {
            self.recall.max_window = parse_count("RECALL_MAX_LINES", &v)?;
        }
        if let Some(v) = get("AUTO_RECALL_LINES") {
            self.auto_recall.window = parse_count("AUTO_RECALL_LINES", &v)?;
        }
        if let Some(v) = get("AUTO_RECALL_PICK") {
            self.auto_recall.pick = parse_count("AUTO_RECALL_PICK", &v)?;
        }
        if let Some(v) = get("AUTO_RECALL_KEYWORDS") {
            self.auto_recall.keywords = parse_keywords(&v);
        }
        if let Some(v) = get("RESERVED_ALIAS") {
            self.names.reserved_alias = v;
        }
        if let Some(v) = get("SPECIAL_USER_ID") {
            let id = v
                .parse::<u64>()
                .map_err(|e| Error::config(format!("SPECIAL_USER_ID={:?}: {}", v, e)))?;
            self.names.authorized_user = Some(UserId(id));
        }
        Ok(())
    }

    /// Reject bounds the engine cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.max_history == 0 {
            return Err(Error::config("max_history must be at least 1"));
        }
        if self.recall.default_window == 0 || self.recall.default_pick == 0 {
            return Err(Error::config("recall window and pick must be at least 1"));
        }
        if self.recall.max_window == 0 {
            return Err(Error::config("recall.max_window must be at least 1"));
        }
        if self.auto_recall.window == 0 || self.auto_recall.pick == 0 {
            return Err(Error::config("auto_recall window and pick must be at least 1"));
        }
        if self.auto_recall.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(Error::config("auto_recall.keywords must not contain blank entries"));
        }
        if self.names.reserved_alias.trim().is_empty() {
            return Err(Error::config("names.reserved_alias must not be empty"));
        }
        Ok(())
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value
        .parse::<usize>()
        .map_err(|e| Error::config(format!("{}={:?}: {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keywords_drops_blanks() {
        assert_eq!(parse_keywords(" 前に, ,ログ,"), vec!["前に", "ログ"]);
    }

    #[test]
    fn test_negative_count_is_config_error() {
        assert!(matches!(parse_count("MAX_HISTORY", "-1"), Err(Error::Config(_))));
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::model::tag::{ReservedTags, TagId};

/// Per-scope settings, read from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    pub scope: String,
    #[serde(default)]
    pub title: String,
    /// Explicit first day for full reconstructions.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Last link of the points fallback chain.
    #[serde(default)]
    pub default_points: Option<i64>,
    /// Recategorization table. Relative paths are resolved against the
    /// directory of the config file.
    #[serde(default)]
    pub rules: Option<PathBuf>,
    #[serde(default)]
    pub retroactive_categories: bool,
    #[serde(default)]
    pub retroactive_points: bool,
    #[serde(default)]
    pub backlog_resolved_cutoff: Option<NaiveDate>,
    #[serde(default = "default_reserved_tags")]
    pub reserved_tags: ReservedTags,
    #[serde(default)]
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Raw stored status -> repaired status.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    /// Statuses that count as resolved for the backlog cutoff.
    #[serde(default = "default_closed_statuses")]
    pub closed: Vec<String>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            aliases: BTreeMap::new(),
            closed: default_closed_statuses(),
        }
    }
}

impl ScopeConfig {
    /// Minimal config for `scope` with every other field defaulted.
    #[must_use]
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            title: String::new(),
            start_date: None,
            default_points: None,
            rules: None,
            retroactive_categories: false,
            retroactive_points: false,
            backlog_resolved_cutoff: None,
            reserved_tags: default_reserved_tags(),
            status: StatusConfig::default(),
        }
    }

    /// Path of the scope's recategorization table.
    #[must_use]
    pub fn rules_path(&self) -> PathBuf {
        self.rules
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}_recategorization.csv", self.scope)))
    }
}

/// Read and validate a scope config.
///
/// # Errors
///
/// Returns [`EngineError::Config`] if the file cannot be read, is not valid
/// TOML, lacks a `scope`, or names a blank scope.
pub fn load_scope_config(path: &Path) -> Result<ScopeConfig, EngineError> {
    let invalid = |reason: String| EngineError::Config {
        path: path.to_path_buf(),
        reason,
    };

    let content = std::fs::read_to_string(path).map_err(|err| invalid(err.to_string()))?;
    let mut config =
        toml::from_str::<ScopeConfig>(&content).map_err(|err| invalid(err.message().to_string()))?;

    if config.scope.trim().is_empty() {
        return Err(invalid("scope must not be blank".into()));
    }

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let rules = config.rules_path();
    if rules.is_relative() {
        config.rules = Some(base.join(rules));
    }

    Ok(config)
}

const fn default_reserved_tags() -> ReservedTags {
    ReservedTags {
        new: TagId(1453),
        maint: TagId(1454),
        category: TagId(1656),
        epic: Some(TagId(942)),
    }
}

fn default_closed_statuses() -> Vec<String> {
    ["resolved", "declined", "invalid"]
        .into_iter()
        .map(String::from)
        .collect()
}

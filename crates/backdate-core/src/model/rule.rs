use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::tag::TagId;

/// The closed set of rule kinds a recategorization table may use.
///
/// `ProjectByName` and `ProjectsByWildcard` only exist in input tables; the
/// loader resolves them into `ProjectById` rules before storing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    #[serde(rename = "ProjectByID")]
    ProjectById,
    ProjectByName,
    ProjectsByWildcard,
    Intersection,
    ProjectColumn,
    ParentTask,
}

impl RuleKind {
    pub const ALL: [Self; 6] = [
        Self::ProjectById,
        Self::ProjectByName,
        Self::ProjectsByWildcard,
        Self::Intersection,
        Self::ProjectColumn,
        Self::ParentTask,
    ];

    /// Spelling used in recategorization tables and the `rules` table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProjectById => "ProjectByID",
            Self::ProjectByName => "ProjectByName",
            Self::ProjectsByWildcard => "ProjectsByWildcard",
            Self::Intersection => "Intersection",
            Self::ProjectColumn => "ProjectColumn",
            Self::ParentTask => "ParentTask",
        }
    }

    /// Whether the kind accepts more than one tag id.
    #[must_use]
    pub const fn allows_many_tags(self) -> bool {
        matches!(self, Self::Intersection)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a table names a rule kind outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid rule; must be one of ProjectByID, ProjectByName, ProjectsByWildcard, Intersection, ProjectColumn, ParentTask")]
pub struct UnknownRuleKind(pub String);

impl FromStr for RuleKind {
    type Err = UnknownRuleKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownRuleKind(s.to_string()))
    }
}

/// One stored entry of a scope's category rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub scope: String,
    /// Application order and tie-break; contiguous from 0.
    pub sort_order: u32,
    pub kind: RuleKind,
    pub tag_ids: Vec<TagId>,
    /// Display names of `tag_ids`, same order where known.
    pub tag_names: Vec<String>,
    /// Column name for `ProjectColumn`, parent title fragment for `ParentTask`.
    pub match_string: String,
    pub title: String,
    pub display: bool,
}

impl Rule {
    /// Identity used to detect duplicate rules within a scope.
    #[must_use]
    pub fn content_key(&self) -> (RuleKind, Vec<TagId>, String) {
        (self.kind, self.tag_ids.clone(), self.match_string.clone())
    }
}

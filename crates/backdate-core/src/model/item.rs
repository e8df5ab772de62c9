use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, externally assigned identifier of a tracked work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// As-is item record captured at ingestion time.
///
/// Only `story_points` feeds reconstruction (as the second link of the
/// points fallback chain); `title` names parent categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    /// Raw story-point field; may be blank or non-numeric.
    pub story_points: String,
    pub status: String,
}

impl Item {
    /// Story points from the static record, if they parse as an integer.
    #[must_use]
    pub fn static_points(&self) -> Option<i64> {
        parse_points(&self.story_points)
    }
}

/// Parse a raw points value, tolerating surrounding whitespace and quotes.
#[must_use]
pub fn parse_points(raw: &str) -> Option<i64> {
    raw.trim().trim_matches('"').trim().parse().ok()
}

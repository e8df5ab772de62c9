use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::item::ItemId;
use super::tag::TagId;

/// Work-type label derived from the reserved work-type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MaintType {
    NewFunctionality,
    Maintenance,
    #[default]
    Unset,
}

impl MaintType {
    /// Display label; empty when neither work-type tag is present.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NewFunctionality => "New Functionality",
            Self::Maintenance => "Maintenance",
            Self::Unset => "",
        }
    }

    /// Inverse of [`label`](Self::label); unknown labels map to `Unset`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "New Functionality" => Self::NewFunctionality,
            "Maintenance" => Self::Maintenance,
            _ => Self::Unset,
        }
    }
}

impl fmt::Display for MaintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reconstructed state of one item on one day within one scope.
///
/// At most one exists per `(scope, day, item_id)`. Reconstruction leaves
/// `category` unset; the resolver fills it in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub scope: String,
    pub day: NaiveDate,
    pub item_id: ItemId,
    pub status: String,
    /// Best-matching scope tag (first candidate present on the item).
    pub tag_id: TagId,
    pub tag_name: String,
    /// Board column of the item on the matched tag's board.
    pub column: String,
    pub points: Option<i64>,
    pub maint_type: MaintType,
    pub priority: String,
    pub category: Option<String>,
}

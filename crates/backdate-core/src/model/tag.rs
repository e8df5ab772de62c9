use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a project/category grouping an item can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub i64);

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tag as loaded from the source system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    /// Source-system identifier; boards in column-change events refer to it.
    pub external_id: String,
}

/// A board column belonging to a tag's board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub external_id: String,
    pub name: String,
    pub board_external_id: String,
}

/// Reserved work-type tags with cross-scope meaning.
///
/// Passed explicitly into the reconstructor so scopes with different
/// reserved mappings can run side by side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedTags {
    /// Marks new-functionality work. Checked before `maint`.
    pub new: TagId,
    pub maint: TagId,
    /// Marks items that act as parent categories for their subtasks.
    pub category: TagId,
    #[serde(default)]
    pub epic: Option<TagId>,
}

impl ReservedTags {
    /// All reserved ids, for denormalization alongside scope tags.
    #[must_use]
    pub fn ids(&self) -> BTreeSet<TagId> {
        let mut ids = BTreeSet::from([self.new, self.maint, self.category]);
        if let Some(epic) = self.epic {
            ids.insert(epic);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_ids_include_epic_when_set() {
        let mut reserved = ReservedTags {
            new: TagId(1453),
            maint: TagId(1454),
            category: TagId(1656),
            epic: None,
        };
        assert_eq!(reserved.ids().len(), 3);

        reserved.epic = Some(TagId(942));
        assert!(reserved.ids().contains(&TagId(942)));
        assert_eq!(reserved.ids().len(), 4);
    }
}

//! Category rule sets: parsing recategorization tables, resolving tag
//! references and deriving a scope's candidate tag list.

pub mod definition;
pub mod loader;

pub use loader::{LoadedRules, load_rules, load_rules_from_path};

use crate::model::rule::Rule;
use crate::model::tag::TagId;

/// The scope's candidate tags in priority order.
///
/// Every tag id mentioned by the rules, in rule sort order, first mention
/// wins. Earlier candidates take precedence when an item carries several.
#[must_use]
pub fn candidate_tags(rules: &[Rule]) -> Vec<TagId> {
    let mut ordered: Vec<&Rule> = rules.iter().collect();
    ordered.sort_by_key(|rule| rule.sort_order);

    let mut candidates = Vec::new();
    for rule in ordered {
        for id in &rule.tag_ids {
            if !candidates.contains(id) {
                candidates.push(*id);
            }
        }
    }
    candidates
}

/// Display names for [`candidate_tags`], same order.
#[must_use]
pub fn candidate_tag_names(rules: &[Rule]) -> Vec<(TagId, String)> {
    let mut named: Vec<(TagId, String)> = Vec::new();
    for id in candidate_tags(rules) {
        let name = rules
            .iter()
            .find_map(|rule| {
                rule.tag_ids
                    .iter()
                    .position(|t| *t == id)
                    .and_then(|pos| rule.tag_names.get(pos).cloned())
            })
            .unwrap_or_default();
        named.push((id, name));
    }
    named
}

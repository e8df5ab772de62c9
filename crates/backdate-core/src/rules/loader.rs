//! Resolve parsed rule rows against the tag catalogue and store them.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{info, warn};

use crate::error::EngineError;
use crate::model::rule::{Rule, RuleKind};
use crate::model::tag::Tag;
use crate::store::EventStore;

use super::definition::{RuleDefinition, parse_definitions};

/// Outcome of a rule set load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedRules {
    /// Stored rules in sort order.
    pub rules: Vec<Rule>,
    /// Expansions dropped because an earlier rule had the same content.
    pub duplicates: usize,
}

/// Load a recategorization table from disk and replace the scope's rules.
///
/// # Errors
///
/// See [`load_rules`]; additionally fails if the file cannot be opened.
pub fn load_rules_from_path<S: EventStore>(
    store: &mut S,
    scope: &str,
    path: &Path,
) -> Result<LoadedRules, EngineError> {
    let file = File::open(path).map_err(|e| {
        anyhow::Error::new(e).context(format!("open recategorization table {}", path.display()))
    })?;
    load_rules(store, scope, file)
}

/// Parse, resolve and store a scope's rule set.
///
/// The table is fully validated and resolved before anything is written;
/// the final replacement is a single store transaction, so a failed load
/// leaves the previous rule set in place.
///
/// # Errors
///
/// - [`EngineError::Validation`] for structural problems (unknown kind,
///   id arity, missing ids)
/// - [`EngineError::Resolution`] for ids or names that do not resolve
/// - [`EngineError::Store`] if the store cannot be read or written
pub fn load_rules<S: EventStore, R: Read>(
    store: &mut S,
    scope: &str,
    input: R,
) -> Result<LoadedRules, EngineError> {
    let definitions = parse_definitions(input)?;

    let mut rules = Vec::new();
    let mut seen = HashSet::new();
    let mut duplicates = 0;

    for definition in &definitions {
        for mut rule in resolve(&*store, scope, definition)? {
            if !seen.insert(rule.content_key()) {
                duplicates += 1;
                warn!(
                    scope,
                    row = definition.row,
                    kind = %rule.kind,
                    tags = ?rule.tag_ids,
                    "skipping duplicate rule"
                );
                continue;
            }
            rule.sort_order = u32::try_from(rules.len()).map_err(anyhow::Error::from)?;
            rules.push(rule);
        }
    }

    let stored = store.replace_rules(scope, &rules)?;
    info!(scope, rows = definitions.len(), stored, duplicates, "loaded rule set");

    Ok(LoadedRules { rules, duplicates })
}

/// Turn one row into zero or more rules with placeholder sort orders.
fn resolve<S: EventStore>(
    store: &S,
    scope: &str,
    definition: &RuleDefinition,
) -> Result<Vec<Rule>, EngineError> {
    let row = definition.row;
    let rule = |kind, tags: &[Tag], title: String| Rule {
        scope: scope.to_string(),
        sort_order: 0,
        kind,
        tag_ids: tags.iter().map(|t| t.id).collect(),
        tag_names: tags.iter().map(|t| t.name.clone()).collect(),
        match_string: definition.match_string.clone(),
        title,
        display: definition.display,
    };

    match definition.kind {
        RuleKind::ProjectByName => {
            let name = definition.match_string.as_str();
            if name.trim().is_empty() {
                return Err(EngineError::Resolution {
                    row,
                    reason: "ProjectByName needs a tag name in matchstring".into(),
                });
            }
            let matches = store.tags_named(name)?;
            let [tag] = matches.as_slice() else {
                return Err(EngineError::Resolution {
                    row,
                    reason: format!("expected exactly one tag named '{name}', found {}", matches.len()),
                });
            };
            let title = title_or(&definition.title, &tag.name);
            Ok(vec![Rule {
                match_string: String::new(),
                ..rule(RuleKind::ProjectById, std::slice::from_ref(tag), title)
            }])
        }
        RuleKind::ProjectsByWildcard => {
            let fragment = definition.match_string.as_str();
            if fragment.trim().is_empty() {
                return Err(EngineError::Resolution {
                    row,
                    reason: "ProjectsByWildcard needs a non-blank matchstring".into(),
                });
            }
            let matches = store.tags_containing(fragment)?;
            if matches.is_empty() {
                warn!(scope, row, fragment, "wildcard rule matched no tags");
            }
            Ok(matches
                .iter()
                .map(|tag| Rule {
                    match_string: String::new(),
                    ..rule(RuleKind::ProjectById, std::slice::from_ref(tag), tag.name.clone())
                })
                .collect())
        }
        kind => {
            if definition.tag_ids.is_empty() {
                return Err(EngineError::Validation {
                    row,
                    reason: format!("{kind} needs at least one tag id"),
                });
            }
            if kind == RuleKind::ProjectColumn && definition.match_string.trim().is_empty() {
                return Err(EngineError::Validation {
                    row,
                    reason: "ProjectColumn needs a column name in matchstring".into(),
                });
            }

            let tags = known_tags(store, definition)?;
            let title = match kind {
                RuleKind::ParentTask => definition.title.clone(),
                RuleKind::ProjectColumn => title_or(&definition.title, &definition.match_string),
                _ => {
                    let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
                    title_or(&definition.title, &names.join(" & "))
                }
            };
            let match_string = if kind == RuleKind::ProjectById {
                String::new()
            } else {
                definition.match_string.clone()
            };
            Ok(vec![Rule {
                match_string,
                ..rule(kind, &tags, title)
            }])
        }
    }
}

/// Tags for the row's ids, in the row's order.
fn known_tags<S: EventStore>(
    store: &S,
    definition: &RuleDefinition,
) -> Result<Vec<Tag>, EngineError> {
    let found = store.tags_by_id(&definition.tag_ids)?;
    definition
        .tag_ids
        .iter()
        .map(|id| {
            found
                .iter()
                .find(|tag| tag.id == *id)
                .cloned()
                .ok_or_else(|| EngineError::Resolution {
                    row: definition.row,
                    reason: format!("tag {id} does not exist"),
                })
        })
        .collect()
}

fn title_or(title: &str, fallback: &str) -> String {
    if title.trim().is_empty() {
        fallback.to_string()
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::model::tag::TagId;

    const HEADER: &str = "rule,matchstring,id,title,display\n";

    fn store_with_tags(tags: &[(i64, &str)]) -> SqliteStore {
        let store = SqliteStore::open_in_memory().expect("open store");
        for (id, name) in tags {
            store
                .insert_tag(&Tag {
                    id: TagId(*id),
                    name: (*name).into(),
                    external_id: format!("PHID-PROJ-{id}"),
                })
                .expect("insert tag");
        }
        store
    }

    fn load(store: &mut SqliteStore, body: &str) -> Result<LoadedRules, EngineError> {
        load_rules(store, "alpha", format!("{HEADER}{body}").as_bytes())
    }

    #[test]
    fn wildcard_expands_to_contiguous_rules() {
        let mut store = store_with_tags(&[
            (1, "Search-Frontend"),
            (2, "Search-Backend"),
            (3, "Search-Infra"),
            (4, "Payments"),
        ]);

        let loaded = load(
            &mut store,
            "ProjectByID,,4,Payments,true\nProjectsByWildcard,Search,,,true\n",
        )
        .expect("load");

        let orders: Vec<u32> = loaded.rules.iter().map(|r| r.sort_order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
        let expanded: Vec<_> = loaded.rules[1..]
            .iter()
            .map(|r| (r.kind, r.tag_ids.clone(), r.title.clone()))
            .collect();
        assert_eq!(
            expanded,
            vec![
                (RuleKind::ProjectById, vec![TagId(1)], "Search-Frontend".to_string()),
                (RuleKind::ProjectById, vec![TagId(2)], "Search-Backend".to_string()),
                (RuleKind::ProjectById, vec![TagId(3)], "Search-Infra".to_string()),
            ]
        );
        assert_eq!(store.rules("alpha").expect("rules"), loaded.rules);
    }

    #[test]
    fn duplicate_expansion_is_skipped_and_orders_stay_contiguous() {
        let mut store = store_with_tags(&[(1, "Search-Frontend"), (2, "Search-Backend")]);

        let loaded = load(
            &mut store,
            "ProjectByID,,2,Backend first,true\n\
             ProjectsByWildcard,Search,,,true\n\
             ProjectByName,Search-Frontend,,Again,true\n",
        )
        .expect("load");

        assert_eq!(loaded.duplicates, 2);
        let summary: Vec<_> = loaded
            .rules
            .iter()
            .map(|r| (r.sort_order, r.tag_ids.clone(), r.title.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, vec![TagId(2)], "Backend first".to_string()),
                (1, vec![TagId(1)], "Search-Frontend".to_string()),
            ]
        );
    }

    #[test]
    fn project_by_name_requires_exactly_one_match() {
        let mut store = store_with_tags(&[(1, "Ops"), (2, "Ops"), (3, "Docs")]);

        let loaded = load(&mut store, "ProjectByName,Docs,,Documentation,true\n").expect("load");
        assert_eq!(loaded.rules[0].kind, RuleKind::ProjectById);
        assert_eq!(loaded.rules[0].tag_ids, vec![TagId(3)]);
        assert_eq!(loaded.rules[0].title, "Documentation");

        for body in [
            "ProjectByName,Ops,,x,true\n",
            "ProjectByName,Nope,,x,true\n",
            "ProjectByName,,,x,true\n",
        ] {
            let err = load(&mut store, body).expect_err("should not resolve");
            assert!(matches!(err, EngineError::Resolution { row: 1, .. }), "{body}: {err}");
        }
    }

    #[test]
    fn unknown_kind_leaves_existing_rules_untouched() {
        let mut store = store_with_tags(&[(1, "Search")]);
        load(&mut store, "ProjectByID,,1,Search,true\n").expect("first load");

        let err = load(
            &mut store,
            "ProjectByID,,1,Search,true\nProjectByColour,red,,x,true\n",
        )
        .expect_err("unknown kind");
        assert!(matches!(err, EngineError::Validation { row: 2, .. }));
        assert_eq!(store.rules("alpha").expect("rules").len(), 1);
    }

    #[test]
    fn unknown_tag_id_is_a_resolution_error() {
        let mut store = store_with_tags(&[(1, "Search")]);
        let err = load(&mut store, "Intersection,,1 77,Both,true\n").expect_err("unknown tag");
        assert!(matches!(err, EngineError::Resolution { .. }));
        assert!(err.to_string().contains("77"));
    }

    #[test]
    fn titles_fall_back_per_kind() {
        let mut store = store_with_tags(&[(1, "Search"), (2, "Ops")]);
        let loaded = load(
            &mut store,
            "ProjectByID,,1,,true\n\
             Intersection,,1 2,,true\n\
             ProjectColumn,Doing,1,,true\n\
             ParentTask,Epic,2,,false\n",
        )
        .expect("load");

        let titles: Vec<&str> = loaded.rules.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Search", "Search & Ops", "Doing", ""]);
        assert_eq!(loaded.rules[2].match_string, "Doing");
        assert_eq!(loaded.rules[3].match_string, "Epic");
        assert!(!loaded.rules[3].display);
        assert_eq!(loaded.rules[1].tag_names, vec!["Search", "Ops"]);
    }

    #[test]
    fn load_from_missing_path_is_a_store_error() {
        let mut store = store_with_tags(&[]);
        let err = load_rules_from_path(&mut store, "alpha", Path::new("/nonexistent/rules.csv"))
            .expect_err("missing file");
        assert!(matches!(err, EngineError::Store(_)));
    }
}

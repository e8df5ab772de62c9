//! Recategorization table parser.
//!
//! The table is CSV with a header row naming the columns
//! `rule, matchstring, id, title, display`. Only `rule` is mandatory.
//!
//! - `id` is a whitespace-separated list of integer tag ids.
//! - `display` is `false`/`f`/`no`/`0` (any case) for hidden rules; any other
//!   token, including blank, means shown.
//!
//! Parsing is structural only: kinds and id arity are checked here, tag
//! references are resolved later by the loader.

use serde::Deserialize;
use std::io::Read;

use crate::error::EngineError;
use crate::model::rule::RuleKind;
use crate::model::tag::TagId;

/// One raw row as it appears in the table.
#[derive(Debug, Deserialize)]
struct RuleRow {
    rule: String,
    #[serde(default)]
    matchstring: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    display: String,
}

/// A structurally valid, not yet resolved rule row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDefinition {
    /// 1-based data row number, for error messages.
    pub row: usize,
    pub kind: RuleKind,
    pub match_string: String,
    pub tag_ids: Vec<TagId>,
    pub title: String,
    pub display: bool,
}

/// Parse the whole table, failing on the first invalid row.
///
/// # Errors
///
/// Returns [`EngineError::Validation`] for malformed CSV, an unknown rule
/// kind, a non-integer id, or several ids on a single-tag kind.
pub fn parse_definitions<R: Read>(input: R) -> Result<Vec<RuleDefinition>, EngineError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);

    let mut definitions = Vec::new();
    for (i, record) in reader.deserialize::<RuleRow>().enumerate() {
        let row = i + 1;
        let raw = record.map_err(|e| EngineError::Validation {
            row,
            reason: e.to_string(),
        })?;
        definitions.push(parse_row(row, raw)?);
    }
    Ok(definitions)
}

fn parse_row(row: usize, raw: RuleRow) -> Result<RuleDefinition, EngineError> {
    let kind: RuleKind = raw.rule.parse().map_err(|e: crate::model::rule::UnknownRuleKind| {
        EngineError::Validation {
            row,
            reason: e.to_string(),
        }
    })?;

    let tag_ids = parse_ids(&raw.id).map_err(|token| EngineError::Validation {
        row,
        reason: format!("tag id '{token}' is not an integer"),
    })?;

    if tag_ids.len() > 1 && !kind.allows_many_tags() {
        return Err(EngineError::Validation {
            row,
            reason: format!(
                "{kind} takes a single tag id, got {}; only Intersection accepts several",
                tag_ids.len()
            ),
        });
    }

    Ok(RuleDefinition {
        row,
        kind,
        match_string: raw.matchstring,
        tag_ids,
        title: raw.title,
        display: parse_display(&raw.display),
    })
}

fn parse_ids(raw: &str) -> Result<Vec<TagId>, String> {
    raw.split_whitespace()
        .map(|token| {
            token
                .parse::<i64>()
                .map(TagId)
                .map_err(|_| token.to_string())
        })
        .collect()
}

/// Interpret a display-flag token.
#[must_use]
pub fn parse_display(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "false" | "f" | "no" | "0"
    )
}

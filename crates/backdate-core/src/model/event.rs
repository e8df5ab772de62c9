//! Attribute-change events and day arithmetic.
//!
//! Events are immutable and ordered per item by `(ts_us, event_id)`. A day
//! `D` is evaluated "as of end of day": an event counts when its timestamp is
//! strictly before `D + 1` at 00:00 UTC.

use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::item::ItemId;
use super::tag::TagId;

const MICROS_PER_DAY: i64 = 86_400 * 1_000_000;

/// The item attribute an event changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Status,
    Priority,
    Points,
    Title,
    /// Tag-association change; payload is the full tag set afterwards.
    Tags,
    /// Board column move; payload is a JSON list of board/column pairs.
    Columns,
}

impl Attribute {
    /// Value stored in the `events.attribute` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Priority => "priority",
            Self::Points => "points",
            Self::Title => "title",
            Self::Tags => "tags",
            Self::Columns => "columns",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown attribute name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown attribute '{0}'")]
pub struct UnknownAttribute(pub String);

impl FromStr for Attribute {
    type Err = UnknownAttribute;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status" => Ok(Self::Status),
            "priority" => Ok(Self::Priority),
            "points" => Ok(Self::Points),
            "title" => Ok(Self::Title),
            "tags" => Ok(Self::Tags),
            "columns" => Ok(Self::Columns),
            other => Err(UnknownAttribute(other.to_string())),
        }
    }
}

/// One immutable attribute change on one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Ingestion-order identifier; breaks timestamp ties.
    pub event_id: i64,
    pub item_id: ItemId,
    pub attribute: Attribute,
    /// Raw new value as recorded by the source system.
    pub value: String,
    /// Wall-clock time in UTC microseconds.
    pub ts_us: i64,
    /// Decoded tag set for [`Attribute::Tags`] events; empty otherwise.
    #[serde(default)]
    pub tags: Vec<TagId>,
}

/// One board/column pair from a column-change payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnChange {
    #[serde(rename = "boardPHID")]
    pub board: String,
    #[serde(rename = "columnPHID")]
    pub column: String,
}

impl ColumnChange {
    /// Decode a raw column-change payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a JSON list of
    /// `{boardPHID, columnPHID}` objects.
    pub fn decode_list(raw: &str) -> Result<Vec<Self>, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Exclusive upper bound, in UTC microseconds, of "as of end of `day`".
#[must_use]
pub fn end_of_day_us(day: NaiveDate) -> i64 {
    start_of_day_us(day) + MICROS_PER_DAY
}

/// UTC microseconds of midnight at the start of `day`.
#[must_use]
pub fn start_of_day_us(day: NaiveDate) -> i64 {
    day.and_time(NaiveTime::MIN).and_utc().timestamp_micros()
}

/// Calendar day (UTC) containing the given timestamp.
#[must_use]
pub fn day_of_us(ts_us: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_micros(ts_us).map(|dt| dt.date_naive())
}

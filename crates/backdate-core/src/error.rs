use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::model::item::ItemId;

/// Machine-readable error codes for scripted callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidRule,
    UnresolvedRule,
    MissingEdgeData,
    NoIncrementalBase,
    EmptyEventLog,
    CorruptPayload,
    StoreFailure,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InvalidRule => "E2001",
            Self::UnresolvedRule => "E2002",
            Self::MissingEdgeData => "E3001",
            Self::NoIncrementalBase => "E3002",
            Self::EmptyEventLog => "E3003",
            Self::CorruptPayload => "E3004",
            Self::StoreFailure => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Scope config parse error",
            Self::InvalidRule => "Invalid recategorization rule",
            Self::UnresolvedRule => "Rule does not resolve to known tags",
            Self::MissingEdgeData => "Item has no tag associations",
            Self::NoIncrementalBase => "No snapshots to extend incrementally",
            Self::EmptyEventLog => "Event log is empty",
            Self::CorruptPayload => "Corrupt event payload",
            Self::StoreFailure => "Event store failure",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in the scope config file and retry."),
            Self::InvalidRule => Some(
                "Use one of ProjectByID, ProjectByName, ProjectsByWildcard, Intersection, \
                 ProjectColumn, ParentTask; only Intersection takes several ids.",
            ),
            Self::UnresolvedRule => Some("Check tag names and ids against the loaded event dump."),
            Self::MissingEdgeData => {
                Some("The event dump is stale or incomplete. Reload it and run a full rebuild.")
            }
            Self::NoIncrementalBase => Some("Run a full reconstruction first."),
            Self::EmptyEventLog => Some("Load events or pass an explicit start date."),
            Self::CorruptPayload => Some("Reload the event dump; a stored payload is malformed."),
            Self::StoreFailure => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by rule loading, reconstruction and recategorization.
///
/// Every variant is fatal for the operation that returned it. The two
/// recoverable conditions (duplicate rules, items matching no candidate tag)
/// never reach this type; they are logged or skipped where they occur.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Scope config that cannot be read or does not describe a scope.
    #[error("invalid scope config {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },

    /// Structurally invalid rule row; aborts the whole load.
    #[error("invalid rule at row {row}: {reason}")]
    Validation { row: usize, reason: String },

    /// Rule row whose tag references cannot be resolved.
    #[error("cannot resolve rule at row {row}: {reason}")]
    Resolution { row: usize, reason: String },

    /// An active item lost every tag association; the source log is stale.
    #[error(
        "item {item} has no tag associations as of {day}; it may have been removed from \
         the source dump, which needs reloading before a full rebuild"
    )]
    MissingEdgeData { item: ItemId, day: NaiveDate },

    /// Incremental mode was requested but the scope has no snapshots yet.
    #[error("no snapshots exist for scope '{scope}'; run a full reconstruction first")]
    NoIncrementalBase { scope: String },

    /// Full mode without an explicit start date over an empty log.
    #[error("event log is empty and no start date was given")]
    EmptyEventLog,

    /// A stored payload could not be decoded.
    #[error("malformed {what}: {detail}")]
    Decode { what: &'static str, detail: String },

    /// Underlying storage failure.
    #[error(transparent)]
    Store(anyhow::Error),
}

impl From<anyhow::Error> for EngineError {
    /// Storage errors caused by an undecodable JSON payload are reported as
    /// [`EngineError::Decode`]; everything else stays a store failure.
    fn from(err: anyhow::Error) -> Self {
        if err.chain().any(|cause| cause.is::<serde_json::Error>()) {
            Self::Decode {
                what: "stored payload",
                detail: format!("{err:#}"),
            }
        } else {
            Self::Store(err)
        }
    }
}

impl EngineError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Config { .. } => ErrorCode::ConfigParseError,
            Self::Validation { .. } => ErrorCode::InvalidRule,
            Self::Resolution { .. } => ErrorCode::UnresolvedRule,
            Self::MissingEdgeData { .. } => ErrorCode::MissingEdgeData,
            Self::NoIncrementalBase { .. } => ErrorCode::NoIncrementalBase,
            Self::EmptyEventLog => ErrorCode::EmptyEventLog,
            Self::Decode { .. } => ErrorCode::CorruptPayload,
            Self::Store(_) => ErrorCode::StoreFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineError, ErrorCode};
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::InvalidRule,
            ErrorCode::UnresolvedRule,
            ErrorCode::MissingEdgeData,
            ErrorCode::NoIncrementalBase,
            ErrorCode::EmptyEventLog,
            ErrorCode::CorruptPayload,
            ErrorCode::StoreFailure,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::MissingEdgeData.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn engine_errors_map_to_codes() {
        let err = EngineError::NoIncrementalBase {
            scope: "alpha".into(),
        };
        assert_eq!(err.code(), ErrorCode::NoIncrementalBase);
        assert!(err.to_string().contains("alpha"));

        let err = EngineError::from(anyhow::anyhow!("disk full"));
        assert_eq!(err.code(), ErrorCode::StoreFailure);
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn config_errors_name_the_file() {
        let err = EngineError::Config {
            path: "/etc/backdate/alpha.toml".into(),
            reason: "scope must not be blank".into(),
        };
        assert_eq!(err.code(), ErrorCode::ConfigParseError);
        assert_eq!(err.code().code(), "E1001");
        assert_eq!(
            err.to_string(),
            "invalid scope config /etc/backdate/alpha.toml: scope must not be blank"
        );
    }

    #[test]
    fn json_failures_become_decode_errors() {
        let cause = serde_json::from_str::<Vec<i64>>("[1,").expect_err("truncated json");
        let err = EngineError::from(anyhow::Error::new(cause).context("decode tags of T1"));
        assert_eq!(err.code(), ErrorCode::CorruptPayload);
        assert!(err.to_string().contains("decode tags of T1"));
    }
}

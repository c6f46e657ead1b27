//! Tri-state result of a single analysis step.
//!
//! Every report section returns an [`Outcome`]: it either produced a value
//! cleanly, produced a value while degrading around bad or missing input,
//! or could not run at all. Callers decide per section whether to continue,
//! log, or abort.

use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// A recoverable problem. The step that raised it still produced output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A configured column is absent from an input table.
    MissingColumn { table: String, column: String },
    /// Cells that failed type coercion and were treated as missing.
    UnparseableValues {
        table: String,
        column: String,
        count: usize,
        example: String,
    },
    /// Match rows whose status and score disagreed. The status won.
    ConfidenceConflicts { count: usize, first_row: usize },
    /// Lookup keys seen more than once. The first row per key won.
    DuplicateKeys {
        table: String,
        column: String,
        count: usize,
    },
    /// An enrichment pass did not run; its column is empty.
    EnrichmentSkipped { column: String, reason: String },
    /// Keys overlapped but no row received a value.
    SparseEnrichment { column: String, common_keys: usize },
    /// A section had nothing to compute over.
    NoData { section: String, reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingColumn { table, column } => {
                write!(f, "table '{table}': missing column '{column}'")
            }
            Self::UnparseableValues { table, column, count, example } => write!(
                f,
                "table '{table}', column '{column}': {count} value(s) could not be parsed (e.g. '{example}')"
            ),
            Self::ConfidenceConflicts { count, first_row } => write!(
                f,
                "{count} match row(s) with conflicting status and score (first at row {first_row})"
            ),
            Self::DuplicateKeys { table, column, count } => write!(
                f,
                "table '{table}', column '{column}': {count} duplicate key(s), first occurrence kept"
            ),
            Self::EnrichmentSkipped { column, reason } => {
                write!(f, "enrichment '{column}' skipped: {reason}")
            }
            Self::SparseEnrichment { column, common_keys } => write!(
                f,
                "enrichment '{column}': {common_keys} common key(s) but no value filled"
            ),
            Self::NoData { section, reason } => write!(f, "{section}: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Warning,
    Failure,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Success(T),
    Warning(T, Vec<Warning>),
    Failure(ReconError),
}

impl<T> Outcome<T> {
    /// `Success` when `warnings` is empty, `Warning` otherwise.
    pub fn from_parts(value: T, warnings: Vec<Warning>) -> Self {
        if warnings.is_empty() {
            Self::Success(value)
        } else {
            Self::Warning(value, warnings)
        }
    }

    pub fn status(&self) -> OutcomeStatus {
        match self {
            Self::Success(_) => OutcomeStatus::Success,
            Self::Warning(..) => OutcomeStatus::Warning,
            Self::Failure(_) => OutcomeStatus::Failure,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(v) | Self::Warning(v, _) => Some(v),
            Self::Failure(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Success(v) | Self::Warning(v, _) => Some(v),
            Self::Failure(_) => None,
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        match self {
            Self::Warning(_, w) => w,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&ReconError> {
        match self {
            Self::Failure(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(v) => Outcome::Success(f(v)),
            Self::Warning(v, w) => Outcome::Warning(f(v), w),
            Self::Failure(e) => Outcome::Failure(e),
        }
    }

    /// Append warnings, downgrading `Success` to `Warning` if any are added.
    pub fn with_warnings(self, extra: Vec<Warning>) -> Self {
        if extra.is_empty() {
            return self;
        }
        match self {
            Self::Success(v) => Self::Warning(v, extra),
            Self::Warning(v, mut w) => {
                w.extend(extra);
                Self::Warning(v, w)
            }
            failure => failure,
        }
    }

    /// Split into the value (if any) and the warnings raised so far.
    pub fn into_parts(self) -> Result<(T, Vec<Warning>), ReconError> {
        match self {
            Self::Success(v) => Ok((v, Vec::new())),
            Self::Warning(v, w) => Ok((v, w)),
            Self::Failure(e) => Err(e),
        }
    }
}

impl<T> From<Result<T, ReconError>> for Outcome<T> {
    fn from(result: Result<T, ReconError>) -> Self {
        match result {
            Ok(v) => Self::Success(v),
            Err(e) => Self::Failure(e),
        }
    }
}

impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Outcome", 4)?;
        s.serialize_field("status", &self.status())?;
        match self {
            Self::Success(v) => {
                s.serialize_field("value", v)?;
                s.skip_field("warnings")?;
                s.skip_field("error")?;
            }
            Self::Warning(v, w) => {
                s.serialize_field("value", v)?;
                s.serialize_field("warnings", w)?;
                s.skip_field("error")?;
            }
            Self::Failure(e) => {
                s.skip_field("value")?;
                s.skip_field("warnings")?;
                s.serialize_field("error", &e.to_string())?;
            }
        }
        s.end()
    }
}

use serde_json::json;
use thiserror::Error;

/// Why a mark entry was turned away. The store is never touched when one of
/// these is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarkRejection {
    #[error("mark is not a number: {raw}")]
    NotNumeric { raw: String },
    #[error("mark {value} is outside 0..={max}")]
    OutOfRange { value: f64, max: f64 },
}

impl MarkRejection {
    pub fn code(&self) -> &'static str {
        match self {
            MarkRejection::NotNumeric { .. } => "not_numeric",
            MarkRejection::OutOfRange { .. } => "out_of_range",
        }
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            MarkRejection::NotNumeric { raw } => json!({ "reason": self.code(), "raw": raw }),
            MarkRejection::OutOfRange { value, max } => {
                json!({ "reason": self.code(), "value": value, "max": max })
            }
        }
    }
}

/// Which denominator would have been zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Shortfall {
    #[error("no subjects configured")]
    NoSubjects,
    #[error("empty roster")]
    EmptyRoster,
}

#[derive(Debug, Error)]
pub enum GradebookError {
    #[error("mark rejected: {0}")]
    Rejected(#[from] MarkRejection),

    #[error("insufficient data: {0}")]
    InsufficientData(Shortfall),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadParams(String),

    #[error("term result sets do not cover the same students")]
    RosterMismatch,

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl GradebookError {
    pub fn code(&self) -> &'static str {
        match self {
            GradebookError::Rejected(_) => "mark_rejected",
            GradebookError::InsufficientData(_) => "insufficient_data",
            GradebookError::NotFound(_) => "not_found",
            GradebookError::Conflict(_) => "conflict",
            GradebookError::BadParams(_) => "bad_params",
            GradebookError::RosterMismatch => "roster_mismatch",
            GradebookError::Storage(_) => "storage_failure",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            GradebookError::Rejected(r) => Some(r.details()),
            GradebookError::InsufficientData(s) => Some(json!({
                "shortfall": match s {
                    Shortfall::NoSubjects => "no_subjects",
                    Shortfall::EmptyRoster => "empty_roster",
                }
            })),
            _ => None,
        }
    }

    /// The database call itself failed, as opposed to the request being
    /// refused.
    pub fn is_storage(&self) -> bool {
        matches!(self, GradebookError::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, GradebookError>;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::entity::{FieldKind, ValueError};
use crate::guid::GuidError;

/// Symbolic failure codes returned by the repository.
///
/// These are the only errors callers ever see; the underlying cause is
/// logged where it happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    NotFound,
    MultipleFound,
    FetchFailed,
    FetchManyFailed,
    FetchManyInListFailed,
    SaveFailed,
    SaveManyFailed,
    UpdateFailed,
    DeleteFailed,
    AggregateFailed,
    /// Field-level marker; appears inside serialized records, never as an
    /// operation result.
    ConversionError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NotFound",
            ErrorCode::MultipleFound => "MultipleFound",
            ErrorCode::FetchFailed => "FetchFailed",
            ErrorCode::FetchManyFailed => "FetchManyFailed",
            ErrorCode::FetchManyInListFailed => "FetchManyInListFailed",
            ErrorCode::SaveFailed => "SaveFailed",
            ErrorCode::SaveManyFailed => "SaveManyFailed",
            ErrorCode::UpdateFailed => "UpdateFailed",
            ErrorCode::DeleteFailed => "DeleteFailed",
            ErrorCode::AggregateFailed => "AggregateFailed",
            ErrorCode::ConversionError => "ConversionError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ErrorCode {}

/// Outcome of a repository operation.
pub type DbResult<T> = Result<T, ErrorCode>;

/// Faults raised while talking to the store. Never leaves the repository.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Guid(#[from] GuidError),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("column `{field}` ({kind}) cannot hold a {found} value")]
    FieldType {
        field: &'static str,
        kind: FieldKind,
        found: &'static str,
    },

    #[error("malformed JSON in column: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid timestamp `{value}`: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("no `{table}` row matches the entity key")]
    RowMissing { table: &'static str },

    #[error("`{table}` has no key value to address the row")]
    MissingKey { table: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_render_as_their_names() {
        assert_eq!(ErrorCode::NotFound.to_string(), "NotFound");
        assert_eq!(ErrorCode::MultipleFound.as_str(), "MultipleFound");
        assert_eq!(
            serde_json::to_value(ErrorCode::FetchManyInListFailed).unwrap(),
            serde_json::json!("FetchManyInListFailed")
        );
    }
}

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Transient lock contention outlived the retry budget.
    #[error("{op}: database stayed busy after {attempts} attempts")]
    Busy { op: &'static str, attempts: u32 },

    /// A guarded write matched no row although its precondition held when read
    /// inside the same transaction.
    #[error("{op}: conditional write on proposal {proposal_id} matched no row")]
    ConcurrentWrite { op: &'static str, proposal_id: i64 },

    #[error("weight {0} exceeds the storable range")]
    WeightOutOfRange(u64),

    #[error("corrupt value in column {column}: {value}")]
    Corrupt { column: &'static str, value: String },

    #[error("failed to prepare database path {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn corrupt(column: &'static str, value: impl ToString) -> Self {
        Self::Corrupt {
            column,
            value: value.to_string(),
        }
    }

    /// Lock contention that a fresh transaction may not hit.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(err) => matches!(
                err.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}

/// The statement violated the `(proposal_id, voter_id)` primary key.
pub(crate) fn is_primary_key_violation(err: &rusqlite::Error) -> bool {
    err.sqlite_error()
        .is_some_and(|e| e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
}

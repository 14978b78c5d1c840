use std::fmt::Debug;

use crate::error::{DriverError, ErrorCategory, LoaderError};

/// Hook turning a driver failure into the single error callers see.
pub trait SqlExceptionTranslator: Debug + Send + Sync {
    fn translate(&self, error: DriverError, message: &str, sql: &str) -> LoaderError;
}

/// Categorizes failures by SQLSTATE class, or by `SQLite` result code when
/// the engine reports no SQLSTATE.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardSqlExceptionTranslator;

impl StandardSqlExceptionTranslator {
    #[must_use]
    pub fn categorize(error: &DriverError) -> ErrorCategory {
        match error {
            DriverError::Timeout(_) => return ErrorCategory::Timeout,
            DriverError::ConnectionError(_) => return ErrorCategory::Connection,
            #[cfg(feature = "postgres")]
            DriverError::PoolErrorPostgres(_) => return ErrorCategory::Connection,
            #[cfg(feature = "sqlite")]
            DriverError::PoolErrorSqlite(_) => return ErrorCategory::Connection,
            #[cfg(feature = "sqlite")]
            DriverError::SqliteError(e) => return categorize_sqlite(e),
            _ => {}
        }
        error
            .sql_state()
            .map_or(ErrorCategory::Generic, |state| categorize_sql_state(&state))
    }
}

impl SqlExceptionTranslator for StandardSqlExceptionTranslator {
    fn translate(&self, error: DriverError, message: &str, sql: &str) -> LoaderError {
        LoaderError::ExecutionError {
            message: message.to_string(),
            sql: sql.to_string(),
            category: Self::categorize(&error),
            sql_state: error.sql_state(),
            source: error,
        }
    }
}

fn categorize_sql_state(state: &str) -> ErrorCategory {
    match state {
        "40001" | "40P01" | "55P03" => ErrorCategory::LockAcquisition,
        "57014" => ErrorCategory::Timeout,
        _ => match state.get(..2) {
            Some("23") => ErrorCategory::ConstraintViolation,
            Some("22") => ErrorCategory::DataException,
            Some("42") => ErrorCategory::SqlGrammar,
            Some("08") => ErrorCategory::Connection,
            _ => ErrorCategory::Generic,
        },
    }
}

#[cfg(feature = "sqlite")]
fn categorize_sqlite(error: &rusqlite::Error) -> ErrorCategory {
    use rusqlite::ErrorCode;

    match error.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => ErrorCategory::LockAcquisition,
        Some(ErrorCode::ConstraintViolation) => ErrorCategory::ConstraintViolation,
        Some(ErrorCode::TypeMismatch | ErrorCode::TooBig) => ErrorCategory::DataException,
        Some(ErrorCode::CannotOpen | ErrorCode::NotADatabase) => ErrorCategory::Connection,
        Some(ErrorCode::OperationInterrupted) => ErrorCategory::Timeout,
        _ => {
            let text = error.to_string();
            if text.contains("syntax error") || text.contains("no such") {
                ErrorCategory::SqlGrammar
            } else {
                ErrorCategory::Generic
            }
        }
    }
}

//! Error types for pgfetch.
//!
//! Every failure surfaces from the call that caused it. Driver failures are
//! carried unchanged inside [`DriverError`] so callers can still reach the
//! underlying `tokio_postgres::Error`.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::record::Record;

/// The main error type for pgfetch operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The statement could not be turned into SQL.
    #[error(transparent)]
    Compilation(#[from] CompilationError),

    /// An optional-cardinality fetch matched more than one row.
    #[error(transparent)]
    MultipleRows(Box<MultipleRowsError>),

    /// A row did not satisfy the selected model.
    #[error("Failed to construct {model} from row: {message}")]
    ModelConstruction { model: &'static str, message: String },

    /// Requested column index is past the end of the row.
    #[error("Column index {column} out of range for row with {count} columns")]
    ColumnOutOfRange { column: usize, count: usize },

    /// Failure reported by the PostgreSQL driver.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// A driver call did not finish within its timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Connection checkout from the pool failed.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// The pool was used before `connect()` or after `close()`.
    #[error("Pool is not connected")]
    NotConnected,

    /// Settings or TLS setup failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Self {
        Error::Driver(DriverError(err))
    }
}

impl From<MultipleRowsError> for Error {
    fn from(err: MultipleRowsError) -> Self {
        Error::MultipleRows(Box::new(err))
    }
}

/// Result type alias for pgfetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The statement AST is internally inconsistent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilationError {
    /// An expression references a bind parameter the statement never bound.
    #[error("Bind parameter '{name}' is referenced but has no bound value")]
    MissingParameter { name: String },

    /// Literal mode has no renderer for this value type.
    #[error("No literal renderer for {kind} value of bind parameter '{name}'")]
    UnrenderableLiteral { name: String, kind: &'static str },
}

/// An optional-cardinality fetch returned more than one row.
#[derive(Debug, Error)]
#[error("Query returned {} rows where at most one was expected: {sql}", .rows.len())]
pub struct MultipleRowsError {
    /// The compiled SQL that was executed.
    pub sql: String,
    /// Every row the driver returned.
    pub rows: Vec<Record>,
}

/// Opaque pass-through wrapper around a driver failure.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct DriverError(pub tokio_postgres::Error);

/// Coarse classification of driver failures, for display only.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    /// Syntax errors (SQLSTATE class 42 - syntax_error, etc.)
    Syntax,
    /// Semantic errors (missing table/column, ambiguous reference)
    Semantic,
    /// Execution/runtime errors (division by zero, constraint violation)
    Execution,
    /// Transaction state errors (e.g., transaction aborted)
    Transaction,
    /// Connection/communication errors
    Connection,
    /// Unknown or unclassified errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "Syntax Error"),
            ErrorCategory::Semantic => write!(f, "Semantic Error"),
            ErrorCategory::Execution => write!(f, "Execution Error"),
            ErrorCategory::Transaction => write!(f, "Transaction Error"),
            ErrorCategory::Connection => write!(f, "Connection Error"),
            ErrorCategory::Unknown => write!(f, "Error"),
        }
    }
}

impl DriverError {
    /// The underlying driver error.
    pub fn inner(&self) -> &tokio_postgres::Error {
        &self.0
    }

    /// SQLSTATE code when the server reported one.
    pub fn code(&self) -> Option<&str> {
        self.0.as_db_error().map(|db| db.code().code())
    }

    pub fn category(&self) -> ErrorCategory {
        match self.code() {
            Some(code) => categorize_sqlstate(code),
            None if self.0.is_closed() => ErrorCategory::Connection,
            None => ErrorCategory::Unknown,
        }
    }

    /// Line and column (both 1-based) of the error position inside `sql`.
    pub fn line_col(&self, sql: &str) -> Option<(usize, usize)> {
        let db = self.0.as_db_error()?;
        match db.position()? {
            tokio_postgres::error::ErrorPosition::Original(pos) => {
                Some(byte_offset_to_line_col(sql, *pos as usize))
            }
            tokio_postgres::error::ErrorPosition::Internal { .. } => None,
        }
    }
}

/// Convert a 1-based byte offset in a query string to (line, column) both 1-based.
fn byte_offset_to_line_col(query: &str, byte_pos: usize) -> (usize, usize) {
    if byte_pos == 0 || query.is_empty() {
        return (1, 1);
    }
    let target = (byte_pos - 1).min(query.len());
    let mut line = 1usize;
    let mut col = 1usize;
    for (i, ch) in query.char_indices() {
        if i >= target {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Categorize a SQLSTATE code into an ErrorCategory.
fn categorize_sqlstate(code: &str) -> ErrorCategory {
    if code.len() < 2 {
        return ErrorCategory::Unknown;
    }
    match &code[..2] {
        // 42601 = syntax_error; the rest of class 42 is undefined objects etc.
        "42" if code == "42601" || code == "42000" => ErrorCategory::Syntax,
        "42" => ErrorCategory::Semantic,
        "22" | "23" | "53" | "54" | "55" | "57" => ErrorCategory::Execution,
        "25" | "40" => ErrorCategory::Transaction,
        "08" => ErrorCategory::Connection,
        _ => ErrorCategory::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_compilation_error_display() {
        let err = CompilationError::MissingParameter { name: "p1".into() };
        assert_eq!(
            err.to_string(),
            "Bind parameter 'p1' is referenced but has no bound value"
        );
    }

    #[test]
    fn test_multiple_rows_display_counts_rows() {
        let row = Record::from_pairs([("id", Value::Int32(1))]);
        let err: Error = MultipleRowsError {
            sql: "SELECT id FROM users".into(),
            rows: vec![row.clone(), row],
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Query returned 2 rows where at most one was expected: SELECT id FROM users"
        );
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Syntax.to_string(), "Syntax Error");
        assert_eq!(ErrorCategory::Semantic.to_string(), "Semantic Error");
        assert_eq!(ErrorCategory::Execution.to_string(), "Execution Error");
        assert_eq!(ErrorCategory::Transaction.to_string(), "Transaction Error");
        assert_eq!(ErrorCategory::Connection.to_string(), "Connection Error");
        assert_eq!(ErrorCategory::Unknown.to_string(), "Error");
    }

    #[test]
    fn test_byte_offset_to_line_col() {
        let query = "SELECT *\nFROM users\nWHERE id = 1";
        assert_eq!(byte_offset_to_line_col(query, 1), (1, 1));
        assert_eq!(byte_offset_to_line_col(query, 10), (2, 1));
        assert_eq!(byte_offset_to_line_col(query, 21), (3, 1));
    }

    #[test]
    fn test_categorize_sqlstate() {
        assert_eq!(categorize_sqlstate("42601"), ErrorCategory::Syntax);
        assert_eq!(categorize_sqlstate("42P01"), ErrorCategory::Semantic);
        assert_eq!(categorize_sqlstate("23505"), ErrorCategory::Execution);
        assert_eq!(categorize_sqlstate("25001"), ErrorCategory::Transaction);
        assert_eq!(categorize_sqlstate("08006"), ErrorCategory::Connection);
        assert_eq!(categorize_sqlstate("XX000"), ErrorCategory::Unknown);
    }
}

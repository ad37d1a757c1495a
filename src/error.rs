//! Unified error hierarchy for liftlog
//!
//! Store failures, import/export failures and configuration problems all roll up
//! into [`LiftLogError`], which carries severity and user-facing messages for the
//! presentation layer.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Top-level error type for all liftlog operations
#[derive(Debug, Error)]
pub enum LiftLogError {
    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Import/export errors
    #[error("Import/Export error: {0}")]
    ImportExport(#[from] ImportExportError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database operation errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Raw SQLite failure that does not map onto a more specific kind
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    /// Unique constraint violated (e.g. a duplicate exercise name)
    #[error("Constraint violation: {constraint}")]
    ConstraintViolation { constraint: String },

    /// A row referenced a parent that does not exist
    #[error("Referential integrity error: {reason}")]
    ReferentialError { reason: String },

    /// A multi-statement write failed and was rolled back
    #[error("Transaction '{operation}' rolled back: {source}")]
    TransactionFailure {
        operation: String,
        #[source]
        source: Box<DatabaseError>,
    },

    /// Record not found
    #[error("Record not found: {table}.{id}")]
    NotFound { table: String, id: String },

    /// Entries handed to the ledger don't form one session
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// A value rejected before it reaches storage
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Stored payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DatabaseError {
    /// Wrap a failure that aborted a transaction
    pub fn transaction(operation: impl Into<String>, source: DatabaseError) -> Self {
        match source {
            // Don't nest when an inner helper already wrapped it
            already @ DatabaseError::TransactionFailure { .. } => already,
            other => DatabaseError::TransactionFailure {
                operation: operation.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through transaction wrappers
    pub fn root(&self) -> &DatabaseError {
        match self {
            DatabaseError::TransactionFailure { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self.root(), DatabaseError::ConstraintViolation { .. })
    }

    /// Busy or locked database; the same call may succeed later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.root() {
            DatabaseError::NotFound { .. }
            | DatabaseError::ConstraintViolation { .. }
            | DatabaseError::InvalidValue(_) => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ffi_err, ref message) = err {
            if ffi_err.code == ErrorCode::ConstraintViolation {
                let detail = message.clone().unwrap_or_default();
                match ffi_err.extended_code {
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        return DatabaseError::ConstraintViolation {
                            constraint: format!("name must be unique ({})", detail),
                        };
                    }
                    rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                        return DatabaseError::ReferentialError {
                            reason: format!("unknown exercise referenced ({})", detail),
                        };
                    }
                    _ => {}
                }
            }
        }
        DatabaseError::Sqlite(err)
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        DatabaseError::Serialization(err.to_string())
    }
}

/// Import and export errors
#[derive(Debug, Error)]
pub enum ImportExportError {
    /// The tabular input could not be decoded
    #[error("Parse error on line {line}: {reason}")]
    Parse { line: u64, reason: String },

    /// A required column is absent from the header
    #[error("Missing required column: {column}")]
    MissingColumn { column: String },

    /// Low-level CSV reader/writer failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Export failed to write its output
    #[error("Export failed: {reason}")]
    ExportFailed { reason: String },

    /// Reading the import file or writing the export file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for liftlog operations
pub type Result<T> = std::result::Result<T, LiftLogError>;

impl LiftLogError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LiftLogError::Io(_) => true,
            LiftLogError::Database(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            LiftLogError::Database(err) => err.severity(),
            // Bad input files are the user's to fix
            LiftLogError::ImportExport(
                ImportExportError::Parse { .. } | ImportExportError::MissingColumn { .. },
            ) => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            LiftLogError::Database(err) if err.is_constraint_violation() => {
                "That name is already taken. Exercise names must be unique.".to_string()
            }
            LiftLogError::Database(err)
                if matches!(err.root(), DatabaseError::ReferentialError { .. }) =>
            {
                "The workout references an exercise that does not exist.".to_string()
            }
            LiftLogError::ImportExport(ImportExportError::Parse { line, reason }) => {
                format!(
                    "Could not read the import file (line {}): {}. Nothing was imported.",
                    line, reason
                )
            }
            LiftLogError::ImportExport(ImportExportError::MissingColumn { column }) => {
                format!("The import file has no '{}' column.", column)
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}

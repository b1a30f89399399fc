//! # Database Error Types
//!
//! Error types for database operations and ledger calls.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          Rule violation (CoreError)        │
//! │       │                                     │                           │
//! │       ▼                                     │                           │
//! │  DbError (this module)                      │                           │
//! │       │                                     │                           │
//! │       └──────────────┬──────────────────────┘                           │
//! │                      ▼                                                  │
//! │              LedgerError ← transaction already rolled back              │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │              ErrorReport { code, message } ← what callers render        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use garage_core::CoreError;
use serde::Serialize;
use thiserror::Error;

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and user feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate document number
    /// - Second reversal of one payment
    /// - Second adjustment of one advance against one invoice
    /// - Second live invoice for one job
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint or append-only trigger rejected a write.
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// The writer lock could not be taken within the busy timeout.
    #[error("Database is busy: {0}")]
    Busy(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Configuration could not be loaded or is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A stored JSON payload could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DbError::NotFound { .. } => "NOT_FOUND",
            DbError::UniqueViolation { .. } => "DUPLICATE",
            DbError::ForeignKeyViolation { .. } => "INVALID_REFERENCE",
            DbError::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            DbError::Busy(_) => "DATABASE_BUSY",
            DbError::Config(_) => "CONFIG_ERROR",
            _ => "DATABASE_ERROR",
        }
    }
}

/// Returns true when a raw sqlx error is a UNIQUE/PRIMARY KEY violation.
///
/// Used by the one sanctioned catch-and-reread (counter creation).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Messages raised by the schema's guard triggers.
fn is_guard_message(msg: &str) -> bool {
    msg.contains("append-only") || msg.contains("frozen") || msg.contains("never decrease")
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze error kind / message
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite messages:
                // "UNIQUE constraint failed: <table>.<column>"
                // "FOREIGN KEY constraint failed"
                // "CHECK constraint failed: <name>"
                // "database is locked"
                if db_err.is_unique_violation() {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if db_err.is_check_violation() || is_guard_message(msg) {
                    DbError::ConstraintViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("database is locked") || msg.contains("database is busy") {
                    DbError::Busy(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for DbError {
    fn from(err: toml::de::Error) -> Self {
        DbError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DbError {
    fn from(err: toml::ser::Error) -> Self {
        DbError::Config(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Ledger Error
// =============================================================================

/// Error returned by [`crate::LedgerService`] operations.
///
/// By the time a caller sees one of these, the operation's transaction has
/// been rolled back.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Core(e) => e.code(),
            LedgerError::Db(e) => e.code(),
        }
    }

    /// Converts into the structure callers render.
    pub fn report(&self) -> ErrorReport {
        let message = match self {
            LedgerError::Db(DbError::QueryFailed(e))
            | LedgerError::Db(DbError::TransactionFailed(e))
            | LedgerError::Db(DbError::Internal(e)) => {
                // Log the actual error but return a generic message
                tracing::error!("Database operation failed: {}", e);
                "Database operation failed".to_string()
            }
            other => other.to_string(),
        };
        ErrorReport {
            code: self.code(),
            message,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Db(err.into())
    }
}

impl From<garage_core::ValidationError> for LedgerError {
    fn from(err: garage_core::ValidationError) -> Self {
        LedgerError::Core(CoreError::Validation(err))
    }
}

/// Machine code plus human message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use garage_core::Money;

    #[test]
    fn test_report_carries_core_code() {
        let err: LedgerError = CoreError::OverpaymentRejected {
            amount: Money::from_rupees(500),
            outstanding: Money::from_rupees(480),
        }
        .into();
        let report = err.report();
        assert_eq!(report.code, "OVERPAYMENT_REJECTED");
        assert!(report.message.contains("₹480.00"));
    }

    #[test]
    fn test_report_hides_query_details() {
        let err: LedgerError = DbError::QueryFailed("near \"SELEC\": syntax error".into()).into();
        let report = err.report();
        assert_eq!(report.code, "DATABASE_ERROR");
        assert_eq!(report.message, "Database operation failed");
    }

    #[test]
    fn test_not_found_code() {
        let err: LedgerError = DbError::not_found("Invoice", "abc").into();
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(err.to_string(), "Invoice not found: abc");
    }
}

//! Error types for the persistence layer.
//!
//! Every failure is a `DbError` built with `thiserror`. Callers that only want
//! to branch on the outcome use [`DbError::status`], which folds each error into
//! the fixed [`OperationStatus`] taxonomy so no engine-specific knowledge is
//! needed upstream.

use serde::Serialize;
use thiserror::Error;

/// Fixed outcome codes reported by accessor and routine operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum OperationStatus {
    OperationOk = 0,
    RecordNotFound = 1,
    /// Optimistic-lock mismatch: the key exists but the rowversion moved on.
    RecordModified = 2,
    RecordInactive = 3,
    DuplicateKey = 4,
    ForeignKeyViolation = 5,
    ConnectionError = 6,
    /// Stored-routine arity or parameter error.
    CallMismatch = 7,
    /// Catch-all engine failure; the native code and message travel with the error.
    ServerError = 8,
    /// Constraint, join or entity definition rejected before any statement was sent.
    InvalidDefinition = 9,
}

impl OperationStatus {
    /// Integer code of this status.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Stable upper-case name, e.g. `RECORD_MODIFIED`.
    pub fn name(self) -> &'static str {
        match self {
            Self::OperationOk => "OPERATION_OK",
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::RecordModified => "RECORD_MODIFIED",
            Self::RecordInactive => "RECORD_INACTIVE",
            Self::DuplicateKey => "DUPLICATE_KEY",
            Self::ForeignKeyViolation => "FOREIGN_KEY_VIOLATION",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::CallMismatch => "CALL_MISMATCH",
            Self::ServerError => "SERVER_ERROR",
            Self::InvalidDefinition => "INVALID_DEFINITION",
        }
    }

    /// Status of an operation result.
    pub fn of<T>(result: &DbResult<T>) -> Self {
        match result {
            Ok(_) => Self::OperationOk,
            Err(e) => e.status(),
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Record not found in '{table}'")]
    RecordNotFound { table: String },

    #[error("Record in '{table}' was modified by another session")]
    RecordModified { table: String },

    #[error("Record in '{table}' is inactive")]
    RecordInactive { table: String },

    #[error("Duplicate key: {message}")]
    DuplicateKey {
        message: String,
        code: Option<String>,
    },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation {
        message: String,
        code: Option<String>,
    },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Call mismatch for routine '{routine}': {message}")]
    CallMismatch { routine: String, message: String },

    #[error("Server error: {message}")]
    Server {
        /// Native engine code, e.g. "42P01" (SQLSTATE) or "208" (SQL Server).
        code: Option<String>,
        message: String,
    },

    #[error("Invalid definition: {message}")]
    InvalidDefinition { message: String },

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },
}

impl DbError {
    pub fn record_not_found(table: impl Into<String>) -> Self {
        Self::RecordNotFound {
            table: table.into(),
        }
    }

    pub fn record_modified(table: impl Into<String>) -> Self {
        Self::RecordModified {
            table: table.into(),
        }
    }

    pub fn record_inactive(table: impl Into<String>) -> Self {
        Self::RecordInactive {
            table: table.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn call_mismatch(routine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CallMismatch {
            routine: routine.into(),
            message: message.into(),
        }
    }

    /// Create a server error carrying the native code, if the engine reported one.
    pub fn server(code: Option<String>, message: impl Into<String>) -> Self {
        Self::Server {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_definition(message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            message: message.into(),
        }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Fold this error into the fixed status taxonomy.
    pub fn status(&self) -> OperationStatus {
        match self {
            Self::RecordNotFound { .. } => OperationStatus::RecordNotFound,
            Self::RecordModified { .. } => OperationStatus::RecordModified,
            Self::RecordInactive { .. } => OperationStatus::RecordInactive,
            Self::DuplicateKey { .. } => OperationStatus::DuplicateKey,
            Self::ForeignKeyViolation { .. } => OperationStatus::ForeignKeyViolation,
            Self::Connection { .. } => OperationStatus::ConnectionError,
            Self::CallMismatch { .. } => OperationStatus::CallMismatch,
            Self::InvalidDefinition { .. } => OperationStatus::InvalidDefinition,
            Self::Server { .. } | Self::Transaction { .. } | Self::Decode { .. } => {
                OperationStatus::ServerError
            }
        }
    }

    /// Native engine code for diagnostics, when one was reported.
    pub fn native_code(&self) -> Option<&str> {
        match self {
            Self::Server { code, .. }
            | Self::DuplicateKey { code, .. }
            | Self::ForeignKeyViolation { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection settings and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                let message = db_err.message().to_string();
                match db_err.kind() {
                    ErrorKind::UniqueViolation => DbError::DuplicateKey { message, code },
                    ErrorKind::ForeignKeyViolation => {
                        DbError::ForeignKeyViolation { message, code }
                    }
                    _ => DbError::server(code, message),
                }
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::decode(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::decode(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::decode(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::decode(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => {
                DbError::connection("Database worker crashed", "Reopen the connection")
            }
            _ => DbError::server(None, format!("Unknown database error: {}", err)),
        }
    }
}

/// Convert SQL Server driver errors to DbError.
impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error as TdsError;

        match err {
            TdsError::Server(token) => {
                let message = token.message().to_string();
                let code = Some(token.code().to_string());
                match token.code() {
                    2601 | 2627 => DbError::DuplicateKey { message, code },
                    547 => DbError::ForeignKeyViolation { message, code },
                    _ => DbError::server(code, message),
                }
            }
            TdsError::Io { message, .. } => DbError::connection(
                format!("I/O error: {}", message),
                "Check network connectivity and database server status",
            ),
            TdsError::Tls(message) => DbError::connection(
                format!("TLS error: {}", message),
                "Verify TLS configuration or enable trust_cert",
            ),
            TdsError::Routing { host, port } => DbError::connection(
                format!("Server requested routing to {}:{}", host, port),
                "Connect to the routed host directly",
            ),
            other => DbError::server(None, other.to_string()),
        }
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::connection(
            format!("I/O error: {}", err),
            "Check network connectivity and database server status",
        )
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

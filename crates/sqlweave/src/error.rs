//! Error types for sqlweave

use thiserror::Error;

/// Result type alias for sqlweave operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for composition, pooling and execution
#[derive(Debug, Error)]
pub enum OrmError {
    /// Malformed statement template or missing structural data
    #[error("Composition error: {0}")]
    Composition(String),

    /// Unknown parameter name/index or paramstyle/params shape mismatch
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// The pool reached its connection cap
    #[error("Connection pool is full (max {max} connections)")]
    Capacity { max: usize },

    /// The caller broke the pool/session/transaction protocol
    #[error("Protocol misuse: {0}")]
    Misuse(String),

    /// Operation on a session that was already closed
    #[error("Session has ended")]
    SessionEnded,

    /// Operation on a transaction that was already committed or rolled back
    #[error("Transaction has ended")]
    TransactionEnded,

    /// No ambient session in this thread and no engine to open one
    #[error("No session available: open a session or pass an engine")]
    MissingSession,

    /// Invalid engine configuration or connection URI
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Generic driver failure
    #[error("Driver error: {0}")]
    Driver(String),

    /// SQLite driver failure
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Statement execution failed; carries the statement for diagnostics
    #[error("Execution failed: {source} (sql: {sql}; params: {params})")]
    Execution {
        sql: String,
        params: String,
        #[source]
        source: Box<OrmError>,
    },

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a composition error
    pub fn composition(message: impl Into<String>) -> Self {
        Self::Composition(message.into())
    }

    /// Create a parameter error
    pub fn parameter(message: impl Into<String>) -> Self {
        Self::Parameter(message.into())
    }

    /// Create a protocol misuse error
    pub fn misuse(message: impl Into<String>) -> Self {
        Self::Misuse(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a driver error
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver(message.into())
    }

    /// Attach the failing statement to a driver error.
    pub fn execution(sql: impl Into<String>, params: impl Into<String>, source: OrmError) -> Self {
        Self::Execution {
            sql: sql.into(),
            params: params.into(),
            source: Box::new(source),
        }
    }

    /// Check if the operation may succeed when retried later
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrmError::Capacity { .. })
    }

    /// Check if this is a pool capacity error
    pub fn is_capacity(&self) -> bool {
        matches!(self, OrmError::Capacity { .. })
    }

    /// Check if this is an ended session/transaction error
    pub fn is_ended(&self) -> bool {
        matches!(self, OrmError::SessionEnded | OrmError::TransactionEnded)
    }

    /// Check if this is a protocol misuse error
    pub fn is_misuse(&self) -> bool {
        matches!(self, OrmError::Misuse(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, OrmError::NotFound(_))
    }

    /// The driver error behind an execution failure, or `self`.
    pub fn root(&self) -> &OrmError {
        match self {
            OrmError::Execution { source, .. } => source.root(),
            other => other,
        }
    }
}

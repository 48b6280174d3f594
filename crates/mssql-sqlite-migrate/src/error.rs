//! Error types for the clone library.

use thiserror::Error;

/// Main error type for clone operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQL Server connection or query error
    #[error("SQL Server error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// SQLite connection or query error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Metadata query failed for a table
    #[error("Introspection failed for {table}: {message}")]
    Introspection { table: String, message: String },

    /// No category mapping exists for a concrete column type
    #[error("No type mapping for column {column} (type '{data_type}')")]
    UnmappedType { column: String, data_type: String },

    /// Retry queue exhausted with unresolved forward references
    #[error("Unresolved dependencies after {rounds} retry rounds: {}", tables.join(", "))]
    DependencyUnsatisfied { tables: Vec<String>, rounds: usize },

    /// Destination rejected a generated script for a structural reason
    #[error("Destination rejected script for {table}: {message}")]
    MalformedDefinition { table: String, message: String },

    /// Commit/rollback issued without a matching transaction
    #[error("Transaction state desynchronized: {0}")]
    TransactionDesync(String),

    /// A value could not be translated for the destination engine
    #[error("Cannot coerce value for column {column}: {message}")]
    RowCoercion { column: String, message: String },

    /// Requested feature is not implemented
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Engine-agnostic classification of a backend error.
///
/// The resolver and transfer engine switch on this kind instead of raw
/// driver-specific codes; the per-engine translators live next to each
/// driver ([`crate::mssql::classify`], [`crate::sqlite::classify`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlErrorKind {
    /// A referenced object does not exist yet (forward FK reference,
    /// insert into a missing table).
    MissingDependency,
    /// The object being created already exists.
    DuplicateObject,
    /// The generated definition itself is invalid.
    MalformedDefinition,
    /// Commit without a matching transaction.
    TransactionDesync,
    /// Explicit identity value supplied while the override is off.
    IdentityInsertRequired,
    /// Row-level constraint violation (NOT NULL, UNIQUE, FK on DML).
    IntegrityViolation,
    /// Anything the translators do not recognize.
    Other,
}

impl MigrateError {
    /// Classify the underlying driver error, if any.
    pub fn kind(&self) -> SqlErrorKind {
        match self {
            MigrateError::Mssql(e) => crate::mssql::classify(e),
            MigrateError::Sqlite(e) => crate::sqlite::classify(e),
            _ => SqlErrorKind::Other,
        }
    }

    /// Create an Introspection error.
    pub fn introspection(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Introspection {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Process exit code for the CLI: 2 for configuration problems, 3 for
    /// unresolved dependencies, 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) => 2,
            MigrateError::DependencyUnsatisfied { .. } => 3,
            _ => 1,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for clone operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

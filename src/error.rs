// ABOUTME: Error taxonomy for the SQLite to PostgreSQL wallet migration
// ABOUTME: Every variant is fatal to the run and maps to a distinct exit code

use thiserror::Error;

/// Which side of the migration an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    Source,
    Target,
}

impl std::fmt::Display for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Store::Source => write!(f, "source (sqlite)"),
            Store::Target => write!(f, "target (postgres)"),
        }
    }
}

/// Reasons a single source value can't be interpreted per its field kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The driver surfaced a storage class the field kind can't hold
    #[error("unsupported value kind '{found}' for {expected} field")]
    UnsupportedValueKind {
        expected: &'static str,
        found: &'static str,
    },

    #[error("NULL in non-nullable field")]
    UnexpectedNull,

    #[error("text value is not valid UTF-8")]
    InvalidUtf8,

    #[error("text value '{0}' is not an integer")]
    NotAnInteger(String),

    /// Source statement shape disagrees with the descriptor
    #[error("descriptor declares columns [{expected}] but source returned [{found}]")]
    ColumnMismatch { expected: String, found: String },
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// Either store unreachable
    #[error("Connection to {store} failed: {message}")]
    Connection { store: Store, message: String },

    /// Schema, version or emptiness checks failed
    #[error("Precondition failed: {0}")]
    PreconditionMismatch(String),

    /// A source value could not be decoded per its field descriptor
    #[error("Decode failed for {table}.{column} (row {row}): {source}")]
    Decode {
        table: String,
        column: String,
        row: u64,
        #[source]
        source: DecodeError,
    },

    /// Reading from the source store failed
    #[error("Source query failed ({context}): {source}")]
    Source {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A decoded value has no encoding for the target column type
    #[error("Encode failed for {table}.{column}: {reason}")]
    Encode {
        table: String,
        column: String,
        reason: String,
    },

    /// Target rejected an insert
    #[error("Insert into {table} failed: {source}")]
    Insert {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Malformed sequence id, missing column, or setval failure
    #[error("Sequence {sequence} failed: {reason}")]
    Sequence { sequence: String, reason: String },

    /// Final commit rejected by the target
    #[error("Commit failed: {0}")]
    Commit(#[source] tokio_postgres::Error),

    /// Invalid migration plan or table descriptor
    #[error("Invalid migration plan: {0}")]
    Plan(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Target schema bootstrap through lightningd failed
    #[error("Schema bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    pub fn connection(store: Store, message: impl Into<String>) -> Self {
        MigrationError::Connection {
            store,
            message: message.into(),
        }
    }

    pub fn source(context: impl Into<String>, source: rusqlite::Error) -> Self {
        MigrationError::Source {
            context: context.into(),
            source,
        }
    }

    pub fn sequence(sequence: impl Into<String>, reason: impl Into<String>) -> Self {
        MigrationError::Sequence {
            sequence: sequence.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this error category.
    ///
    /// 1 is reserved for failures that never reached a categorised path.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrationError::Connection { .. } => 10,
            MigrationError::PreconditionMismatch(_) => 11,
            MigrationError::Decode { .. } | MigrationError::Source { .. } => 12,
            MigrationError::Insert { .. } | MigrationError::Encode { .. } => 13,
            MigrationError::Sequence { .. } => 14,
            MigrationError::Commit(_) => 15,
            MigrationError::Plan(_) | MigrationError::Config(_) => 16,
            MigrationError::Bootstrap(_) => 17,
            MigrationError::Io(_) => 18,
        }
    }
}

/// Exit code for an arbitrary anyhow error: the first categorised
/// `MigrationError` in the chain wins, anything else is 1.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<MigrationError>())
        .map(MigrationError::exit_code)
        .unwrap_or(1)
}

pub type Result<T> = std::result::Result<T, MigrationError>;

//! Error types for QSticky Core

use thiserror::Error;

use crate::database::NoteId;

/// Bad connection parameters, reported before any window opens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Engine name not recognized
    #[error("Unknown storage engine: {0}")]
    UnknownEngine(String),

    /// Options of the other engine were supplied
    #[error("Option '{option}' is not valid for the {engine} engine")]
    MixedOptions {
        engine: &'static str,
        option: &'static str,
    },

    /// A required value is empty or missing
    #[error("Missing value: {0}")]
    Missing(&'static str),

    /// A value is out of range or malformed
    #[error("Invalid value for {field}: {value}")]
    Invalid { field: &'static str, value: String },

    /// Configuration file could not be read or parsed
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// Why a session could not be established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    Unreachable,
    AuthFailed,
    InvalidPath,
}

impl std::fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectFailure::Unreachable => "unreachable",
            ConnectFailure::AuthFailed => "authentication failed",
            ConnectFailure::InvalidPath => "invalid path",
        };
        f.write_str(s)
    }
}

/// A session could not be opened. Never retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot connect to database ({reason}): {message}")]
pub struct ConnectionError {
    pub reason: ConnectFailure,
    pub message: String,
}

impl ConnectionError {
    pub fn new(reason: ConnectFailure, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl From<postgres::Error> for ConnectionError {
    fn from(err: postgres::Error) -> Self {
        use postgres::error::SqlState;

        let reason = match err.code() {
            Some(code)
                if *code == SqlState::INVALID_PASSWORD
                    || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION =>
            {
                ConnectFailure::AuthFailed
            }
            Some(code) if *code == SqlState::INVALID_CATALOG_NAME => ConnectFailure::InvalidPath,
            _ => ConnectFailure::Unreachable,
        };
        ConnectionError::new(reason, err.to_string())
    }
}

/// Schema creation or migration failed; fatal for the process
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Schema migration failed: {0}")]
pub struct SchemaError(pub String);

impl From<rusqlite::Error> for SchemaError {
    fn from(err: rusqlite::Error) -> Self {
        SchemaError(err.to_string())
    }
}

impl From<postgres::Error> for SchemaError {
    fn from(err: postgres::Error) -> Self {
        SchemaError(err.to_string())
    }
}

/// Per-operation repository failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Session dropped, database busy, or a timeout expired
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The store rejected the row
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The note id no longer exists
    #[error("Note not found: {0}")]
    NotFound(NoteId),

    /// Anything else the engine reported
    #[error("Database error: {0}")]
    Unknown(String),
}

impl StoreError {
    /// True when one reconnect followed by one retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::ConnectionLost(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::CannotOpen => StoreError::ConnectionLost(err.to_string()),
                ErrorCode::ConstraintViolation => StoreError::ConstraintViolation(err.to_string()),
                _ => StoreError::Unknown(err.to_string()),
            },
            _ => StoreError::Unknown(err.to_string()),
        }
    }
}

impl From<postgres::Error> for StoreError {
    fn from(err: postgres::Error) -> Self {
        if err.is_closed() {
            return StoreError::ConnectionLost(err.to_string());
        }
        match err.code() {
            Some(code) => {
                let class = &code.code()[..2];
                match class {
                    // connection exception, operator intervention (shutdown, query_canceled)
                    "08" | "57" => StoreError::ConnectionLost(err.to_string()),
                    "23" => StoreError::ConstraintViolation(err.to_string()),
                    _ => StoreError::Unknown(err.to_string()),
                }
            }
            None => {
                let io_failure = std::error::Error::source(&err)
                    .is_some_and(|source| source.downcast_ref::<std::io::Error>().is_some());
                let message = err.to_string();
                if io_failure || message.contains("timeout") || message.contains("communicating")
                {
                    StoreError::ConnectionLost(message)
                } else {
                    StoreError::Unknown(message)
                }
            }
        }
    }
}

/// Umbrella error for startup and coordinator operations
#[derive(Error, Debug)]
pub enum StickyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StickyError {
    /// True for errors that must abort startup
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StickyError::Config(_) | StickyError::Connection(_) | StickyError::Schema(_)
        )
    }

    /// Short message suitable for an error dialog
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(e) => format!("Invalid settings: {e}"),
            Self::Connection(e) => format!("Could not open the notes database ({})", e.reason),
            Self::Schema(_) => "The notes database could not be prepared".to_string(),
            Self::Store(StoreError::ConnectionLost(_)) => {
                "Notes database unavailable; changes are kept and will be saved later".to_string()
            }
            Self::Store(StoreError::NotFound(_)) => "Note no longer exists".to_string(),
            Self::Store(e) => format!("Failed to save: {e}"),
        }
    }
}

/// Result type alias for QSticky operations
pub type Result<T> = std::result::Result<T, StickyError>;

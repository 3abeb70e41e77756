//! Error types for keepsake operations.
//!
//! This module provides the error hierarchy with structured error codes and
//! suggestions for resolution.

use thiserror::Error;

/// Result type alias for keepsake operations.
pub type KeepsakeResult<T> = Result<T, KeepsakeError>;

/// Main error type for all keepsake operations.
#[derive(Error, Debug)]
pub enum KeepsakeError {
    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        suggestion: Option<String>,
    },

    /// Version not found.
    #[error("Version not found: {message}")]
    NotFound {
        message: String,
        code: ErrorCode,
        version_id: Option<i64>,
    },

    /// A stored snapshot could not be turned back into a typed record.
    #[error("Reconstruction error: {message}")]
    Reconstruction {
        message: String,
        code: ErrorCode,
        object_type: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Parse error.
    #[error("Parse error: {message}")]
    Parse { message: String, code: ErrorCode },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValInvalidInput,
    ValInvalidIdentifier,
    ValNotAnObject,
    ValNotRestorable,

    // Versions (VER_xxx)
    VerNotFound,
    VerUnknownType,
    VerCorruptPayload,
    VerTypeMismatch,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,

    // Parse (PARSE_xxx)
    ParseInvalidJson,
    ParseInvalidTimestamp,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValInvalidIdentifier => "VAL_002",
            ErrorCode::ValNotAnObject => "VAL_003",
            ErrorCode::ValNotRestorable => "VAL_004",
            ErrorCode::VerNotFound => "VER_001",
            ErrorCode::VerUnknownType => "VER_002",
            ErrorCode::VerCorruptPayload => "VER_003",
            ErrorCode::VerTypeMismatch => "VER_004",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::ParseInvalidTimestamp => "PARSE_002",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl KeepsakeError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            suggestion: None,
        }
    }

    /// Create a validation error with suggestion.
    pub fn validation_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create an error for a table or column name that is not a plain SQL identifier.
    pub fn invalid_identifier(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::Validation {
            message: format!("'{}' is not a valid table name", name),
            code: ErrorCode::ValInvalidIdentifier,
            suggestion: Some("Use only ASCII letters, digits and underscores".to_string()),
        }
    }

    /// Create an error for a record that does not serialize to a field mapping.
    pub fn not_an_object(object_type: &str) -> Self {
        Self::Validation {
            message: format!("Record of type '{}' did not serialize to a JSON object", object_type),
            code: ErrorCode::ValNotAnObject,
            suggestion: Some("Versionable records must serialize as structs or maps".to_string()),
        }
    }

    /// Create an error for a record whose captured fields would not restore it.
    ///
    /// Non-finite floats are the usual cause: JSON stores them as `null`.
    pub fn not_restorable(object_type: &str, source: KeepsakeError) -> Self {
        Self::Validation {
            message: format!(
                "Record of type '{}' would not restore from its captured fields: {}",
                object_type, source
            ),
            code: ErrorCode::ValNotRestorable,
            suggestion: Some(
                "Replace NaN or infinite floats, or make the type's serde round-trip".to_string(),
            ),
        }
    }

    /// Create an error for a capture time that cannot be stored in order.
    pub fn capture_time_out_of_range(timestamp: impl std::fmt::Display) -> Self {
        Self::Validation {
            message: format!("Capture time {} is outside years 0000-9999", timestamp),
            code: ErrorCode::ValInvalidInput,
            suggestion: None,
        }
    }

    /// Create a not found error.
    pub fn not_found(version_id: i64) -> Self {
        Self::NotFound {
            message: format!("Version with id '{}' not found", version_id),
            code: ErrorCode::VerNotFound,
            version_id: Some(version_id),
        }
    }

    /// Create an error for a type tag with no registered factory.
    pub fn unknown_type(object_type: impl Into<String>) -> Self {
        let object_type = object_type.into();
        Self::Reconstruction {
            message: format!("No record type registered for tag '{}'", object_type),
            code: ErrorCode::VerUnknownType,
            object_type: Some(object_type),
            source: None,
        }
    }

    /// Create an error for a stored payload that failed to deserialize.
    pub fn corrupt_payload(
        object_type: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        let object_type = object_type.into();
        Self::Reconstruction {
            message: format!("Payload for '{}' could not be deserialized: {}", object_type, source),
            code: ErrorCode::VerCorruptPayload,
            object_type: Some(object_type),
            source: Some(Box::new(source)),
        }
    }

    /// Create an error for a snapshot restored as the wrong type.
    pub fn type_mismatch(expected: &str, found: impl Into<String>) -> Self {
        let found = found.into();
        Self::Reconstruction {
            message: format!("Expected a '{}' snapshot, found '{}'", expected, found),
            code: ErrorCode::VerTypeMismatch,
            object_type: Some(found),
            source: None,
        }
    }

    /// Create a timestamp parse error.
    pub fn parse_timestamp(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidTimestamp,
        }
    }

    /// Create an error for a database file that could not be opened.
    pub fn connection_failed(path: &std::path::Path, source: rusqlite::Error) -> Self {
        Self::Database {
            message: format!("Could not open database '{}': {}", path.display(), source),
            code: ErrorCode::DbConnectionFailed,
            source: Some(Box::new(source)),
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } => *code,
            Self::NotFound { code, .. } => *code,
            Self::Reconstruction { code, .. } => *code,
            Self::Database { code, .. } => *code,
            Self::Parse { code, .. } => *code,
            Self::Serialization(_) => ErrorCode::ParseInvalidJson,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether this error is a reconstruction failure (unknown tag or bad payload).
    pub fn is_reconstruction(&self) -> bool {
        matches!(self, Self::Reconstruction { .. })
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::NotFound { .. } => Some("Please check the version ID and ensure it exists"),
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            Self::Reconstruction {
                code: ErrorCode::VerUnknownType,
                ..
            } => Some("Register the record type with TypeRegistry::builder().register::<T>()"),
            Self::Reconstruction { .. } => {
                Some("The stored row is left untouched; inspect it with `keepsake show <id>`")
            }
            Self::Database { .. } => Some("Please check the database path and permissions"),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for KeepsakeError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            code: ErrorCode::DbOperationFailed,
            source: Some(Box::new(err)),
        }
    }
}

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormFillError {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Unsupported field type '{field_type}' on field {field_id}")]
    UnsupportedFieldType { field_id: String, field_type: String },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable, client-visible classification of a [`FormFillError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    MalformedDocument,
    FieldNotFound,
    UnsupportedFieldType,
    SessionNotFound,
    SerializationError,
    InvalidState,
    IoError,
}

/// Who has to act to resolve an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The caller sent something wrong ("fix your input")
    Input,
    /// The document itself is the problem
    Document,
    /// Local failure, the same request may succeed later
    Transient,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedDocument => "MALFORMED_DOCUMENT",
            ErrorKind::FieldNotFound => "FIELD_NOT_FOUND",
            ErrorKind::UnsupportedFieldType => "UNSUPPORTED_FIELD_TYPE",
            ErrorKind::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorKind::SerializationError => "SERIALIZATION_ERROR",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::IoError => "IO_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorKind::FieldNotFound | ErrorKind::SessionNotFound | ErrorKind::InvalidState => {
                ErrorCategory::Input
            }
            ErrorKind::MalformedDocument | ErrorKind::UnsupportedFieldType => {
                ErrorCategory::Document
            }
            ErrorKind::SerializationError | ErrorKind::IoError => ErrorCategory::Transient,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FormFillError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FormFillError::MalformedDocument(_) => ErrorKind::MalformedDocument,
            FormFillError::FieldNotFound(_) => ErrorKind::FieldNotFound,
            FormFillError::UnsupportedFieldType { .. } => ErrorKind::UnsupportedFieldType,
            FormFillError::SessionNotFound(_) => ErrorKind::SessionNotFound,
            FormFillError::SerializationError(_) => ErrorKind::SerializationError,
            FormFillError::InvalidState(_) => ErrorKind::InvalidState,
            FormFillError::Io(_) => ErrorKind::IoError,
        }
    }
}

//! Errors returned by the item sources.

use crate::view::ErrorKind;

/// Result type alias for item source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors raised when changing the items of a source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// No item with this id exists.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// An item with the same unique value already exists.
    #[error("{field} '{value}' already exists")]
    Duplicate { field: &'static str, value: String },

    /// A field was missing or had an unusable value.
    #[error("Invalid value for field '{field}': {message}")]
    InvalidField { field: &'static str, message: String },

    /// The item is in the wrong state for the operation.
    #[error("{0}")]
    InvalidState(String),
}

impl SourceError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn duplicate(field: &'static str, value: impl Into<String>) -> Self {
        Self::Duplicate {
            field,
            value: value.into(),
        }
    }

    pub(crate) fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }

    /// The class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState(_) => ErrorKind::State,
            Self::Duplicate { .. } | Self::InvalidField { .. } => ErrorKind::Validation,
        }
    }
}

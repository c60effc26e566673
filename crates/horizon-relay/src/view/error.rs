//! Error types for list views.

use horizon_relay_core::TimerError;

use super::filter::FilterId;

/// Result type alias for view operations.
pub type Result<T> = std::result::Result<T, ViewError>;

/// Broad classes of view errors, used to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was malformed; nothing was changed.
    Validation,
    /// The request referred to something that doesn't exist.
    NotFound,
    /// The view is in the wrong state for the request.
    State,
}

/// Errors returned by view control operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    /// Unknown property name in a filter.
    #[error("Invalid property: {0}")]
    InvalidProperty(String),

    /// Unknown or unsortable sort property.
    #[error("Invalid sort property: {0}")]
    InvalidSortProperty(String),

    /// A negative range start was requested.
    #[error("Negative range start not allowed")]
    NegativeRangeStart,

    /// Unknown filter method.
    #[error("Invalid filter method: {0}")]
    InvalidFilterMethod(String),

    /// The filter pattern couldn't be compiled.
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A request field had the wrong type or value.
    #[error("Invalid value for field '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// No filter with this id exists.
    #[error("Filter {0} not found")]
    FilterNotFound(FilterId),

    /// The view hasn't been activated.
    #[error("The view isn't active")]
    NotActive,

    /// The periodic update timer couldn't be started.
    #[error("Update timer: {0}")]
    Timer(#[from] TimerError),
}

impl ViewError {
    /// Create a field value error.
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// The class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FilterNotFound(_) => ErrorKind::NotFound,
            Self::NotActive | Self::Timer(_) => ErrorKind::State,
            _ => ErrorKind::Validation,
        }
    }
}

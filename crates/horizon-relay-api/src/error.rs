//! Error types for the API server.

use http::StatusCode;
use horizon_relay::SourceError;
use horizon_relay::view::{ErrorKind, ViewError};
use serde_json::{Value, json};

/// A specialized Result type for API handlers.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors returned to API clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request was malformed.
    #[error("{0}")]
    BadRequest(String),

    /// A request body field was missing or invalid.
    #[error("Field '{field}': {message}")]
    InvalidField { field: String, message: String },

    /// The requested path or item doesn't exist.
    #[error("{0}")]
    NotFound(String),

    /// The path exists but not for this method.
    #[error("Method {0} not supported for this path")]
    MethodNotAllowed(String),

    /// A list view rejected the request.
    #[error(transparent)]
    View(#[from] ViewError),

    /// An item source rejected the request.
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl ApiError {
    /// Create a field error.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// The response status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::InvalidField { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::View(err) => kind_status(err.kind()),
            Self::Source(err) => kind_status(err.kind()),
        }
    }

    /// The error body sent to the client.
    pub fn to_json(&self) -> Value {
        let field = match self {
            Self::InvalidField { field, .. } => Some(field.as_str()),
            Self::View(ViewError::InvalidValue { field, .. }) => Some(field.as_str()),
            Self::Source(
                SourceError::InvalidField { field, .. } | SourceError::Duplicate { field, .. },
            ) => Some(*field),
            _ => None,
        };

        match field {
            Some(field) => json!({ "message": self.to_string(), "field": field }),
            None => json!({ "message": self.to_string() }),
        }
    }
}

fn kind_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::State => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("Invalid JSON: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(ViewError::FilterNotFound(3)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ViewError::NotActive).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ViewError::NegativeRangeStart).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::MethodNotAllowed("PATCH".into()).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[test]
    fn test_error_body() {
        let body = ApiError::invalid_field("hub_url", "field is required").to_json();
        assert_eq!(body["field"], "hub_url");
        assert_eq!(body["message"], "Field 'hub_url': field is required");

        let body = ApiError::from(ViewError::NotActive).to_json();
        assert_eq!(body["message"], "The view isn't active");
        assert!(body.get("field").is_none());
    }
}

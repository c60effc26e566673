//! API requests and responses.

use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ApiError, Result};

/// A request addressed to an API module.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: Vec<String>,
    body: Value,
}

impl ApiRequest {
    /// Create a request. Empty path segments are ignored.
    pub fn new(method: Method, path: &str, body: Value) -> Self {
        Self {
            method,
            path: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            body,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path segments, including the module name.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The request body; `Null` when none was sent.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// A required body field.
    pub fn field<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        self.optional_field(name)?
            .ok_or_else(|| ApiError::invalid_field(name, "field is required"))
    }

    /// An optional body field. `null` counts as absent.
    pub fn optional_field<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.body.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::deserialize(value)
                .map(Some)
                .map_err(|e| ApiError::invalid_field(name, e.to_string())),
        }
    }

    /// An optional body field that may be explicitly `null`.
    ///
    /// Absent gives `None`, `null` gives `Some(None)`.
    pub fn nullable_field<T: DeserializeOwned>(&self, name: &str) -> Result<Option<Option<T>>> {
        match self.body.get(name) {
            None => Ok(None),
            Some(Value::Null) => Ok(Some(None)),
            Some(value) => T::deserialize(value)
                .map(|v| Some(Some(v)))
                .map_err(|e| ApiError::invalid_field(name, e.to_string())),
        }
    }
}

/// Values of the variable segments of a matched route, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams(Vec<String>);

impl RouteParams {
    pub(crate) fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A raw parameter value.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// An item token parameter.
    pub fn token(&self, index: usize) -> Result<u32> {
        self.parse(index)
    }

    /// A non-negative range parameter.
    pub fn range(&self, index: usize) -> Result<usize> {
        self.parse(index)
    }

    fn parse<T: std::str::FromStr>(&self, index: usize) -> Result<T> {
        let value = self
            .get(index)
            .ok_or_else(|| ApiError::BadRequest(format!("Missing path parameter {index}")))?;
        value
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("Invalid path parameter '{value}'")))
    }
}

/// A successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl ApiResponse {
    /// 200 with a body.
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(body),
        }
    }

    /// 204 without a body.
    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            body: None,
        }
    }

    /// The response for a failed request.
    pub fn from_error(err: &ApiError) -> Self {
        Self {
            status: err.status(),
            body: Some(err.to_json()),
        }
    }
}

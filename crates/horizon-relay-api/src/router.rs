//! Method + path routing for API modules.
//!
//! Each module owns a [`RequestRouter`]. Routes are matched against the
//! request path after the module name: the first segment names a section
//! (`bundle`, `filter`, ...), the remaining segments are [`PathParam`]s.

use std::fmt;
use std::sync::Arc;

use http::Method;

use crate::error::{ApiError, Result};
use crate::request::{ApiRequest, ApiResponse, RouteParams};

/// One path segment of a route after its section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathParam {
    /// A fixed word.
    Exact(&'static str),
    /// An item token.
    Token,
    /// A non-negative number.
    Number,
    /// Any non-empty word.
    Name,
}

impl PathParam {
    fn matches(self, segment: &str) -> bool {
        match self {
            Self::Exact(word) => word == segment,
            Self::Token | Self::Number => {
                !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
            }
            Self::Name => !segment.is_empty(),
        }
    }
}

/// A route handler.
pub type Handler = Arc<dyn Fn(&ApiRequest, &RouteParams) -> Result<ApiResponse> + Send + Sync>;

struct Route {
    method: Method,
    section: String,
    params: Vec<PathParam>,
    handler: Handler,
}

impl Route {
    fn matches_path(&self, section: &str, rest: &[String]) -> bool {
        self.section == section
            && self.params.len() == rest.len()
            && self.params.iter().zip(rest).all(|(p, s)| p.matches(s))
    }
}

/// A table of routes.
#[derive(Default)]
pub struct RequestRouter {
    routes: Vec<Route>,
}

impl RequestRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. Earlier routes win when several match.
    pub fn route<F>(&mut self, method: Method, section: impl Into<String>, params: &[PathParam], handler: F) -> &mut Self
    where
        F: Fn(&ApiRequest, &RouteParams) -> Result<ApiResponse> + Send + Sync + 'static,
    {
        self.routes.push(Route {
            method,
            section: section.into(),
            params: params.to_vec(),
            handler: Arc::new(handler),
        });
        self
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch a request whose path is relative to the module.
    ///
    /// Fails with `NotFound` if no route has this path and with
    /// `MethodNotAllowed` if routes exist for the path but not the method.
    pub fn handle(&self, request: &ApiRequest, path: &[String]) -> Result<ApiResponse> {
        let Some((section, rest)) = path.split_first() else {
            return Err(ApiError::NotFound("Missing path section".to_string()));
        };

        let mut path_matched = false;
        for route in self.routes.iter().filter(|r| r.matches_path(section, rest)) {
            path_matched = true;
            if route.method == *request.method() {
                let params = route
                    .params
                    .iter()
                    .zip(rest)
                    .filter(|(p, _)| !matches!(p, PathParam::Exact(_)))
                    .map(|(_, s)| s.clone())
                    .collect();
                return (route.handler)(request, &RouteParams::new(params));
            }
        }

        if path_matched {
            Err(ApiError::MethodNotAllowed(request.method().to_string()))
        } else {
            Err(ApiError::NotFound(format!("Invalid path '{}'", path.join("/"))))
        }
    }
}

impl fmt::Debug for RequestRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes: Vec<String> = self
            .routes
            .iter()
            .map(|r| format!("{} {}/{:?}", r.method, r.section, r.params))
            .collect();
        f.debug_struct("RequestRouter").field("routes", &routes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn router() -> RequestRouter {
        let mut router = RequestRouter::new();
        router
            .route(Method::GET, "bundle", &[PathParam::Token], |_, params| {
                Ok(ApiResponse::ok(json!({ "token": params.token(0)? })))
            })
            .route(
                Method::POST,
                "bundle",
                &[PathParam::Token, PathParam::Exact("remove")],
                |_, params| Ok(ApiResponse::ok(json!({ "removed": params.token(0)? }))),
            )
            .route(Method::POST, "bundles", &[PathParam::Exact("remove_finished")], |_, _| {
                Ok(ApiResponse::no_content())
            });
        router
    }

    fn dispatch(router: &RequestRouter, method: Method, path: &str) -> Result<ApiResponse> {
        let request = ApiRequest::new(method, path, Value::Null);
        let path = request.path().to_vec();
        router.handle(&request, &path)
    }

    #[test]
    fn test_token_route() {
        let response = dispatch(&router(), Method::GET, "bundle/7").unwrap();
        assert_eq!(response.body, Some(json!({ "token": 7 })));
    }

    #[test]
    fn test_exact_params_are_not_passed() {
        let response = dispatch(&router(), Method::POST, "bundle/7/remove").unwrap();
        assert_eq!(response.body, Some(json!({ "removed": 7 })));
    }

    #[test]
    fn test_method_not_allowed() {
        let err = dispatch(&router(), Method::DELETE, "bundle/7").unwrap_err();
        assert_eq!(err, ApiError::MethodNotAllowed("DELETE".into()));
    }

    #[test]
    fn test_unknown_paths() {
        let router = router();
        for path in ["bundle/abc", "bundle", "nothing", "bundles/remove", ""] {
            assert!(
                matches!(dispatch(&router, Method::GET, path), Err(ApiError::NotFound(_))),
                "{path}"
            );
        }
    }
}

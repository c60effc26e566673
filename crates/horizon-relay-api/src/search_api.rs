//! The `search` module: one search instance per session.

use std::sync::Arc;
use std::time::Duration;

use horizon_relay::search::{SearchInstance, SearchResultHandler};
use horizon_relay::view::{ListViewController, ViewConfig, serialize_item};
use horizon_relay_core::logging::targets;
use http::Method;
use serde_json::json;

use crate::error::{ApiError, Result};
use crate::module::{ApiModule, page, to_array};
use crate::request::ApiResponse;
use crate::router::{PathParam, RequestRouter};
use crate::session::Session;
use crate::view_api::ListViewApi;

/// Search routes and the `search_view` list view.
///
/// Results arrive at a much higher rate than other item changes, so the
/// view is usually given a longer update interval.
pub struct SearchApi {
    instance: Arc<SearchInstance>,
    router: RequestRouter,
}

impl SearchApi {
    pub fn new(session: &Arc<Session>, update_interval: Duration) -> Self {
        let instance = Arc::new(SearchInstance::new());
        let view = ListViewController::new(
            ViewConfig::new("search_view").update_interval(update_interval),
            SearchResultHandler,
            instance.clone(),
        );
        let view_api = ListViewApi::new(view, session);

        let mut router = RequestRouter::new();
        view_api.register_routes(&mut router);
        register_routes(&mut router, &instance, session.id());
        Self { instance, router }
    }

    /// The session's search instance, fed by the hub connections.
    pub fn instance(&self) -> &Arc<SearchInstance> {
        &self.instance
    }
}

fn register_routes(router: &mut RequestRouter, instance: &Arc<SearchInstance>, session_id: u64) {
    let i = instance.clone();
    router.route(Method::POST, "search", &[], move |req, _| {
        let query: String = req.field("query")?;
        if query.trim().is_empty() {
            return Err(ApiError::invalid_field("query", "the query can't be empty"));
        }
        tracing::debug!(target: targets::API, session = session_id, %query, "search requested");
        i.start_search(&query);
        Ok(ApiResponse::no_content())
    });

    let i = instance.clone();
    router.route(
        Method::GET,
        "results",
        &[PathParam::Number, PathParam::Number],
        move |_, params| {
            let results = page(i.results(), params.range(0)?, params.range(1)?);
            Ok(ApiResponse::ok(to_array(&results, |r| serialize_item(&SearchResultHandler, r))))
        },
    );

    let i = instance.clone();
    router.route(Method::POST, "results", &[PathParam::Exact("clear")], move |_, _| {
        let count = i.clear();
        Ok(ApiResponse::ok(json!({ "count": count })))
    });

    let i = instance.clone();
    router.route(Method::GET, "result", &[PathParam::Token], move |_, params| {
        let token = params.token(0)?;
        let result = i
            .find(token)
            .ok_or_else(|| ApiError::NotFound(format!("Result {token} not found")))?;
        Ok(ApiResponse::ok(serialize_item(&SearchResultHandler, &result)))
    });
}

impl ApiModule for SearchApi {
    fn name(&self) -> &'static str {
        "search"
    }

    fn router(&self) -> &RequestRouter {
        &self.router
    }
}

impl std::fmt::Debug for SearchApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchApi")
            .field("results", &self.instance.result_count())
            .finish()
    }
}

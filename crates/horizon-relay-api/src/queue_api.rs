//! The `queue` module: download bundles.

use std::sync::Arc;
use std::time::Duration;

use horizon_relay::queue::{BundleHandler, BundlePtr, NewBundle, Priority, QueueManager};
use horizon_relay::view::{ItemSource, ListViewController, ViewConfig, serialize_item};
use horizon_relay_core::ConnectionId;
use http::Method;
use serde_json::json;

use crate::error::{ApiError, Result};
use crate::module::{
    ApiModule, ItemEventNames, forward_item_events, page, register_listener_routes, to_array,
};
use crate::request::{ApiRequest, ApiResponse};
use crate::router::{PathParam, RequestRouter};
use crate::session::{Session, Subscriptions};
use crate::view_api::ListViewApi;

/// Events a client may subscribe to.
pub static QUEUE_EVENTS: [&str; 3] = [
    "queue_bundle_added",
    "queue_bundle_removed",
    "queue_bundle_updated",
];

/// Download queue routes and the `bundle_view` list view.
pub struct QueueApi {
    queue: Arc<QueueManager>,
    router: RequestRouter,
    event_connection: ConnectionId,
}

impl QueueApi {
    pub fn new(queue: Arc<QueueManager>, session: &Arc<Session>, update_interval: Duration) -> Self {
        let subscriptions = Arc::new(Subscriptions::new(&QUEUE_EVENTS));
        let event_connection = queue
            .events()
            .connect(forward_item_events(
                BundleHandler,
                ItemEventNames {
                    added: QUEUE_EVENTS[0],
                    removed: QUEUE_EVENTS[1],
                    updated: QUEUE_EVENTS[2],
                },
                Arc::downgrade(session),
                subscriptions.clone(),
            ));

        let view = ListViewController::new(
            ViewConfig::new("bundle_view").update_interval(update_interval),
            BundleHandler,
            queue.clone(),
        );
        let view_api = ListViewApi::new(view, session);

        let mut router = RequestRouter::new();
        view_api.register_routes(&mut router);
        register_listener_routes(&mut router, &subscriptions);
        register_routes(&mut router, &queue);

        Self {
            queue,
            router,
            event_connection,
        }
    }
}

fn register_routes(router: &mut RequestRouter, queue: &Arc<QueueManager>) {
    let q = queue.clone();
    router.route(
        Method::GET,
        "bundles",
        &[PathParam::Number, PathParam::Number],
        move |_, params| {
            let bundles = page(q.bundles(), params.range(0)?, params.range(1)?);
            Ok(ApiResponse::ok(to_array(&bundles, |b| serialize_item(&BundleHandler, b))))
        },
    );

    let q = queue.clone();
    router.route(
        Method::POST,
        "bundles",
        &[PathParam::Exact("remove_finished")],
        move |_, _| {
            let count = q.remove_finished_bundles();
            Ok(ApiResponse::ok(json!({ "count": count })))
        },
    );

    let q = queue.clone();
    router.route(Method::POST, "bundles", &[PathParam::Exact("priority")], move |req, _| {
        let count = q.set_priority_all(parse_priority(req)?);
        Ok(ApiResponse::ok(json!({ "count": count })))
    });

    let q = queue.clone();
    router.route(Method::GET, "bundle", &[PathParam::Token], move |_, params| {
        let bundle = find_bundle(&q, params.token(0)?)?;
        Ok(ApiResponse::ok(serialize_item(&BundleHandler, &bundle)))
    });

    let q = queue.clone();
    router.route(
        Method::POST,
        "bundle",
        &[PathParam::Token, PathParam::Exact("remove")],
        move |_, params| {
            q.remove_bundle(params.token(0)?)?;
            Ok(ApiResponse::no_content())
        },
    );

    let q = queue.clone();
    router.route(Method::PATCH, "bundle", &[PathParam::Token], move |req, params| {
        q.set_bundle_priority(params.token(0)?, parse_priority(req)?)?;
        Ok(ApiResponse::no_content())
    });

    let q = queue.clone();
    router.route(Method::POST, "bundle", &[PathParam::Exact("file")], move |req, _| {
        let params = parse_new_bundle(req, |name, target, size| NewBundle::file(name, target, size))?;
        let bundle = q.add_bundle(params)?;
        Ok(ApiResponse::ok(serialize_item(&BundleHandler, &bundle)))
    });

    let q = queue.clone();
    router.route(Method::POST, "bundle", &[PathParam::Exact("directory")], move |req, _| {
        let params = parse_new_bundle(req, |name, target, size| {
            NewBundle::directory(name, target, size)
        })?;
        let bundle = q.add_bundle(params)?;
        Ok(ApiResponse::ok(serialize_item(&BundleHandler, &bundle)))
    });
}

fn find_bundle(queue: &QueueManager, token: u32) -> Result<BundlePtr> {
    queue
        .find_bundle(token)
        .ok_or_else(|| ApiError::NotFound(format!("Bundle {token} not found")))
}

fn parse_priority(request: &ApiRequest) -> Result<Priority> {
    let id: i64 = request.field("priority")?;
    Priority::from_id(id).ok_or_else(|| ApiError::invalid_field("priority", format!("invalid priority {id}")))
}

fn parse_new_bundle(
    request: &ApiRequest,
    create: fn(String, String, u64) -> NewBundle,
) -> Result<NewBundle> {
    let mut params = create(
        request.field("name")?,
        request.field("target")?,
        request.field("size")?,
    );
    if request.optional_field::<i64>("priority")?.is_some() {
        params = params.priority(parse_priority(request)?);
    }
    Ok(params)
}

impl ApiModule for QueueApi {
    fn name(&self) -> &'static str {
        "queue"
    }

    fn router(&self) -> &RequestRouter {
        &self.router
    }
}

impl Drop for QueueApi {
    fn drop(&mut self) {
        self.queue.events().disconnect(self.event_connection);
    }
}

impl std::fmt::Debug for QueueApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueApi").field("routes", &self.router.len()).finish()
    }
}

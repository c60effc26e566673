//! The module seam of the API server.

use std::sync::{Arc, Weak};

use horizon_relay::view::{
    ItemEvent, PropertyItemHandler, ViewItem, serialize_item, serialize_properties,
};
use http::Method;
use serde_json::{Value, json};

use crate::error::Result;
use crate::request::{ApiRequest, ApiResponse};
use crate::router::{PathParam, RequestRouter};
use crate::session::{Session, Subscriptions};

/// A group of routes under one path prefix, living as long as its session.
pub trait ApiModule: Send + Sync {
    /// The first path segment addressing this module.
    fn name(&self) -> &'static str;

    /// The module's route table.
    fn router(&self) -> &RequestRouter;

    /// Handle a request. `path` excludes the module name.
    fn handle(&self, request: &ApiRequest, path: &[String]) -> Result<ApiResponse> {
        self.router().handle(request, path)
    }
}

/// Add `POST listener/{event}` and `DELETE listener/{event}` routes.
pub(crate) fn register_listener_routes(router: &mut RequestRouter, subscriptions: &Arc<Subscriptions>) {
    let subs = subscriptions.clone();
    router.route(
        Method::POST,
        "listener",
        &[PathParam::Name],
        move |_, params| {
            subs.subscribe(params.get(0).unwrap_or_default())?;
            Ok(ApiResponse::no_content())
        },
    );

    let subs = subscriptions.clone();
    router.route(
        Method::DELETE,
        "listener",
        &[PathParam::Name],
        move |_, params| {
            subs.unsubscribe(params.get(0).unwrap_or_default())?;
            Ok(ApiResponse::no_content())
        },
    );
}

/// Push event names for the changes of an item source.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ItemEventNames {
    pub added: &'static str,
    pub removed: &'static str,
    pub updated: &'static str,
}

/// A slot forwarding source changes to a session as subscribed events.
///
/// Additions carry the whole item, updates the changed properties and
/// removals only the id.
pub(crate) fn forward_item_events<H: PropertyItemHandler>(
    handler: H,
    names: ItemEventNames,
    session: Weak<Session>,
    subscriptions: Arc<Subscriptions>,
) -> impl Fn(&ItemEvent<H::Item>) + Send + Sync + 'static {
    move |event| {
        let name = match event {
            ItemEvent::Added(_) => names.added,
            ItemEvent::Removed(_) => names.removed,
            ItemEvent::Updated(..) => names.updated,
        };
        if !subscriptions.is_active(name) {
            return;
        }
        let Some(session) = session.upgrade() else {
            return;
        };

        let data = match event {
            ItemEvent::Added(item) => serialize_item(&handler, item),
            ItemEvent::Removed(item) => json!({ "id": item.key() }),
            ItemEvent::Updated(item, changed) => {
                let mut properties = serialize_properties(&handler, item, changed);
                properties.insert("id".to_string(), json!(item.key()));
                Value::Object(properties)
            }
        };
        session.send(name, data);
    }
}

/// Items `start..start + count` of a list.
pub(crate) fn page<T>(items: Vec<T>, start: usize, count: usize) -> Vec<T> {
    items.into_iter().skip(start).take(count).collect()
}

/// Serialize a list of items into a JSON array.
pub(crate) fn to_array<T>(items: &[T], serialize: impl Fn(&T) -> Value) -> Value {
    Value::Array(items.iter().map(serialize).collect())
}

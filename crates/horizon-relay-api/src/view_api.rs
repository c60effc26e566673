//! Binding of a list view to a client session.

use std::sync::Arc;

use horizon_relay::view::{ListViewController, PropertyItemHandler, ViewUpdate};
use horizon_relay_core::ConnectionGuard;
use horizon_relay_core::logging::targets;
use http::Method;
use serde_json::{Value, json};

use crate::request::ApiResponse;
use crate::router::{PathParam, RequestRouter};
use crate::session::Session;

/// A list view owned by one session.
///
/// Diffs produced by the view are pushed to the session as
/// `<view name>_updated` events. The view is torn down when the session
/// disconnects or the binding is dropped.
pub struct ListViewApi<H: PropertyItemHandler> {
    view: Arc<ListViewController<H>>,
    _updates: ConnectionGuard<ViewUpdate>,
    _session_closed: ConnectionGuard<()>,
}

impl<H: PropertyItemHandler> ListViewApi<H> {
    pub fn new(view: Arc<ListViewController<H>>, session: &Arc<Session>) -> Arc<Self> {
        let event = format!("{}_updated", view.name());
        let weak_session = Arc::downgrade(session);
        let updates = view.updated().connect_scoped(move |update: &ViewUpdate| {
            if let Some(session) = weak_session.upgrade() {
                session.send(event.as_str(), update.to_json());
            }
        });

        let weak_view = Arc::downgrade(&view);
        let session_closed = session.disconnected().connect_scoped(move |_| {
            if let Some(view) = weak_view.upgrade() {
                view.stop();
            }
        });

        Arc::new(Self {
            view,
            _updates: updates,
            _session_closed: session_closed,
        })
    }

    pub fn view(&self) -> &Arc<ListViewController<H>> {
        &self.view
    }

    /// Add the view's routes to a module router, under the view name.
    pub fn register_routes(self: &Arc<Self>, router: &mut RequestRouter) {
        let section = self.view.name().to_string();

        let api = self.clone();
        router.route(Method::POST, section.as_str(), &[PathParam::Exact("filter")], move |req, _| {
            let id = api.view.add_filter_json(req.body())?;
            Ok(ApiResponse::ok(json!({ "id": id })))
        });

        let api = self.clone();
        router.route(
            Method::PUT,
            section.as_str(),
            &[PathParam::Exact("filter"), PathParam::Token],
            move |req, params| {
                api.view.set_filter_json(params.token(0)?, req.body())?;
                Ok(ApiResponse::no_content())
            },
        );

        let api = self.clone();
        router.route(
            Method::DELETE,
            section.as_str(),
            &[PathParam::Exact("filter"), PathParam::Token],
            move |_, params| {
                api.view.remove_filter(params.token(0)?)?;
                Ok(ApiResponse::no_content())
            },
        );

        let api = self.clone();
        router.route(Method::POST, section.as_str(), &[PathParam::Exact("settings")], move |req, _| {
            api.view.configure_json(req.body())?;
            Ok(ApiResponse::no_content())
        });

        let api = self.clone();
        router.route(Method::DELETE, section.as_str(), &[], move |_, _| {
            api.view.reset()?;
            Ok(ApiResponse::no_content())
        });

        let api = self.clone();
        router.route(
            Method::GET,
            section.as_str(),
            &[PathParam::Exact("items"), PathParam::Number, PathParam::Number],
            move |_, params| {
                let items = api.view.get_items(params.range(0)?, params.range(1)?);
                Ok(ApiResponse::ok(Value::Array(items)))
            },
        );
    }
}

impl<H: PropertyItemHandler> Drop for ListViewApi<H> {
    fn drop(&mut self) {
        tracing::trace!(target: targets::API, view = %self.view.name(), "view binding dropped");
        self.view.stop();
    }
}

impl<H: PropertyItemHandler> std::fmt::Debug for ListViewApi<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListViewApi").field("view", &self.view).finish()
    }
}

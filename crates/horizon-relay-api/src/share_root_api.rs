//! The `share_roots` module: shared directories.

use std::sync::Arc;
use std::time::Duration;

use horizon_relay::share::{RootUpdate, ShareManager, ShareRootHandler};
use horizon_relay::view::{ItemSource, ListViewController, ViewConfig, serialize_item};
use horizon_relay_core::ConnectionId;
use http::Method;
use serde_json::json;

use crate::error::{ApiError, Result};
use crate::module::{
    ApiModule, ItemEventNames, forward_item_events, register_listener_routes, to_array,
};
use crate::request::{ApiRequest, ApiResponse};
use crate::router::{PathParam, RequestRouter};
use crate::session::{Session, Subscriptions};
use crate::view_api::ListViewApi;

/// Events a client may subscribe to.
pub static SHARE_ROOT_EVENTS: [&str; 3] = [
    "share_root_created",
    "share_root_removed",
    "share_root_updated",
];

/// Share root routes and the `root_view` list view.
pub struct ShareRootApi {
    share: Arc<ShareManager>,
    router: RequestRouter,
    event_connection: ConnectionId,
}

impl ShareRootApi {
    pub fn new(share: Arc<ShareManager>, session: &Arc<Session>, update_interval: Duration) -> Self {
        let subscriptions = Arc::new(Subscriptions::new(&SHARE_ROOT_EVENTS));
        let event_connection = share.events().connect(forward_item_events(
            ShareRootHandler,
            ItemEventNames {
                added: SHARE_ROOT_EVENTS[0],
                removed: SHARE_ROOT_EVENTS[1],
                updated: SHARE_ROOT_EVENTS[2],
            },
            Arc::downgrade(session),
            subscriptions.clone(),
        ));

        let view = ListViewController::new(
            ViewConfig::new("root_view").update_interval(update_interval),
            ShareRootHandler,
            share.clone(),
        );
        let view_api = ListViewApi::new(view, session);

        let mut router = RequestRouter::new();
        view_api.register_routes(&mut router);
        register_listener_routes(&mut router, &subscriptions);
        register_routes(&mut router, &share);

        Self {
            share,
            router,
            event_connection,
        }
    }
}

fn register_routes(router: &mut RequestRouter, share: &Arc<ShareManager>) {
    let s = share.clone();
    router.route(Method::GET, "roots", &[], move |_, _| {
        let roots = s.roots();
        Ok(ApiResponse::ok(to_array(&roots, |r| serialize_item(&ShareRootHandler, r))))
    });

    let s = share.clone();
    router.route(Method::POST, "root", &[], move |req, _| {
        let path: String = req.field("path")?;
        let root = s.add_root(path, parse_update(req)?)?;
        Ok(ApiResponse::ok(serialize_item(&ShareRootHandler, &root)))
    });

    let s = share.clone();
    router.route(Method::PATCH, "root", &[PathParam::Token], move |req, params| {
        let update = parse_update(req)?;
        if update.is_empty() {
            return Err(ApiError::BadRequest("No fields to update".to_string()));
        }
        let token = params.token(0)?;
        s.update_root(token, update)?;
        let root = s
            .find_root(token)
            .ok_or_else(|| ApiError::NotFound(format!("Root {token} not found")))?;
        Ok(ApiResponse::ok(serialize_item(&ShareRootHandler, &root)))
    });

    let s = share.clone();
    router.route(Method::DELETE, "root", &[PathParam::Token], move |_, params| {
        s.remove_root(params.token(0)?)?;
        Ok(ApiResponse::no_content())
    });

    let s = share.clone();
    router.route(
        Method::POST,
        "root",
        &[PathParam::Token, PathParam::Exact("refresh")],
        move |_, params| {
            s.begin_refresh(params.token(0)?)?;
            Ok(ApiResponse::ok(json!({ "queued": true })))
        },
    );
}

fn parse_update(request: &ApiRequest) -> Result<RootUpdate> {
    Ok(RootUpdate {
        virtual_name: request.optional_field("virtual_name")?,
        profiles: request.optional_field("profiles")?,
        incoming: request.optional_field("incoming")?,
    })
}

impl ApiModule for ShareRootApi {
    fn name(&self) -> &'static str {
        "share_roots"
    }

    fn router(&self) -> &RequestRouter {
        &self.router
    }
}

impl Drop for ShareRootApi {
    fn drop(&mut self) {
        self.share.events().disconnect(self.event_connection);
    }
}

impl std::fmt::Debug for ShareRootApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareRootApi").field("routes", &self.router.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use horizon_relay::share::RefreshState;
    use http::StatusCode;
    use serde_json::Value;

    fn setup() -> (Arc<ShareManager>, Arc<Session>, ShareRootApi) {
        let share = Arc::new(ShareManager::new());
        let session = Session::new();
        let api = ShareRootApi::new(share.clone(), &session, Duration::from_secs(3600));
        (share, session, api)
    }

    fn call(api: &ShareRootApi, method: Method, path: &str, body: Value) -> Result<ApiResponse> {
        let request = ApiRequest::new(method, path, body);
        let path = request.path().to_vec();
        api.handle(&request, &path)
    }

    #[test]
    fn test_root_lifecycle() {
        let (share, _session, api) = setup();
        let root = call(
            &api,
            Method::POST,
            "root",
            json!({ "path": "/srv/music/", "profiles": [1] }),
        )
        .unwrap()
        .body
        .unwrap();
        assert_eq!(root["virtual_name"], "music");
        let id = root["id"].as_u64().unwrap();

        let updated = call(
            &api,
            Method::PATCH,
            &format!("root/{id}"),
            json!({ "virtual_name": "Tunes", "incoming": true }),
        )
        .unwrap()
        .body
        .unwrap();
        assert_eq!(updated["virtual_name"], "Tunes");
        assert_eq!(updated["incoming"], true);

        let roots = call(&api, Method::GET, "roots", Value::Null).unwrap().body.unwrap();
        assert_eq!(roots.as_array().unwrap().len(), 1);

        call(&api, Method::DELETE, &format!("root/{id}"), Value::Null).unwrap();
        assert!(share.roots().is_empty());
    }

    #[test]
    fn test_root_errors() {
        let (share, _session, api) = setup();
        let err = call(&api, Method::POST, "root", json!({ "profiles": [1] })).unwrap_err();
        assert_eq!(err.to_json()["field"], "path");

        call(&api, Method::POST, "root", json!({ "path": "/srv/a/", "profiles": [1] })).unwrap();
        let err = call(&api, Method::POST, "root", json!({ "path": "/srv/a/b/", "profiles": [1] }))
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let token = share.roots()[0].token();
        let err = call(&api, Method::PATCH, &format!("root/{token}"), json!({})).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = call(&api, Method::DELETE, "root/77", Value::Null).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_refresh_route() {
        let (share, _session, api) = setup();
        let root = share
            .add_root(
                "/srv/video/",
                RootUpdate {
                    profiles: Some([1].into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let path = format!("root/{}/refresh", root.token());

        call(&api, Method::POST, &path, Value::Null).unwrap();
        assert_eq!(root.refresh_state(), RefreshState::Running);
        assert!(call(&api, Method::POST, &path, Value::Null).is_err());
    }
}

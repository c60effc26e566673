//! The `favorite_hubs` module.

use std::sync::Arc;
use std::time::Duration;

use horizon_relay::favorites::{FavoriteHubHandler, FavoriteHubUpdate, FavoriteManager};
use horizon_relay::view::{ListViewController, ViewConfig, serialize_item};
use http::Method;
use serde_json::json;

use crate::error::{ApiError, Result};
use crate::module::{ApiModule, page, to_array};
use crate::request::{ApiRequest, ApiResponse};
use crate::router::{PathParam, RequestRouter};
use crate::session::Session;
use crate::view_api::ListViewApi;

/// Favorite hub routes and the `favorite_hub_view` list view.
pub struct FavoriteHubApi {
    router: RequestRouter,
}

impl FavoriteHubApi {
    pub fn new(favorites: Arc<FavoriteManager>, session: &Arc<Session>, update_interval: Duration) -> Self {
        let view = ListViewController::new(
            ViewConfig::new("favorite_hub_view").update_interval(update_interval),
            FavoriteHubHandler,
            favorites.clone(),
        );
        let view_api = ListViewApi::new(view, session);

        let mut router = RequestRouter::new();
        view_api.register_routes(&mut router);
        register_routes(&mut router, &favorites);
        Self { router }
    }
}

fn register_routes(router: &mut RequestRouter, favorites: &Arc<FavoriteManager>) {
    let f = favorites.clone();
    router.route(
        Method::GET,
        "hubs",
        &[PathParam::Number, PathParam::Number],
        move |_, params| {
            let hubs = page(f.favorite_hubs(), params.range(0)?, params.range(1)?);
            Ok(ApiResponse::ok(to_array(&hubs, |h| serialize_item(&FavoriteHubHandler, h))))
        },
    );

    let f = favorites.clone();
    router.route(Method::POST, "hub", &[], move |req, _| {
        let entry = f.add_favorite_hub(parse_update(req)?)?;
        Ok(ApiResponse::ok(json!({ "id": entry.token() })))
    });

    let f = favorites.clone();
    router.route(Method::GET, "hub", &[PathParam::Token], move |_, params| {
        let token = params.token(0)?;
        let entry = f
            .find(token)
            .ok_or_else(|| ApiError::NotFound(format!("Hub {token} not found")))?;
        Ok(ApiResponse::ok(serialize_item(&FavoriteHubHandler, &entry)))
    });

    let f = favorites.clone();
    router.route(Method::PATCH, "hub", &[PathParam::Token], move |req, params| {
        f.update_favorite_hub(params.token(0)?, parse_update(req)?)?;
        Ok(ApiResponse::no_content())
    });

    let f = favorites.clone();
    router.route(Method::DELETE, "hub", &[PathParam::Token], move |_, params| {
        f.remove_favorite_hub(params.token(0)?)?;
        Ok(ApiResponse::no_content())
    });
}

fn parse_update(request: &ApiRequest) -> Result<FavoriteHubUpdate> {
    Ok(FavoriteHubUpdate {
        name: request.optional_field("name")?,
        hub_url: request.optional_field("hub_url")?,
        hub_description: request.optional_field("hub_description")?,
        auto_connect: request.optional_field("auto_connect")?,
        share_profile: request.nullable_field("share_profile")?,
        nick: request.optional_field("nick")?,
        password: request.optional_field("password")?,
        user_description: request.optional_field("user_description")?,
        ignore_private_messages: request.optional_field("ignore_private_messages")?,
    })
}

impl ApiModule for FavoriteHubApi {
    fn name(&self) -> &'static str {
        "favorite_hubs"
    }

    fn router(&self) -> &RequestRouter {
        &self.router
    }
}

impl std::fmt::Debug for FavoriteHubApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FavoriteHubApi").field("routes", &self.router.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use serde_json::Value;

    fn setup() -> (Arc<FavoriteManager>, FavoriteHubApi) {
        let favorites = Arc::new(FavoriteManager::new());
        let api = FavoriteHubApi::new(favorites.clone(), &Session::new(), Duration::from_secs(3600));
        (favorites, api)
    }

    fn call(api: &FavoriteHubApi, method: Method, path: &str, body: Value) -> Result<ApiResponse> {
        let request = ApiRequest::new(method, path, body);
        let path = request.path().to_vec();
        api.handle(&request, &path)
    }

    #[test]
    fn test_hub_lifecycle() {
        let (favorites, api) = setup();
        let response = call(
            &api,
            Method::POST,
            "hub",
            json!({ "name": "Main", "hub_url": "adcs://hub.example:2780", "share_profile": 2 }),
        )
        .unwrap();
        let id = response.body.unwrap()["id"].as_u64().unwrap();

        call(
            &api,
            Method::PATCH,
            &format!("hub/{id}"),
            json!({ "auto_connect": true, "share_profile": null }),
        )
        .unwrap();
        let entry = favorites.find(id as u32).unwrap();
        assert!(entry.auto_connect());
        assert_eq!(entry.share_profile(), None);

        let hub = call(&api, Method::GET, &format!("hub/{id}"), Value::Null)
            .unwrap()
            .body
            .unwrap();
        assert_eq!(hub["name"], "Main");

        call(&api, Method::DELETE, &format!("hub/{id}"), Value::Null).unwrap();
        assert!(favorites.favorite_hubs().is_empty());
    }

    #[test]
    fn test_hub_validation() {
        let (_favorites, api) = setup();
        let err = call(&api, Method::POST, "hub", json!({ "name": "Main" })).unwrap_err();
        assert_eq!(err.to_json()["field"], "hub_url");

        let err = call(
            &api,
            Method::POST,
            "hub",
            json!({ "name": "Old", "hub_url": "dchub://old.example", "share_profile": 1 }),
        )
        .unwrap_err();
        assert_eq!(err.to_json()["field"], "share_profile");

        call(&api, Method::POST, "hub", json!({ "name": "A", "hub_url": "adc://a.example" })).unwrap();
        let err = call(&api, Method::POST, "hub", json!({ "name": "B", "hub_url": "ADC://A.example" }))
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_json()["field"], "hub_url");
    }

    #[test]
    fn test_hub_pages() {
        let (favorites, api) = setup();
        for i in 0..3 {
            favorites
                .add_favorite_hub(FavoriteHubUpdate {
                    name: Some(format!("Hub {i}")),
                    hub_url: Some(format!("adc://hub{i}.example")),
                    ..Default::default()
                })
                .unwrap();
        }
        let hubs = call(&api, Method::GET, "hubs/2/10", Value::Null).unwrap().body.unwrap();
        assert_eq!(hubs.as_array().unwrap().len(), 1);
        assert_eq!(hubs[0]["name"], "Hub 2");
    }
}

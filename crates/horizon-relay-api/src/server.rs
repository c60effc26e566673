//! Per-session request dispatch.

use std::sync::Arc;

use horizon_relay::favorites::FavoriteManager;
use horizon_relay::queue::QueueManager;
use horizon_relay::search::SearchInstance;
use horizon_relay::share::ShareManager;
use horizon_relay_core::logging::{span_names, targets};

use crate::config::ServerConfig;
use crate::error::{ApiError, Result};
use crate::favorite_hub_api::FavoriteHubApi;
use crate::module::ApiModule;
use crate::queue_api::QueueApi;
use crate::request::{ApiRequest, ApiResponse};
use crate::search_api::SearchApi;
use crate::session::Session;
use crate::share_root_api::ShareRootApi;

/// The item sources shared by every session.
#[derive(Clone, Debug, Default)]
pub struct Managers {
    pub queue: Arc<QueueManager>,
    pub share: Arc<ShareManager>,
    pub favorites: Arc<FavoriteManager>,
}

impl Managers {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The API modules of one session.
///
/// Requests are routed by their first path segment (`queue`,
/// `share_roots`, `favorite_hubs` or `search`).
pub struct ApiServer {
    session: Arc<Session>,
    modules: Vec<Box<dyn ApiModule>>,
    search: Arc<SearchInstance>,
}

impl ApiServer {
    pub fn new(managers: &Managers, config: &ServerConfig, session: Arc<Session>) -> Self {
        let search_api = SearchApi::new(&session, config.search_view_interval());
        let search = search_api.instance().clone();

        let modules: Vec<Box<dyn ApiModule>> = vec![
            Box::new(QueueApi::new(managers.queue.clone(), &session, config.view_interval())),
            Box::new(ShareRootApi::new(managers.share.clone(), &session, config.view_interval())),
            Box::new(FavoriteHubApi::new(
                managers.favorites.clone(),
                &session,
                config.view_interval(),
            )),
            Box::new(search_api),
        ];

        tracing::debug!(target: targets::API, session = session.id(), "session created");
        Self {
            session,
            modules,
            search,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// The session's search instance.
    pub fn search(&self) -> &Arc<SearchInstance> {
        &self.search
    }

    /// Names of the modules, in dispatch order.
    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Handle one request. Failures become error responses.
    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let span = tracing::debug_span!(
            target: targets::API,
            span_names::API_REQUEST,
            session = self.session.id(),
            method = %request.method(),
            path = %request.path().join("/"),
        );
        let _entered = span.enter();

        match self.dispatch(request) {
            Ok(response) => {
                tracing::trace!(target: targets::API, status = response.status.as_u16(), "request handled");
                response
            }
            Err(err) => {
                let response = ApiResponse::from_error(&err);
                tracing::debug!(
                    target: targets::API,
                    status = response.status.as_u16(),
                    error = %err,
                    "request failed"
                );
                response
            }
        }
    }

    fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let Some((name, rest)) = request.path().split_first() else {
            return Err(ApiError::NotFound("Missing module name".to_string()));
        };
        let module = self
            .modules
            .iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| ApiError::NotFound(format!("No such module: {name}")))?;
        module.handle(request, rest)
    }
}

impl std::fmt::Debug for ApiServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiServer")
            .field("session", &self.session)
            .field("modules", &self.module_names())
            .finish()
    }
}

static_assertions::assert_impl_all!(ApiServer: Send, Sync);
static_assertions::assert_impl_all!(Managers: Send, Sync);

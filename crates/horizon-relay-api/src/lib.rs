//! API server for Horizon Relay.
//!
//! Clients connect over a JSON-lines socket, address the item sources
//! through per-session modules and receive live list view updates as
//! pushed events.
//!
//! # Serving
//!
//! ```no_run
//! use horizon_relay_api::{JsonLineServer, Managers, ServerConfig};
//!
//! # async fn run() -> Result<(), horizon_relay_api::TransportError> {
//! let server = JsonLineServer::bind(ServerConfig::new().port(5600), Managers::new()).await?;
//! server.serve().await
//! # }
//! ```
//!
//! # Dispatching in-process
//!
//! ```
//! use horizon_relay_api::{ApiRequest, ApiServer, Managers, ServerConfig, Session};
//! use http::Method;
//! use serde_json::json;
//!
//! let api = ApiServer::new(&Managers::new(), &ServerConfig::default(), Session::new());
//! let response = api.handle(&ApiRequest::new(
//!     Method::POST,
//!     "queue/bundle_view/settings",
//!     json!({ "sort_property": "name", "max_count": 50 }),
//! ));
//! assert_eq!(response.status, http::StatusCode::NO_CONTENT);
//! ```

pub mod config;
mod error;
pub mod favorite_hub_api;
mod module;
pub mod queue_api;
mod request;
mod router;
pub mod search_api;
pub mod server;
pub mod session;
pub mod share_root_api;
pub mod transport;
pub mod view_api;

pub use config::{ConfigError, ServerConfig};
pub use error::{ApiError, Result};
pub use module::ApiModule;
pub use request::{ApiRequest, ApiResponse, RouteParams};
pub use router::{Handler, PathParam, RequestRouter};
pub use server::{ApiServer, Managers};
pub use session::{PushMessage, Session, SessionId, Subscriptions};
pub use transport::{JsonLineServer, ServerEvents, TransportError};
pub use view_api::ListViewApi;

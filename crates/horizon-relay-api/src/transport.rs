//! JSON-lines socket transport.
//!
//! Every line a client sends is one request:
//!
//! ```json
//! {"callback_id": 1, "method": "POST", "path": "queue/bundle_view/settings", "data": {"sort_property": "name"}}
//! ```
//!
//! and is answered with one line carrying the same `callback_id`, the
//! status `code` and either `data` or `error`. Pushed events are written
//! as `{"event": ..., "data": ...}` lines between responses.
//!
//! Each connection gets its own [`Session`] and [`ApiServer`]. Closing the
//! socket disconnects the session, which tears its views down. A line
//! longer than the configured limit is discarded and answered with an
//! error. A client that falls more than `max_pending_lines` lines behind
//! is disconnected.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use horizon_relay_core::Signal;
use horizon_relay_core::logging::targets;
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinSet;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::request::{ApiRequest, ApiResponse};
use crate::server::{ApiServer, Managers};
use crate::session::{PushMessage, Session, SessionId};

/// Errors of the socket transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Connection notifications of a [`JsonLineServer`].
#[derive(Debug, Default)]
pub struct ServerEvents {
    /// Emitted when a client connects.
    pub session_opened: Signal<SessionId>,
    /// Emitted after a client's session has been torn down.
    pub session_closed: Signal<SessionId>,
}

#[derive(Debug, Deserialize)]
struct RequestLine {
    #[serde(default)]
    callback_id: Option<u64>,
    method: String,
    path: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Serialize)]
struct ResponseLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_id: Option<u64>,
    code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

impl ResponseLine {
    fn new(callback_id: Option<u64>, response: ApiResponse) -> Self {
        let (data, error) = if response.status.is_success() {
            (response.body, None)
        } else {
            (None, response.body)
        };
        Self {
            callback_id,
            code: response.status.as_u16(),
            data,
            error,
        }
    }
}

/// A TCP server speaking JSON lines.
pub struct JsonLineServer {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    managers: Managers,
    events: Arc<ServerEvents>,
}

impl JsonLineServer {
    /// Bind the listening socket.
    pub async fn bind(config: ServerConfig, managers: Managers) -> Result<Self, TransportError> {
        let address = config.bind_addr();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| TransportError::Bind { address, source })?;

        Ok(Self {
            listener,
            config: Arc::new(config),
            managers,
            events: Arc::new(ServerEvents::default()),
        })
    }

    /// The bound address; useful when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn events(&self) -> &Arc<ServerEvents> {
        &self.events
    }

    /// Accept clients until `shutdown` completes, then drop every connection.
    pub async fn serve_until<F>(self, shutdown: F) -> Result<(), TransportError>
    where
        F: std::future::Future<Output = ()>,
    {
        let local_addr = self.local_addr()?;
        tracing::info!(target: targets::SERVER, %local_addr, "listening");

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(handle_connection(
                            stream,
                            peer,
                            self.managers.clone(),
                            self.config.clone(),
                            self.events.clone(),
                        ));
                    }
                    Err(err) => {
                        tracing::warn!(target: targets::SERVER, error = %err, "accept failed");
                    }
                },

                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        tracing::info!(target: targets::SERVER, clients = connections.len(), "shutting down");
        connections.shutdown().await;
        Ok(())
    }

    /// Accept clients forever.
    pub async fn serve(self) -> Result<(), TransportError> {
        self.serve_until(std::future::pending()).await
    }
}

impl std::fmt::Debug for JsonLineServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLineServer")
            .field("local_addr", &self.listener.local_addr().ok())
            .finish()
    }
}

/// Disconnects the session however the connection task ends.
struct SessionGuard {
    session: Arc<Session>,
    events: Arc<ServerEvents>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.disconnect();
        self.events.session_closed.emit(self.session.id());
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    managers: Managers,
    config: Arc<ServerConfig>,
    events: Arc<ServerEvents>,
) {
    let session = Session::new();
    let session_id = session.id();
    tracing::info!(target: targets::SERVER, session = session_id, %peer, "client connected");

    let (line_tx, mut line_rx) = mpsc::channel::<String>(config.max_pending_lines.max(1));
    let overflow = Arc::new(Notify::new());
    queue_pushes(&session, line_tx.clone(), overflow.clone());

    let (reader, mut writer) = stream.into_split();
    let writer_task = tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.shutdown().await
    });

    {
        let guard = SessionGuard {
            session: session.clone(),
            events: events.clone(),
        };
        let api = ApiServer::new(&managers, &config, session.clone());
        events.session_opened.emit(session_id);

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let limit = config.max_line_length as u64 + 1;
        loop {
            line.clear();
            let mut limited = (&mut reader).take(limit);
            let read = tokio::select! {
                read = limited.read_line(&mut line) => read,
                _ = overflow.notified() => break,
            };
            let read = match read {
                Ok(read) => read,
                Err(err) => {
                    tracing::debug!(target: targets::SERVER, session = session_id, error = %err, "read failed");
                    break;
                }
            };
            if read == 0 {
                break;
            }

            let response = if !line.ends_with('\n') && read as u64 >= limit {
                tracing::warn!(target: targets::SERVER, session = session_id, "request line too long");
                if let Err(err) = skip_line(&mut reader).await {
                    tracing::debug!(target: targets::SERVER, session = session_id, error = %err, "read failed");
                    break;
                }
                let err = ApiError::BadRequest("Request line too long".to_string());
                ResponseLine::new(None, ApiResponse::from_error(&err))
            } else {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                process_line(&api, trimmed)
            };

            match serde_json::to_string(&response) {
                Ok(text) => {
                    if line_tx.send(text).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(target: targets::SERVER, error = %err, "failed to encode response");
                }
            }
        }

        drop(api);
        drop(guard);
    }

    drop(line_tx);
    match writer_task.await {
        Ok(Err(err)) => {
            tracing::debug!(target: targets::SERVER, session = session_id, error = %err, "write failed");
        }
        Err(err) if err.is_panic() => {
            tracing::warn!(target: targets::SERVER, session = session_id, "writer task panicked");
        }
        _ => {}
    }
    tracing::info!(target: targets::SERVER, session = session_id, "client disconnected");
}

/// Queue the session's pushes for the writer task.
///
/// Pushes are emitted on producer threads and must not block, so a full
/// queue notifies `overflow` and drops every later push.
fn queue_pushes(session: &Session, line_tx: mpsc::Sender<String>, overflow: Arc<Notify>) {
    let session_id = session.id();
    let overflowed = AtomicBool::new(false);
    session.push().connect(move |message: &PushMessage| {
        if overflowed.load(Ordering::Acquire) {
            return;
        }
        let Ok(line) = serde_json::to_string(message) else {
            return;
        };
        if let Err(mpsc::error::TrySendError::Full(_)) = line_tx.try_send(line) {
            if !overflowed.swap(true, Ordering::AcqRel) {
                tracing::warn!(target: targets::SERVER, session = session_id, "client is not reading, disconnecting");
                overflow.notify_one();
            }
        }
    });
}

/// Discard input up to and including the next newline.
async fn skip_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<()> {
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(());
        }
        match buf.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

fn process_line(api: &ApiServer, line: &str) -> ResponseLine {
    let request: RequestLine = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            return ResponseLine::new(None, ApiResponse::from_error(&ApiError::from(err)));
        }
    };

    let method = match Method::from_bytes(request.method.to_ascii_uppercase().as_bytes()) {
        Ok(method) => method,
        Err(_) => {
            let err = ApiError::BadRequest(format!("Invalid method '{}'", request.method));
            return ResponseLine::new(request.callback_id, ApiResponse::from_error(&err));
        }
    };

    let response = api.handle(&ApiRequest::new(method, &request.path, request.data));
    ResponseLine::new(request.callback_id, response)
}

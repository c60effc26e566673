//! The JSON-lines transport over a real socket.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use horizon_relay::queue::NewBundle;
use horizon_relay::view::ItemSource;
use horizon_relay_api::{JsonLineServer, Managers, ServerConfig, ServerEvents};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::time::timeout;

struct TestServer {
    address: SocketAddr,
    events: Arc<ServerEvents>,
    shutdown: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(managers: Managers, config: ServerConfig) -> Self {
        let server = JsonLineServer::bind(config.bind_address("127.0.0.1").port(0), managers)
            .await
            .unwrap();
        let address = server.local_addr().unwrap();
        let events = server.events().clone();
        let (shutdown, stopped) = oneshot::channel();
        let task = tokio::spawn(async move {
            server
                .serve_until(async {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        });
        Self {
            address,
            events,
            shutdown: Some(shutdown),
            task,
        }
    }

    async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        timeout(Duration::from_secs(5), &mut self.task)
            .await
            .unwrap()
            .unwrap();
    }
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    /// Lines skipped by `read_until`, in arrival order.
    skipped: VecDeque<Value>,
}

impl TestClient {
    async fn connect(address: SocketAddr) -> Self {
        let stream = TcpStream::connect(address).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
            skipped: VecDeque::new(),
        }
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn request(&mut self, callback_id: u64, method: &str, path: &str, data: Value) -> Value {
        let line = json!({ "callback_id": callback_id, "method": method, "path": path, "data": data });
        self.send_raw(&line.to_string()).await;
        self.read_until(|v| v["callback_id"] == callback_id).await
    }

    async fn next_line(&mut self) -> Option<Value> {
        let line = timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .unwrap()
            .unwrap()?;
        Some(serde_json::from_str(&line).unwrap())
    }

    /// The first line that matches, earlier skipped lines included.
    async fn read_until(&mut self, accept: impl Fn(&Value) -> bool) -> Value {
        if let Some(pos) = self.skipped.iter().position(&accept) {
            return self.skipped.remove(pos).unwrap();
        }
        loop {
            let value = self.next_line().await.expect("connection closed");
            if accept(&value) {
                return value;
            }
            self.skipped.push_back(value);
        }
    }
}

fn fast_config() -> ServerConfig {
    ServerConfig::new()
        .view_update_interval(Duration::from_millis(10))
        .search_view_update_interval(Duration::from_millis(10))
}

#[tokio::test]
async fn requests_are_answered_with_callback_ids() {
    let server = TestServer::start(Managers::new(), fast_config()).await;
    let mut client = TestClient::connect(server.address).await;

    let response = client
        .request(
            1,
            "POST",
            "favorite_hubs/hub",
            json!({ "name": "Main", "hub_url": "adc://main.example" }),
        )
        .await;
    assert_eq!(response["code"], 200);
    let id = response["data"]["id"].as_u64().unwrap();

    let response = client.request(2, "GET", &format!("favorite_hubs/hub/{id}"), Value::Null).await;
    assert_eq!(response["data"]["hub_url"], "adc://main.example");

    let response = client.request(3, "DELETE", "favorite_hubs/hub/999", Value::Null).await;
    assert_eq!(response["code"], 404);
    assert!(response["error"]["message"].is_string());
    assert!(response.get("data").is_none());

    client.send_raw("{ not json").await;
    let response = client.next_line().await.unwrap();
    assert_eq!(response["code"], 400);

    server.stop().await;
}

#[tokio::test]
async fn view_updates_are_pushed() {
    let managers = Managers::new();
    managers
        .queue
        .add_bundle(NewBundle::directory("Beta", "/dl/beta/", 10))
        .unwrap();
    let server = TestServer::start(managers.clone(), fast_config()).await;
    let mut client = TestClient::connect(server.address).await;

    let response = client
        .request(
            1,
            "POST",
            "queue/bundle_view/settings",
            json!({ "sort_property": "name", "max_count": 20 }),
        )
        .await;
    assert_eq!(response["code"], 204);

    let push = client
        .read_until(|v| v["event"] == "bundle_view_updated")
        .await;
    assert_eq!(push["data"]["total_items"], 1);
    assert_eq!(push["data"]["items"][0]["properties"]["name"], "Beta");

    // Sorts after Beta, so it enters the window below it.
    let gamma = managers
        .queue
        .add_bundle(NewBundle::directory("Gamma", "/dl/gamma/", 10))
        .unwrap();
    let push = client
        .read_until(|v| v["event"] == "bundle_view_updated" && v["data"]["total_items"] == 2)
        .await;
    let items = push["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items[0].get("properties").is_none());
    assert_eq!(items[1]["id"], gamma.token());
    assert_eq!(items[1]["properties"]["name"], "Gamma");

    // Sorts first: the range start follows the item that was in view.
    managers
        .queue
        .add_bundle(NewBundle::directory("Alpha", "/dl/alpha/", 10))
        .unwrap();
    let push = client
        .read_until(|v| v["event"] == "bundle_view_updated" && v["data"]["total_items"] == 3)
        .await;
    assert_eq!(push["data"]["range_offset"], 1);
    assert_eq!(push["data"]["range_start"], 1);
    assert!(push["data"].get("items").is_none());

    server.stop().await;
}

#[tokio::test]
async fn closing_the_socket_tears_the_session_down() {
    let managers = Managers::new();
    let server = TestServer::start(managers.clone(), fast_config()).await;

    let closed = Arc::new(AtomicUsize::new(0));
    let counter = closed.clone();
    server.events.session_closed.connect(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut client = TestClient::connect(server.address).await;
    client
        .request(1, "POST", "queue/bundle_view/settings", json!({ "sort_property": "name" }))
        .await;
    // The view and the event subscriptions of the session.
    assert_eq!(managers.queue.events().connection_count(), 2);

    drop(client);
    timeout(Duration::from_secs(5), async {
        while closed.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(managers.queue.events().connection_count(), 0);

    server.stop().await;
}

#[tokio::test]
async fn overlong_lines_are_rejected() {
    let server = TestServer::start(Managers::new(), fast_config().max_line_length(128)).await;
    let mut client = TestClient::connect(server.address).await;

    client.send_raw(&"x".repeat(1000)).await;
    let response = client.next_line().await.unwrap();
    assert_eq!(response["code"], 400);
    assert!(response.get("callback_id").is_none());

    let response = client.request(1, "GET", "favorite_hubs/hubs/0/10", Value::Null).await;
    assert_eq!(response["code"], 200);
    assert_eq!(response["data"], json!([]));

    server.stop().await;
}

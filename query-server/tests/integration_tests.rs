//! Integration tests for the query server.
//!
//! These start a real server on loopback and talk to it over HTTP and
//! WebSocket.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use query_protocol::{QueryError, QueryRequest};
use query_server::{routes, ClientId, ClientRegistry, QueryServer, RequestHandler};
use tokio::time::timeout;

/// Answers every path except `/missing`, and records listen toggles
struct Recorder {
    registry: Arc<ClientRegistry>,
    opened: Mutex<Vec<ClientId>>,
    closed: Mutex<Vec<ClientId>>,
    values: Mutex<HashMap<String, i64>>,
}

impl Recorder {
    fn new(registry: Arc<ClientRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            opened: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            values: Mutex::new(HashMap::from([("/a".to_string(), 1)])),
        })
    }

    fn answer(&self, request: &QueryRequest) -> Result<String, QueryError> {
        let values = self.values.lock();
        let value = values
            .get(request.path())
            .ok_or_else(|| QueryError::PathNotFound(request.path().to_string()))?;
        Ok(serde_json::json!({ "full_path": request.path(), "value": [value] }).to_string())
    }
}

impl RequestHandler for Recorder {
    fn on_open(&self, client: ClientId) -> Vec<String> {
        self.opened.lock().push(client);
        vec![r#"{"osc_port":9000}"#.to_string()]
    }

    fn on_message(&self, client: ClientId, text: &str) -> Option<String> {
        match QueryRequest::parse(text) {
            Ok(QueryRequest::Listen { path, enable }) => {
                self.registry.set_listening(client, &path, enable).ok()?;
                None
            }
            Ok(request) => self.answer(&request).ok(),
            Err(e) => Some(format!("{{\"error\":{:?}}}", e.to_string())),
        }
    }

    fn on_close(&self, client: ClientId) {
        self.closed.lock().push(client);
    }

    fn on_http(&self, line: &str) -> Result<String, QueryError> {
        self.answer(&QueryRequest::parse(line)?)
    }
}

fn loopback() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

#[tokio::test]
async fn test_http_get_over_real_socket() {
    let registry = Arc::new(ClientRegistry::new());
    let handler = Recorder::new(registry.clone());
    let server = QueryServer::bind(loopback(), (0, 0), registry, handler)
        .await
        .expect("Failed to start query server");

    let base_url = format!("http://{}", server.local_addr());
    let client = reqwest::Client::new();

    let response = client.get(format!("{base_url}/a")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["value"], serde_json::json!([1]));

    let response = client.get(format!("{base_url}/missing")).send().await.unwrap();
    assert_eq!(response.status(), 400);

    let response = client.get(format!("{base_url}/a?listen=maybe")).send().await.unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Bad request"));

    let response = client.post(format!("{base_url}/a")).send().await.unwrap();
    assert_eq!(response.status(), 405);

    server.shutdown().await;
}

#[tokio::test]
async fn test_websocket_listen_and_fan_out() {
    let registry = Arc::new(ClientRegistry::new());
    let handler = Recorder::new(registry.clone());
    let filter = routes(registry.clone(), handler.clone());

    let mut listener = warp::test::ws().handshake(filter.clone()).await.unwrap();
    let mut bystander = warp::test::ws().handshake(filter).await.unwrap();

    // Device info arrives first on every connection
    assert_eq!(listener.recv().await.unwrap().to_str().unwrap(), r#"{"osc_port":9000}"#);
    assert_eq!(bystander.recv().await.unwrap().to_str().unwrap(), r#"{"osc_port":9000}"#);
    assert_eq!(registry.client_count(), 2);

    let listener_id = handler.opened.lock()[0];
    listener.send_text("/a?listen=true").await;

    // The toggle produces no reply; wait until the registry sees it
    timeout(Duration::from_secs(1), async {
        while !registry.is_listening(listener_id, "/a") {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("listen toggle never applied");

    assert_eq!(registry.notify_listeners("/a", "changed"), 1);
    assert_eq!(listener.recv().await.unwrap().to_str().unwrap(), "changed");

    assert_eq!(registry.broadcast("added"), 2);
    assert_eq!(listener.recv().await.unwrap().to_str().unwrap(), "added");
    assert_eq!(bystander.recv().await.unwrap().to_str().unwrap(), "added");

    bystander.send_text("/a").await;
    let reply: serde_json::Value =
        serde_json::from_str(bystander.recv().await.unwrap().to_str().unwrap()).unwrap();
    assert_eq!(reply["full_path"], "/a");
}

#[tokio::test]
async fn test_disconnect_unregisters_client() {
    let registry = Arc::new(ClientRegistry::new());
    let handler = Recorder::new(registry.clone());
    let filter = routes(registry.clone(), handler.clone());

    let mut client = warp::test::ws().handshake(filter).await.unwrap();
    client.recv().await.unwrap();
    assert_eq!(registry.client_count(), 1);

    drop(client);

    timeout(Duration::from_secs(1), async {
        while registry.client_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("client never unregistered");

    assert_eq!(handler.closed.lock().len(), 1);
}

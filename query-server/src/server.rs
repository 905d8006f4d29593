//! WebSocket and HTTP server for query-protocol clients.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use query_protocol::{QueryError, ServerMessage};
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, info, warn};
use warp::http::StatusCode;
use warp::ws::{Message, WebSocket};
use warp::Filter;

use crate::error::{Result, ServerError};
use crate::router::{ClientId, ClientRegistry, ConnectionHandle};

/// Device-side logic behind the transport.
///
/// Calls arrive on the server's runtime threads and must not block on I/O.
pub trait RequestHandler: Send + Sync + 'static {
    /// Messages queued to a client right after it connects
    fn on_open(&self, client: ClientId) -> Vec<String>;

    /// Reply to one text frame, if any
    fn on_message(&self, client: ClientId, text: &str) -> Option<String>;

    fn on_close(&self, _client: ClientId) {}

    /// Answer a plain HTTP `GET <path>?<query>`
    fn on_http(&self, request_line: &str) -> std::result::Result<String, QueryError>;
}

/// Query-protocol server bound to one port.
///
/// Text frames on the WebSocket endpoint (any path) carry request lines;
/// replies and pushes are JSON text frames. Plain `GET` requests are
/// answered with the same handler.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use query_server::{ClientId, ClientRegistry, QueryServer, RequestHandler};
/// use query_protocol::QueryError;
///
/// struct Echo;
///
/// impl RequestHandler for Echo {
///     fn on_open(&self, _client: ClientId) -> Vec<String> {
///         vec![r#"{"osc_port":9997}"#.to_string()]
///     }
///     fn on_message(&self, _client: ClientId, text: &str) -> Option<String> {
///         Some(text.to_string())
///     }
///     fn on_http(&self, line: &str) -> Result<String, QueryError> {
///         Ok(line.to_string())
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let registry = Arc::new(ClientRegistry::new());
///     let server = QueryServer::bind("127.0.0.1".parse().unwrap(), (5678, 5778), registry, Arc::new(Echo))
///         .await
///         .expect("Failed to start query server");
///     println!("Listening on {}", server.local_addr());
///     server.shutdown().await;
/// }
/// ```
pub struct QueryServer {
    local_addr: SocketAddr,
    registry: Arc<ClientRegistry>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl QueryServer {
    /// Bind the first free port in `port_range` and start serving.
    ///
    /// A range of `(0, 0)` lets the OS pick an ephemeral port. Returns once
    /// the listener is bound.
    pub async fn bind(
        bind_address: IpAddr,
        port_range: (u16, u16),
        registry: Arc<ClientRegistry>,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<SocketAddr>>();

        let server_handle = Self::start_server(
            bind_address,
            port_range,
            routes(registry.clone(), handler),
            shutdown_rx,
            ready_tx,
        );

        let local_addr = ready_rx
            .await
            .map_err(|_| ServerError::StartupFailed("server task exited before binding".to_string()))??;

        Ok(Self {
            local_addr,
            registry,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Stop accepting connections and wait for the server task
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
        info!("Query server on {} stopped", self.local_addr);
    }

    fn start_server<F>(
        bind_address: IpAddr,
        (start, end): (u16, u16),
        routes: F,
        shutdown_rx: oneshot::Receiver<()>,
        ready_tx: oneshot::Sender<Result<SocketAddr>>,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Filter + Clone + Send + Sync + 'static,
        F::Extract: warp::Reply,
    {
        tokio::spawn(async move {
            let shutdown = Arc::new(Notify::new());

            let mut bound = None;
            for port in start..=end {
                let signal = {
                    let shutdown = shutdown.clone();
                    async move { shutdown.notified().await }
                };
                match warp::serve(routes.clone())
                    .try_bind_with_graceful_shutdown(SocketAddr::new(bind_address, port), signal)
                {
                    Ok(server) => {
                        bound = Some(server);
                        break;
                    }
                    Err(e) => debug!("Port {} unavailable: {}", port, e),
                }
            }

            let Some((addr, server)) = bound else {
                let _ = ready_tx.send(Err(ServerError::NoAvailablePort(start, end)));
                return;
            };

            tokio::spawn(async move {
                let _ = shutdown_rx.await;
                shutdown.notify_one();
            });

            info!("Query server listening on {}", addr);
            let _ = ready_tx.send(Ok(addr));
            server.await;
        })
    }
}

/// The WebSocket and HTTP routes, exposed for in-process testing
pub fn routes(
    registry: Arc<ClientRegistry>,
    handler: Arc<dyn RequestHandler>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone {
    let ws_route = {
        let handler = handler.clone();
        warp::ws().map(move |ws: warp::ws::Ws| {
            let registry = registry.clone();
            let handler = handler.clone();
            ws.on_upgrade(move |socket| client_connection(socket, registry, handler))
        })
    };

    let http_route = warp::get()
        .and(warp::path::full())
        .and(warp::query::raw().or(warp::any().map(String::new)).unify())
        .map(move |path: warp::path::FullPath, query: String| {
            let line = if query.is_empty() {
                path.as_str().to_string()
            } else {
                format!("{}?{}", path.as_str(), query)
            };
            let (body, status) = match handler.on_http(&line) {
                Ok(body) => (body, StatusCode::OK),
                Err(e) => {
                    let status = if e.is_client_error() {
                        StatusCode::BAD_REQUEST
                    } else {
                        StatusCode::INTERNAL_SERVER_ERROR
                    };
                    debug!("HTTP query {:?} failed: {}", line, e);
                    (ServerMessage::Error(e.to_string()).to_json_string(), status)
                }
            };
            warp::reply::with_status(
                warp::reply::with_header(body, "content-type", "application/json"),
                status,
            )
        });

    ws_route.or(http_route).recover(handle_rejection)
}

/// Drive one WebSocket connection until it closes
async fn client_connection(socket: WebSocket, registry: Arc<ClientRegistry>, handler: Arc<dyn RequestHandler>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let connection = Arc::new(ConnectionHandle::new(tx));
    let id = connection.id();
    registry.register(&connection);
    info!("Query client {} connected", id);

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = ws_tx.send(Message::text(text)).await {
                debug!("Write to query client failed: {}", e);
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    for text in handler.on_open(id) {
        connection.send(text);
    }

    while let Some(frame) = ws_rx.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Query client {} socket error: {}", id, e);
                break;
            }
        };
        if frame.is_close() {
            break;
        }
        let Ok(text) = frame.to_str() else {
            continue;
        };
        if let Some(reply) = handler.on_message(id, text) {
            connection.send(reply);
        }
    }

    handler.on_close(id);
    registry.unregister(id);
    drop(connection);
    let _ = writer.await;
    info!("Query client {} disconnected", id);
}

/// Handle rejections and convert them to HTTP responses.
async fn handle_rejection(err: warp::Rejection) -> std::result::Result<impl warp::Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(warp::reply::with_status(
        ServerMessage::Error(message.to_string()).to_json_string(),
        code,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    struct Echo;

    impl RequestHandler for Echo {
        fn on_open(&self, _client: ClientId) -> Vec<String> {
            vec![r#"{"osc_port":1}"#.to_string()]
        }

        fn on_message(&self, _client: ClientId, text: &str) -> Option<String> {
            Some(format!("echo:{text}"))
        }

        fn on_http(&self, line: &str) -> std::result::Result<String, QueryError> {
            if line.contains("bad") {
                Err(QueryError::BadRequest(line.to_string()))
            } else {
                Ok(format!("{{\"line\":{line:?}}}"))
            }
        }
    }

    fn loopback() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[tokio::test]
    async fn test_bind_ephemeral_and_shutdown() {
        let server = QueryServer::bind(loopback(), (0, 0), Arc::new(ClientRegistry::new()), Arc::new(Echo))
            .await
            .unwrap();
        assert_ne!(server.port(), 0);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_occupied_range_fails() {
        let listener = std::net::TcpListener::bind((loopback(), 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let result =
            QueryServer::bind(loopback(), (port, port), Arc::new(ClientRegistry::new()), Arc::new(Echo)).await;
        assert!(matches!(result, Err(ServerError::NoAvailablePort(p, q)) if p == port && q == port));
    }

    #[tokio::test]
    async fn test_websocket_open_and_echo() {
        let registry = Arc::new(ClientRegistry::new());
        let filter = routes(registry.clone(), Arc::new(Echo));

        let mut client = warp::test::ws().path("/").handshake(filter).await.unwrap();

        let hello = client.recv().await.unwrap();
        assert_eq!(hello.to_str().unwrap(), r#"{"osc_port":1}"#);
        assert_eq!(registry.client_count(), 1);

        client.send_text("/a?value").await;
        let reply = client.recv().await.unwrap();
        assert_eq!(reply.to_str().unwrap(), "echo:/a?value");
    }

    #[tokio::test]
    async fn test_http_status_codes() {
        let filter = routes(Arc::new(ClientRegistry::new()), Arc::new(Echo));

        let ok = warp::test::request().path("/a/b?value").reply(&filter).await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(ok.body(), r#"{"line":"/a/b?value"}"#);

        let bad = warp::test::request().path("/bad").reply(&filter).await;
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }
}

//! Background worker thread for the query transport
//!
//! Spawns a thread with its own tokio runtime hosting the async
//! [`QueryServer`], while devices keep a fully synchronous API.

use std::net::{IpAddr, SocketAddr};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use query_server::{ClientRegistry, QueryServer, RequestHandler};
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::error::{DeviceError, Result};

/// Handle to the running worker
///
/// Dropping the handle shuts the server down and joins the thread.
pub struct QueryWorker {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl QueryWorker {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop the server and wait for the worker thread
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Query worker thread panicked");
            }
        }
    }
}

impl Drop for QueryWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn the worker and block until the server is bound
pub fn spawn_query_worker(
    bind_address: IpAddr,
    port_range: (u16, u16),
    registry: Arc<ClientRegistry>,
    handler: Arc<dyn RequestHandler>,
) -> Result<QueryWorker> {
    let (ready_tx, ready_rx) = mpsc::channel::<Result<SocketAddr>>();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let handle = thread::Builder::new()
        .name("query-worker".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = ready_tx.send(Err(DeviceError::WorkerStartup(format!(
                        "failed to create tokio runtime: {e}"
                    ))));
                    return;
                }
            };

            rt.block_on(run_server(bind_address, port_range, registry, handler, ready_tx, shutdown_rx));
        })
        .map_err(|e| DeviceError::WorkerStartup(e.to_string()))?;

    let local_addr = match ready_rx.recv() {
        Ok(Ok(addr)) => addr,
        Ok(Err(e)) => {
            let _ = handle.join();
            return Err(e);
        }
        Err(_) => {
            let _ = handle.join();
            return Err(DeviceError::WorkerStartup("worker exited before binding".to_string()));
        }
    };

    Ok(QueryWorker {
        local_addr,
        shutdown_tx: Some(shutdown_tx),
        handle: Some(handle),
    })
}

async fn run_server(
    bind_address: IpAddr,
    port_range: (u16, u16),
    registry: Arc<ClientRegistry>,
    handler: Arc<dyn RequestHandler>,
    ready_tx: mpsc::Sender<Result<SocketAddr>>,
    shutdown_rx: oneshot::Receiver<()>,
) {
    let server = match QueryServer::bind(bind_address, port_range, registry, handler).await {
        Ok(server) => server,
        Err(e) => {
            let _ = ready_tx.send(Err(e.into()));
            return;
        }
    };

    info!("Query worker started on {}", server.local_addr());
    let _ = ready_tx.send(Ok(server.local_addr()));

    // Either an explicit shutdown or the handle being dropped
    let _ = shutdown_rx.await;
    server.shutdown().await;
    info!("Query worker shut down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_protocol::QueryError;
    use query_server::ClientId;
    use std::net::Ipv4Addr;

    struct Fixed;

    impl RequestHandler for Fixed {
        fn on_open(&self, _client: ClientId) -> Vec<String> {
            Vec::new()
        }

        fn on_message(&self, _client: ClientId, _text: &str) -> Option<String> {
            None
        }

        fn on_http(&self, _line: &str) -> std::result::Result<String, QueryError> {
            Ok("{}".to_string())
        }
    }

    #[test]
    fn test_worker_binds_and_stops() {
        let registry = Arc::new(ClientRegistry::new());
        let mut worker =
            spawn_query_worker(IpAddr::V4(Ipv4Addr::LOCALHOST), (0, 0), registry, Arc::new(Fixed)).unwrap();

        assert_ne!(worker.port(), 0);
        assert!(std::net::TcpStream::connect(worker.local_addr()).is_ok());

        worker.shutdown();
        worker.shutdown();
    }

    #[test]
    fn test_worker_reports_bind_failure() {
        let taken = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = spawn_query_worker(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            (port, port),
            Arc::new(ClientRegistry::new()),
            Arc::new(Fixed),
        );
        assert!(matches!(
            result,
            Err(DeviceError::Server(query_server::ServerError::NoAvailablePort(_, _)))
        ));
    }
}

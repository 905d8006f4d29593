//! Connected query clients and their listened paths.
//!
//! The registry only holds weak references to connections: a connection's
//! task owns its [`ConnectionHandle`], so a client whose socket died is
//! detected as expired and pruned the next time anything is fanned out.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use param_map::address;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, ServerError};

/// Identifier of one connected client
pub type ClientId = Uuid;

/// Outbound side of one client connection.
///
/// Text queued here is written to the socket in order.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ClientId,
    outbound: mpsc::UnboundedSender<String>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh id
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            outbound,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Queue `text` for the client; `false` if the connection is gone
    pub fn send(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }
}

/// One registered peer: a weak connection plus its listened paths
#[derive(Debug)]
struct RemoteClient {
    connection: Weak<ConnectionHandle>,
    listened: HashSet<String>,
}

impl RemoteClient {
    fn listens_to(&self, destination: &str) -> bool {
        self.listened.iter().any(|path| address::is_descendant(destination, path))
    }
}

/// Registry of connected clients.
///
/// Connection open/close and listen toggles are serialized by one lock,
/// independent of the parameter map's lock.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, RemoteClient>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly opened connection
    pub fn register(&self, connection: &Arc<ConnectionHandle>) {
        let client = RemoteClient {
            connection: Arc::downgrade(connection),
            listened: HashSet::new(),
        };
        self.clients.write().insert(connection.id(), client);
        debug!("Registered query client {}", connection.id());
    }

    /// Forget a closed connection
    pub fn unregister(&self, id: ClientId) -> bool {
        let removed = self.clients.write().remove(&id).is_some();
        if removed {
            debug!("Unregistered query client {}", id);
        }
        removed
    }

    /// Enable or disable pushes on `path` for client `id`
    pub fn set_listening(&self, id: ClientId, path: &str, enable: bool) -> Result<()> {
        let mut clients = self.clients.write();
        let client = clients.get_mut(&id).ok_or(ServerError::UnknownClient(id))?;
        if enable {
            client.listened.insert(path.to_string());
        } else {
            client.listened.remove(path);
        }
        Ok(())
    }

    pub fn is_listening(&self, id: ClientId, path: &str) -> bool {
        self.clients
            .read()
            .get(&id)
            .is_some_and(|client| client.listened.contains(path))
    }

    /// Drop listened paths that start with a removed `destination`
    pub fn forget_path(&self, destination: &str) {
        for client in self.clients.write().values_mut() {
            client
                .listened
                .retain(|path| !path.starts_with(destination));
        }
    }

    /// Queue `text` for every live client; returns the number reached
    pub fn broadcast(&self, text: &str) -> usize {
        self.deliver(text, |_| true)
    }

    /// Queue `text` for clients listening to `destination` or an ancestor
    pub fn notify_listeners(&self, destination: &str, text: &str) -> usize {
        self.deliver(text, |client| client.listens_to(destination))
    }

    /// Queue `text` for one client
    pub fn send_to(&self, id: ClientId, text: String) -> Result<()> {
        let connection = self
            .clients
            .read()
            .get(&id)
            .and_then(|client| client.connection.upgrade())
            .ok_or(ServerError::UnknownClient(id))?;
        if connection.send(text) {
            Ok(())
        } else {
            Err(ServerError::UnknownClient(id))
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Remove clients whose connection is gone
    pub fn prune(&self) -> usize {
        let mut clients = self.clients.write();
        let before = clients.len();
        clients.retain(|_, client| client.connection.strong_count() > 0);
        before - clients.len()
    }

    fn deliver(&self, text: &str, wanted: impl Fn(&RemoteClient) -> bool) -> usize {
        // Upgrade under the read lock, send after releasing it
        let (targets, expired): (Vec<_>, Vec<_>) = {
            let clients = self.clients.read();
            clients
                .iter()
                .filter(|(_, client)| wanted(*client))
                .map(|(id, client)| (*id, client.connection.upgrade()))
                .partition(|(_, connection)| connection.is_some())
        };

        let mut delivered = 0;
        for connection in targets.into_iter().filter_map(|(_, c)| c) {
            if connection.send(text.to_string()) {
                delivered += 1;
            }
        }

        if !expired.is_empty() {
            let mut clients = self.clients.write();
            for (id, _) in expired {
                debug!("Pruning expired query client {}", id);
                clients.remove(&id);
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(registry: &ClientRegistry) -> (Arc<ConnectionHandle>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(ConnectionHandle::new(tx));
        registry.register(&handle);
        (handle, rx)
    }

    #[test]
    fn test_listener_only_notification() {
        let registry = ClientRegistry::new();
        let (a, mut a_rx) = connect(&registry);
        let (_b, mut b_rx) = connect(&registry);

        registry.set_listening(a.id(), "/x", true).unwrap();

        assert_eq!(registry.notify_listeners("/x", "changed"), 1);
        assert_eq!(a_rx.try_recv().unwrap(), "changed");
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn test_listening_covers_descendants() {
        let registry = ClientRegistry::new();
        let (a, mut a_rx) = connect(&registry);
        registry.set_listening(a.id(), "/synth", true).unwrap();

        assert_eq!(registry.notify_listeners("/synth/freq", "m"), 1);
        assert_eq!(registry.notify_listeners("/synthesis", "m"), 0);
        assert_eq!(a_rx.try_recv().unwrap(), "m");
    }

    #[test]
    fn test_unknown_client_listen_fails() {
        let registry = ClientRegistry::new();
        let err = registry.set_listening(Uuid::new_v4(), "/x", true).unwrap_err();
        assert!(matches!(err, ServerError::UnknownClient(_)));
    }

    #[test]
    fn test_expired_clients_pruned_on_fan_out() {
        let registry = ClientRegistry::new();
        let (a, _a_rx) = connect(&registry);
        let (b, mut b_rx) = connect(&registry);
        registry.set_listening(a.id(), "/", true).unwrap();
        registry.set_listening(b.id(), "/", true).unwrap();

        drop(a);
        assert_eq!(registry.broadcast("hello"), 1);
        assert_eq!(registry.client_count(), 1);
        assert_eq!(tokio_test::block_on(b_rx.recv()).as_deref(), Some("hello"));
    }

    #[test]
    fn test_disable_and_forget_path() {
        let registry = ClientRegistry::new();
        let (a, _rx) = connect(&registry);

        registry.set_listening(a.id(), "/a/b", true).unwrap();
        registry.set_listening(a.id(), "/c", true).unwrap();
        registry.set_listening(a.id(), "/ab", true).unwrap();
        registry.forget_path("/a");
        assert!(!registry.is_listening(a.id(), "/a/b"));
        assert!(!registry.is_listening(a.id(), "/ab"));
        assert!(registry.is_listening(a.id(), "/c"));

        registry.set_listening(a.id(), "/c", false).unwrap();
        assert!(!registry.is_listening(a.id(), "/c"));
        assert!(registry.unregister(a.id()));
        assert!(!registry.unregister(a.id()));
    }
}

//! Mirror of a device reached over the query protocol
//!
//! A [`RemoteDevice`] sends request lines through a [`QueryTransport`] and
//! applies every inbound message to its own map. Replies carry no request
//! id, so outstanding requests are matched to reply documents in FIFO
//! order. The peer answers every request exactly once (listen toggles get
//! an ack) and the transport must deliver one connection's messages in
//! order.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use control_protocol::rosc::OscMessage;
use control_protocol::{values_to_args, OscSink};
use param_map::{address, Attribute, LockedParameterMap, MapError, Parameter, ParameterMap, ParameterPatch, Variant};
use parking_lot::{Mutex, RwLock};
use query_protocol::{document_to_map, full_path, patch_from_node, QueryError, QueryRequest, ServerMessage};
use query_server::{ClientId, ClientRegistry, ConnectionHandle, RequestHandler};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::callbacks::CallbackRegistry;
use crate::completion::Completion;
use crate::config::DeviceConfig;
use crate::error::{DeviceError, Result};
use crate::event::{ChangeFeed, ChangeKind};
use crate::iter::ChangeIterator;
use crate::local::LocalDevice;
use crate::udp::UdpOscSender;

/// Outbound half of a query-protocol connection
pub trait QueryTransport: Send + Sync {
    /// Send one request line
    fn send(&self, request_line: &str) -> Result<()>;

    /// Close the connection; later sends fail
    fn close(&self) {}
}

/// Request awaiting a reply document
enum Pending {
    Namespace { path: String, completion: Completion },
    Attributes { path: String, completion: Completion },
    Listen { path: String, completion: Completion },
}

impl Pending {
    fn completion(&self) -> &Completion {
        match self {
            Pending::Namespace { completion, .. }
            | Pending::Attributes { completion, .. }
            | Pending::Listen { completion, .. } => completion,
        }
    }

    fn path(&self) -> &str {
        match self {
            Pending::Namespace { path, .. } | Pending::Attributes { path, .. } | Pending::Listen { path, .. } => path,
        }
    }
}

/// Device mirroring a peer's tree over the query protocol
///
/// # Example
///
/// ```rust
/// use paramtree::{DeviceConfig, LocalDevice, LoopbackTransport, RemoteDevice};
/// use paramtree::param_map::{Parameter, Variant};
///
/// let local = LocalDevice::new(DeviceConfig::loopback()).unwrap();
/// local.add(Parameter::new("/gain").with_values(vec![Variant::Float(0.5)])).unwrap();
///
/// let remote = RemoteDevice::new(DeviceConfig::loopback()).unwrap();
/// LoopbackTransport::connect(&local, &remote);
/// remote.refresh_blocking().unwrap();
///
/// assert_eq!(remote.get("/gain").unwrap().values, vec![Variant::Float(0.5)]);
/// ```
pub struct RemoteDevice {
    shared: Arc<RemoteShared>,
}

struct RemoteShared {
    config: DeviceConfig,
    map: LockedParameterMap,
    transport: RwLock<Option<Arc<dyn QueryTransport>>>,
    pending: Mutex<VecDeque<Pending>>,
    refresh: Mutex<Option<Completion>>,
    peer_osc_port: Mutex<Option<u16>>,
    osc_sink: Arc<dyn OscSink>,
    callbacks: CallbackRegistry,
    feed: ChangeFeed,
}

impl RemoteDevice {
    /// Create a mirror that sends value pushes from an ephemeral UDP port
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let sink = UdpOscSender::bind(config.bind_address)?;
        Self::with_osc_sink(config, Arc::new(sink))
    }

    /// Create a mirror sending value pushes through `sink`
    pub fn with_osc_sink(config: DeviceConfig, sink: Arc<dyn OscSink>) -> Result<Self> {
        config.validate()?;
        let shared = RemoteShared {
            peer_osc_port: Mutex::new(config.remote_osc_port),
            config,
            map: LockedParameterMap::new(),
            transport: RwLock::new(None),
            pending: Mutex::new(VecDeque::new()),
            refresh: Mutex::new(None),
            osc_sink: sink,
            callbacks: CallbackRegistry::new(),
            feed: ChangeFeed::default(),
        };
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Use `transport` for requests, closing any previous one
    pub fn connect(&self, transport: Arc<dyn QueryTransport>) {
        if let Some(previous) = self.shared.transport.write().replace(transport) {
            previous.close();
        }
        info!("Remote device {} connected", self.shared.config.name);
    }

    /// Close the transport and fail every outstanding request
    pub fn disconnect(&self) {
        let transport = self.shared.transport.write().take();
        if let Some(transport) = transport {
            transport.close();
        }
        for pending in self.shared.pending.lock().drain(..) {
            pending.completion().complete();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.transport.read().is_some()
    }

    pub fn map(&self) -> &LockedParameterMap {
        &self.shared.map
    }

    pub fn get(&self, path: &str) -> Option<Parameter> {
        let path = address::normalize(path).ok()?;
        self.shared.map.get(&path)
    }

    pub fn on_change<F>(&self, path: &str, callback: F) -> Result<()>
    where
        F: Fn(&Parameter) + Send + Sync + 'static,
    {
        self.shared.callbacks.add(address::normalize(path)?, callback);
        Ok(())
    }

    pub fn changes(&self) -> ChangeIterator {
        self.shared.feed.subscribe()
    }

    /// Request the whole namespace
    ///
    /// While a refresh is outstanding, further calls return the same handle.
    pub fn refresh(&self) -> Result<Completion> {
        let mut refresh = self.shared.refresh.lock();
        if let Some(running) = refresh.as_ref().filter(|c| !c.is_complete()) {
            debug!("Refresh already pending, sharing its completion");
            return Ok(running.clone());
        }

        let completion = Completion::new();
        let request = QueryRequest::Namespace {
            path: address::ROOT.to_string(),
        };
        self.shared.request(
            Pending::Namespace {
                path: address::ROOT.to_string(),
                completion: completion.clone(),
            },
            &request.to_line(),
        )?;
        *refresh = Some(completion.clone());
        Ok(completion)
    }

    /// Refresh and wait up to the configured request timeout
    pub fn refresh_blocking(&self) -> Result<()> {
        self.refresh()?.wait_timeout(self.shared.config.request_timeout)
    }

    /// Request the subtree at `path` and merge it into the mirror
    pub fn refresh_path(&self, path: &str) -> Result<Completion> {
        let path = address::normalize(path)?;
        let completion = Completion::new();
        let line = QueryRequest::Namespace { path: path.clone() }.to_line();
        self.shared.request(
            Pending::Namespace {
                path,
                completion: completion.clone(),
            },
            &line,
        )?;
        Ok(completion)
    }

    /// Request selected attributes of `path`
    pub fn query_attributes(&self, path: &str, attributes: &[Attribute]) -> Result<Completion> {
        let path = address::normalize(path)?;
        let completion = Completion::new();
        let line = QueryRequest::Attributes {
            path: path.clone(),
            attributes: attributes.to_vec(),
        }
        .to_line();
        self.shared.request(
            Pending::Attributes {
                path,
                completion: completion.clone(),
            },
            &line,
        )?;
        Ok(completion)
    }

    /// Ask the peer to push changes of `path` and beneath
    ///
    /// The completion fires once the peer acknowledges or rejects the toggle.
    pub fn listen(&self, path: &str, enable: bool) -> Result<Completion> {
        let path = address::normalize(path)?;
        if enable && !self.shared.map.has_node(&path) {
            return Err(MapError::PathNotFound(path).into());
        }
        let completion = Completion::new();
        let line = QueryRequest::Listen {
            path: path.clone(),
            enable,
        }
        .to_line();
        self.shared.request(
            Pending::Listen {
                path,
                completion: completion.clone(),
            },
            &line,
        )?;
        Ok(completion)
    }

    /// Write `values` locally and forward them to the peer
    ///
    /// Fails with `AccessDenied` unless the mirrored access allows writing.
    pub fn set(&self, path: &str, values: Vec<Variant>) -> Result<()> {
        let path = address::normalize(path)?;
        let parameter = self
            .shared
            .map
            .get(&path)
            .ok_or_else(|| MapError::PathNotFound(path.clone()))?;
        if !parameter.access.can_write() {
            return Err(DeviceError::AccessDenied(path));
        }
        let target = self
            .shared
            .peer_osc_addr()
            .ok_or_else(|| DeviceError::NotConnected("peer control port unknown".to_string()))?;

        let (updated, changed) = self
            .shared
            .map
            .update_attributes(&path, &ParameterPatch::new().values(values))
            .ok_or_else(|| MapError::PathNotFound(path.clone()))?;

        self.shared.osc_sink.send_message(
            target,
            OscMessage {
                addr: path,
                args: values_to_args(&updated.values),
            },
        )?;

        if changed {
            self.shared.announce(&updated, ChangeKind::Changed);
        }
        Ok(())
    }

    /// Apply one inbound text message
    pub fn handle_message(&self, text: &str) -> Result<()> {
        self.shared.handle_message(text)
    }

    /// Number of requests still awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Control-protocol address of the peer, once known
    pub fn peer_osc_addr(&self) -> Option<SocketAddr> {
        self.shared.peer_osc_addr()
    }
}

impl Drop for RemoteDevice {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl RemoteShared {
    fn transport(&self) -> Result<Arc<dyn QueryTransport>> {
        self.transport
            .read()
            .clone()
            .ok_or_else(|| DeviceError::NotConnected("no query transport".to_string()))
    }

    fn peer_osc_addr(&self) -> Option<SocketAddr> {
        let port = (*self.peer_osc_port.lock()).or(self.config.remote_osc_port)?;
        Some(SocketAddr::new(self.config.remote_host, port))
    }

    /// Send `line` and queue `pending` once it is out
    ///
    /// The queue stays locked across the send so that queue order always
    /// matches wire order. Transports only enqueue and never re-enter here.
    fn request(&self, pending: Pending, line: &str) -> Result<()> {
        let transport = self.transport()?;
        let mut queue = self.pending.lock();
        transport.send(line)?;
        queue.push_back(pending);
        Ok(())
    }

    fn announce(&self, parameter: &Parameter, kind: ChangeKind) {
        self.callbacks.invoke(parameter);
        self.feed.emit(&parameter.destination, kind);
    }

    fn handle_message(&self, text: &str) -> Result<()> {
        match ServerMessage::parse(text)? {
            ServerMessage::DeviceInfo(info) => {
                debug!("Peer control port is {}", info.osc_port);
                *self.peer_osc_port.lock() = Some(info.osc_port);
            }
            ServerMessage::PathAdded(document) => {
                let parameter = parameter_from_document(&document)?;
                self.map.upsert(parameter.clone());
                self.announce(&parameter, ChangeKind::Added);
            }
            ServerMessage::PathRemoved(path) => {
                let path = address::normalize(&path)?;
                for destination in self.map.remove(&path) {
                    self.feed.emit(&destination, ChangeKind::Removed);
                }
            }
            ServerMessage::AttributesChanged(document) => {
                let node = as_node(&document)?;
                let destination = full_path(node)?;
                let parameter = self.apply_node(&destination, node)?;
                self.announce(&parameter, ChangeKind::Changed);
            }
            ServerMessage::Error(message) => {
                let failed = self.pending.lock().pop_front();
                match failed {
                    Some(pending) => {
                        warn!("Request for {} failed: {}", pending.path(), message);
                        pending.completion().complete();
                    }
                    None => warn!("Peer reported: {}", message),
                }
            }
            ServerMessage::Document(document) => {
                let next = self.pending.lock().pop_front();
                match next {
                    None => debug!("Ignoring unsolicited document"),
                    Some(Pending::Namespace { path, completion }) => {
                        let result = self.apply_namespace(&path, &document);
                        completion.complete();
                        result?;
                    }
                    Some(Pending::Attributes { path, completion }) => {
                        let result = as_node(&document).and_then(|node| self.apply_node(&path, node));
                        completion.complete();
                        let parameter = result?;
                        self.announce(&parameter, ChangeKind::Changed);
                    }
                    Some(Pending::Listen { path, completion }) => {
                        debug!("Listen toggle on {} acknowledged", path);
                        completion.complete();
                    }
                }
            }
        }
        Ok(())
    }

    /// Replace the mirror at `path` with the subtree in `document`
    fn apply_namespace(&self, path: &str, document: &Value) -> Result<()> {
        let mut incoming = ParameterMap::new();
        let count = document_to_map(document, &mut incoming)?;
        let subtree = incoming.filter(path);

        if address::is_root(path) {
            self.map.reset(incoming);
        } else {
            self.map.write(|map| {
                map.remove(path);
                map.merge(subtree.clone());
            });
        }
        info!("Mirrored {} parameters under {}", count, path);

        for parameter in subtree.iter() {
            self.callbacks.invoke(parameter);
        }
        self.feed.emit(path, ChangeKind::Changed);
        Ok(())
    }

    /// Patch (or create) the mirrored parameter at `destination`
    fn apply_node(&self, destination: &str, node: &Map<String, Value>) -> Result<Parameter> {
        let existing = self.map.get(destination);
        let patch = patch_from_node(node, existing.as_ref())?;

        let parameter = match self.map.update_attributes(destination, &patch) {
            Some((parameter, _)) => parameter,
            None => {
                let mut parameter = Parameter::new(destination);
                parameter.apply(&patch);
                self.map.upsert(parameter.clone());
                parameter
            }
        };
        Ok(parameter)
    }
}

fn as_node(document: &Value) -> Result<&Map<String, Value>> {
    document
        .as_object()
        .ok_or_else(|| QueryError::InvalidInput(format!("expected a node object, got {document}")).into())
}

fn parameter_from_document(document: &Value) -> Result<Parameter> {
    Ok(query_protocol::parameter_from_node(as_node(document)?)?)
}

// ============================================================================
// In-process transport
// ============================================================================

/// Transport wiring a [`RemoteDevice`] straight to a [`LocalDevice`]
///
/// It registers as a regular client of the local device, so listen
/// subscriptions and change fan-out behave as over a socket. A pump thread
/// delivers queued messages to the remote device in order.
pub struct LoopbackTransport {
    client: ClientId,
    connection: Mutex<Option<Arc<ConnectionHandle>>>,
    registry: Arc<ClientRegistry>,
    handler: Arc<dyn RequestHandler>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackTransport {
    /// Connect `remote` to `local` and deliver the device-info greeting
    pub fn connect(local: &LocalDevice, remote: &RemoteDevice) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let connection = Arc::new(ConnectionHandle::new(tx));
        let registry = local.clients().clone();
        let handler = local.query_handler();
        registry.register(&connection);

        let target = remote.shared.clone();
        let pump = thread::Builder::new()
            .name("loopback-pump".to_string())
            .spawn(move || {
                while let Some(text) = rx.blocking_recv() {
                    if let Err(e) = target.handle_message(&text) {
                        warn!("Loopback message rejected: {}", e);
                    }
                }
            });
        let pump = match pump {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to start loopback pump: {}", e);
                None
            }
        };

        for text in handler.on_open(connection.id()) {
            connection.send(text);
        }

        let transport = Arc::new(Self {
            client: connection.id(),
            connection: Mutex::new(Some(connection)),
            registry,
            handler,
            pump: Mutex::new(pump),
        });
        remote.connect(transport.clone());
        transport
    }

    /// Registry id of this connection on the local device
    pub fn client_id(&self) -> ClientId {
        self.client
    }
}

impl QueryTransport for LoopbackTransport {
    fn send(&self, request_line: &str) -> Result<()> {
        let connection = self.connection.lock();
        let connection = connection
            .as_ref()
            .ok_or_else(|| DeviceError::NotConnected("loopback closed".to_string()))?;

        if let Some(reply) = self.handler.on_message(self.client, request_line) {
            connection.send(reply);
        }
        Ok(())
    }

    fn close(&self) {
        if let Some(connection) = self.connection.lock().take() {
            self.handler.on_close(self.client);
            self.registry.unregister(self.client);
            drop(connection);
        }
        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            // The pump may be the thread closing us
            if pump.thread().id() != thread::current().id() && pump.join().is_err() {
                warn!("Loopback pump panicked");
            }
        }
    }
}

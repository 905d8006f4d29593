//! The authoritative device
//!
//! A [`LocalDevice`] owns the parameter map that remote observers mirror.
//! Application mutations go through the device so that, once the write
//! commits, callbacks run, change events are emitted and query and Minuit
//! clients are notified. Inbound control-protocol pushes are type-checked
//! against the stored parameter and dropped whole on mismatch.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use control_protocol::minuit::is_action;
use control_protocol::rosc::OscMessage;
use control_protocol::{apply_args, osc_type_tags, ConversionPolicy, ControlError, MinuitResponder, OscHandler, OscSink};
use param_map::{address, type_tags_compatible, LockedParameterMap, MapError, Parameter, ParameterPatch, Variant};
use parking_lot::{Mutex, RwLock};
use query_protocol::{
    attribute_query, map_to_document, parameter_to_document, DeviceInfo, QueryError, QueryRequest, ServerMessage,
};
use query_server::{ClientId, ClientRegistry, RequestHandler};
use tracing::{debug, info, trace, warn};

use crate::callbacks::CallbackRegistry;
use crate::config::{DeviceConfig, FanOutPolicy};
use crate::error::Result;
use crate::event::{ChangeFeed, ChangeKind};
use crate::iter::ChangeIterator;
use crate::udp::{spawn_udp_receiver, UdpReceiver};
use crate::worker::{spawn_query_worker, QueryWorker};

/// Device holding the authoritative parameter tree
///
/// # Example
///
/// ```rust
/// use paramtree::{DeviceConfig, LocalDevice};
/// use paramtree::param_map::{Access, Parameter, Variant};
///
/// let device = LocalDevice::new(DeviceConfig::new("synth")).unwrap();
/// device
///     .add(Parameter::new("/osc1/freq").with_values(vec![Variant::Float(440.0)]).with_access(Access::Both))
///     .unwrap();
///
/// device.set_values("/osc1/freq", vec![Variant::Float(220.0)]).unwrap();
/// assert_eq!(device.get("/osc1/freq").unwrap().values, vec![Variant::Float(220.0)]);
/// ```
pub struct LocalDevice {
    shared: Arc<LocalShared>,
    services: Mutex<Services>,
}

#[derive(Default)]
struct Services {
    udp: Option<UdpReceiver>,
    query: Option<QueryWorker>,
}

/// State reachable from the transport threads
struct LocalShared {
    config: DeviceConfig,
    map: LockedParameterMap,
    clients: Arc<ClientRegistry>,
    minuit: MinuitResponder,
    callbacks: CallbackRegistry,
    feed: ChangeFeed,
    osc_sink: RwLock<Option<Arc<dyn OscSink>>>,
    osc_port: AtomicU16,
}

impl LocalDevice {
    /// Create a device with an empty tree; nothing is bound until [`serve`](Self::serve)
    pub fn new(config: DeviceConfig) -> Result<Self> {
        config.validate()?;
        let map = LockedParameterMap::new();

        let shared = LocalShared {
            minuit: MinuitResponder::new(config.name.clone(), map.clone()),
            osc_port: AtomicU16::new(config.osc_port),
            map,
            clients: Arc::new(ClientRegistry::new()),
            callbacks: CallbackRegistry::new(),
            feed: ChangeFeed::default(),
            osc_sink: RwLock::new(None),
            config,
        };

        Ok(Self {
            shared: Arc::new(shared),
            services: Mutex::new(Services::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.shared.config
    }

    /// The underlying map
    ///
    /// Writing through this handle bypasses callbacks and notifications.
    pub fn map(&self) -> &LockedParameterMap {
        &self.shared.map
    }

    /// Connected query clients
    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.shared.clients
    }

    /// Handler answering query-protocol traffic for this device
    pub fn query_handler(&self) -> Arc<dyn RequestHandler> {
        self.shared.clone()
    }

    /// Handler answering control-protocol traffic for this device
    pub fn osc_handler(&self) -> Arc<dyn OscHandler> {
        self.shared.clone()
    }

    /// Control-protocol port announced to query clients
    pub fn osc_port(&self) -> u16 {
        self.shared.osc_port.load(Ordering::SeqCst)
    }

    /// Address of the running control-protocol socket
    pub fn osc_addr(&self) -> Option<SocketAddr> {
        self.services.lock().udp.as_ref().map(UdpReceiver::local_addr)
    }

    /// Address of the running query server
    pub fn query_addr(&self) -> Option<SocketAddr> {
        self.services.lock().query.as_ref().map(QueryWorker::local_addr)
    }

    /// Sink for Minuit listen pushes when not serving over UDP
    pub fn set_osc_sink(&self, sink: Arc<dyn OscSink>) {
        *self.shared.osc_sink.write() = Some(sink);
    }

    /// Start the UDP receiver and the query server
    ///
    /// Calling again while running does nothing.
    pub fn serve(&self) -> Result<()> {
        let mut services = self.services.lock();
        let config = &self.shared.config;

        if services.udp.is_none() {
            let receiver = spawn_udp_receiver(
                SocketAddr::new(config.bind_address, config.osc_port),
                self.shared.clone(),
            )?;
            self.shared
                .osc_port
                .store(receiver.local_addr().port(), Ordering::SeqCst);
            *self.shared.osc_sink.write() = Some(Arc::new(receiver.sender()));
            services.udp = Some(receiver);
        }

        if services.query.is_none() {
            services.query = Some(spawn_query_worker(
                config.bind_address,
                config.query_port_range,
                self.shared.clients.clone(),
                self.shared.clone(),
            )?);
        }

        info!("Device {} serving", config.name);
        Ok(())
    }

    /// Stop both transports
    pub fn shutdown(&self) {
        let mut services = self.services.lock();
        if let Some(mut query) = services.query.take() {
            query.shutdown();
        }
        if let Some(mut udp) = services.udp.take() {
            udp.stop();
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Add a parameter if its destination is free
    ///
    /// Returns `false` without side effects when the destination exists.
    pub fn add(&self, mut parameter: Parameter) -> Result<bool> {
        parameter.destination = address::normalize(&parameter.destination)?;
        parameter.align_facets();

        if !self.shared.map.insert(parameter.clone()) {
            return Ok(false);
        }
        self.shared.announce_added(&parameter);
        Ok(true)
    }

    /// Replace the whole record at an existing destination
    pub fn replace(&self, mut parameter: Parameter) -> Result<bool> {
        parameter.destination = address::normalize(&parameter.destination)?;
        parameter.align_facets();

        if !self.shared.map.replace(parameter.clone()) {
            return Ok(false);
        }
        self.shared.announce_changed(&parameter);
        Ok(true)
    }

    /// Remove every destination starting with `path`; returns them in order
    pub fn remove(&self, path: &str) -> Result<Vec<String>> {
        let path = address::normalize(path)?;
        let removed = self.shared.map.remove(&path);
        if !removed.is_empty() {
            self.shared.announce_removed(&path, &removed);
        }
        Ok(removed)
    }

    /// Run `mutator` on the stored record and announce the result
    pub fn update<F>(&self, path: &str, mutator: F) -> Result<Parameter>
    where
        F: FnOnce(&mut Parameter),
    {
        let path = address::normalize(path)?;
        let updated = self
            .shared
            .map
            .update(&path, mutator)
            .ok_or_else(|| MapError::PathNotFound(path.clone()))?;
        self.shared.announce_changed(&updated);
        Ok(updated)
    }

    /// Apply `patch`; announces and returns `true` only if something changed
    pub fn update_attributes(&self, path: &str, patch: &ParameterPatch) -> Result<bool> {
        let path = address::normalize(path)?;
        let (updated, changed) = self
            .shared
            .map
            .update_attributes(&path, patch)
            .ok_or_else(|| MapError::PathNotFound(path.clone()))?;
        if changed {
            self.shared.announce_changed(&updated);
        }
        Ok(changed)
    }

    pub fn set_values(&self, path: &str, values: Vec<Variant>) -> Result<bool> {
        self.update_attributes(path, &ParameterPatch::new().values(values))
    }

    pub fn get(&self, path: &str) -> Option<Parameter> {
        let path = address::normalize(path).ok()?;
        self.shared.map.get(&path)
    }

    /// Register a callback for changes of the parameter at `path`
    pub fn on_change<F>(&self, path: &str, callback: F) -> Result<()>
    where
        F: Fn(&Parameter) + Send + Sync + 'static,
    {
        self.shared.callbacks.add(address::normalize(path)?, callback);
        Ok(())
    }

    /// Iterator over change events committed from now on
    pub fn changes(&self) -> ChangeIterator {
        self.shared.feed.subscribe()
    }

    // ========================================================================
    // Protocol entry points
    // ========================================================================

    /// Answer a query request line without a connection
    ///
    /// `listen` needs a connection and fails here.
    pub fn query(&self, line: &str) -> std::result::Result<String, QueryError> {
        self.shared.handle_query(None, line)
    }

    /// Apply one control-protocol value push
    ///
    /// Returns the updated parameter, or `None` when the repetition filter
    /// swallowed an unchanged value.
    pub fn apply_value_push(&self, message: &OscMessage) -> Result<Option<Parameter>> {
        self.shared.apply_value_push(message)
    }
}

impl Drop for LocalDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for LocalDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDevice")
            .field("name", &self.shared.config.name)
            .field("parameters", &self.shared.map.len())
            .field("clients", &self.shared.clients.client_count())
            .finish()
    }
}

// ============================================================================
// Notification fan-out
// ============================================================================

impl LocalShared {
    fn announce_added(&self, parameter: &Parameter) {
        debug!("Added {}", parameter.destination);
        self.callbacks.invoke(parameter);
        self.feed.emit(&parameter.destination, ChangeKind::Added);

        let text = ServerMessage::PathAdded(parameter_to_document(parameter)).to_json_string();
        self.clients.broadcast(&text);
    }

    fn announce_removed(&self, path: &str, removed: &[String]) {
        debug!("Removed {} ({} parameters)", path, removed.len());
        self.clients.forget_path(path);
        self.minuit.forget_path(path);
        for destination in removed {
            self.feed.emit(destination, ChangeKind::Removed);
        }

        let text = ServerMessage::PathRemoved(path.to_string()).to_json_string();
        self.clients.broadcast(&text);
    }

    fn announce_changed(&self, parameter: &Parameter) {
        self.callbacks.invoke(parameter);
        self.feed.emit(&parameter.destination, ChangeKind::Changed);

        let text = ServerMessage::AttributesChanged(parameter_to_document(parameter)).to_json_string();
        let reached = match self.config.fan_out {
            FanOutPolicy::Listeners => self.clients.notify_listeners(&parameter.destination, &text),
            FanOutPolicy::Broadcast => self.clients.broadcast(&text),
        };
        trace!("Change of {} sent to {} query clients", parameter.destination, reached);

        self.push_minuit_listeners(parameter);
    }

    fn push_minuit_listeners(&self, parameter: &Parameter) {
        let pushes = self.minuit.listen_pushes(parameter);
        if pushes.is_empty() {
            return;
        }
        let Some(sink) = self.osc_sink.read().clone() else {
            debug!("No control-protocol sink for listen pushes of {}", parameter.destination);
            return;
        };
        for (peer, message) in pushes {
            if let Err(e) = sink.send_message(peer, message) {
                warn!("Listen push to {} failed: {}", peer, e);
            }
        }
    }

    // ========================================================================
    // Query protocol
    // ========================================================================

    fn handle_query(&self, client: Option<ClientId>, line: &str) -> std::result::Result<String, QueryError> {
        match QueryRequest::parse(line)? {
            QueryRequest::Namespace { path } => {
                let document = self
                    .map
                    .read(|map| map.has_node(&path).then(|| map_to_document(map, &path)))
                    .ok_or(QueryError::PathNotFound(path))?;
                Ok(ServerMessage::Document(document).to_json_string())
            }
            QueryRequest::Attributes { path, attributes } => {
                let parameter = self.map.get(&path).ok_or(QueryError::PathNotFound(path))?;
                Ok(ServerMessage::Document(attribute_query(&parameter, &attributes)).to_json_string())
            }
            QueryRequest::Listen { path, enable } => {
                let client =
                    client.ok_or_else(|| QueryError::BadRequest("listen requires a WebSocket connection".to_string()))?;
                if enable && !self.map.has_node(&path) {
                    return Err(QueryError::PathNotFound(path));
                }
                self.clients
                    .set_listening(client, &path, enable)
                    .map_err(|e| QueryError::BadRequest(e.to_string()))?;
                debug!("Client {} listen {} = {}", client, path, enable);
                Ok(ServerMessage::listen_ack(enable).to_json_string())
            }
        }
    }

    // ========================================================================
    // Control protocol
    // ========================================================================

    fn apply_value_push(&self, message: &OscMessage) -> Result<Option<Parameter>> {
        let destination = address::normalize(&message.addr)?;
        let incoming = osc_type_tags(&message.args);

        let updated = self.map.write(|map| -> Result<Option<Parameter>> {
            let stored = map
                .get(&destination)
                .ok_or_else(|| MapError::PathNotFound(destination.clone()))?;

            let expected = stored.type_tags();
            if !type_tags_compatible(&expected, &incoming) {
                return Err(ControlError::TypeMismatch {
                    address: destination.clone(),
                    expected,
                    actual: incoming.clone(),
                }
                .into());
            }

            let mut values = stored.values.clone();
            apply_args(&mut values, &message.args, ConversionPolicy::Prechecked)?;
            let filter_repeats = stored.repetition_filter;

            let before = stored.values.clone();
            let updated = map
                .update(&destination, |p| {
                    p.values = values;
                    p.values = p.bounded_values();
                })
                .cloned();

            Ok(updated.filter(|p| !(filter_repeats && p.values == before)))
        })?;

        if let Some(parameter) = &updated {
            self.announce_changed(parameter);
        }
        Ok(updated)
    }
}

impl RequestHandler for LocalShared {
    fn on_open(&self, client: ClientId) -> Vec<String> {
        debug!("Query client {} opened", client);
        let info = DeviceInfo {
            osc_port: self.osc_port.load(Ordering::SeqCst),
        };
        vec![ServerMessage::DeviceInfo(info).to_json_string()]
    }

    fn on_message(&self, client: ClientId, text: &str) -> Option<String> {
        match self.handle_query(Some(client), text.trim()) {
            Ok(reply) => Some(reply),
            Err(e) => {
                debug!("Query {:?} from {} failed: {}", text, client, e);
                Some(ServerMessage::Error(e.to_string()).to_json_string())
            }
        }
    }

    fn on_close(&self, client: ClientId) {
        debug!("Query client {} closed", client);
    }

    fn on_http(&self, request_line: &str) -> std::result::Result<String, QueryError> {
        self.handle_query(None, request_line)
    }
}

impl OscHandler for LocalShared {
    fn handle(&self, peer: SocketAddr, message: OscMessage) -> Vec<OscMessage> {
        if is_action(&message.addr) {
            return self.minuit.respond(peer, &message).unwrap_or_else(|e| {
                debug!("Ignoring Minuit message {} from {}: {}", message.addr, peer, e);
                Vec::new()
            });
        }

        if let Err(e) = self.apply_value_push(&message) {
            debug!("Dropped control message {} from {}: {}", message.addr, peer, e);
        }
        Vec::new()
    }
}

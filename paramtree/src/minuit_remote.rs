//! Mirror of a device reached over Minuit
//!
//! Minuit has no bulk dump: a refresh walks the tree one namespace request
//! per node, then asks for every attribute a data node advertises. The
//! refresh completes once no request is outstanding.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use control_protocol::minuit::{self, is_action, Command, NamespaceAnswer, NodeKind, Operation};
use control_protocol::rosc::{OscMessage, OscType};
use control_protocol::{values_to_args, MinuitAction, MinuitAddress, MinuitAttribute, OscHandler, OscSink};
use param_map::{address, LockedParameterMap, MapError, Parameter, ParameterPatch, Variant};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::callbacks::CallbackRegistry;
use crate::completion::Completion;
use crate::config::DeviceConfig;
use crate::error::{DeviceError, Result};
use crate::event::{ChangeFeed, ChangeKind};
use crate::iter::ChangeIterator;
use crate::udp::{spawn_udp_receiver, UdpReceiver};

/// Outstanding request, keyed the way its answer names it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PendingKey {
    Namespace(String),
    Get(String),
}

/// Device mirroring a Minuit peer's tree
pub struct MinuitRemoteDevice {
    shared: Arc<MinuitShared>,
    receiver: Mutex<Option<UdpReceiver>>,
}

struct MinuitShared {
    config: DeviceConfig,
    peer: SocketAddr,
    map: LockedParameterMap,
    sink: RwLock<Option<Arc<dyn OscSink>>>,
    pending: Mutex<HashSet<PendingKey>>,
    refresh: Mutex<Option<Completion>>,
    callbacks: CallbackRegistry,
    feed: ChangeFeed,
}

impl MinuitRemoteDevice {
    /// Bind an ephemeral UDP port and talk to `peer` from it
    pub fn connect(config: DeviceConfig, peer: SocketAddr) -> Result<Self> {
        let device = Self::unattached(config, peer)?;
        let receiver = spawn_udp_receiver(
            SocketAddr::new(device.shared.config.bind_address, 0),
            device.shared.clone(),
        )?;
        *device.shared.sink.write() = Some(Arc::new(receiver.sender()));
        *device.receiver.lock() = Some(receiver);

        info!("Minuit mirror {} talking to {}", device.shared.config.name, peer);
        Ok(device)
    }

    /// Send through `sink`; answers are fed through [`Self::osc_handler`]
    pub fn with_sink(config: DeviceConfig, peer: SocketAddr, sink: Arc<dyn OscSink>) -> Result<Self> {
        let device = Self::unattached(config, peer)?;
        *device.shared.sink.write() = Some(sink);
        Ok(device)
    }

    fn unattached(config: DeviceConfig, peer: SocketAddr) -> Result<Self> {
        config.validate()?;
        let shared = MinuitShared {
            config,
            peer,
            map: LockedParameterMap::new(),
            sink: RwLock::new(None),
            pending: Mutex::new(HashSet::new()),
            refresh: Mutex::new(None),
            callbacks: CallbackRegistry::new(),
            feed: ChangeFeed::default(),
        };
        Ok(Self {
            shared: Arc::new(shared),
            receiver: Mutex::new(None),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.shared.peer
    }

    /// Address answers should be sent to, when bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.receiver.lock().as_ref().map(UdpReceiver::local_addr)
    }

    pub fn osc_handler(&self) -> Arc<dyn OscHandler> {
        self.shared.clone()
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

    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Walk the peer's namespace from the root
    ///
    /// The mirror is emptied first. While a walk is running, further calls
    /// return the same handle.
    pub fn refresh(&self) -> Result<Completion> {
        let mut refresh = self.shared.refresh.lock();
        if let Some(running) = refresh.as_ref().filter(|c| !c.is_complete()) {
            return Ok(running.clone());
        }

        let dropped = self.shared.map.write(|map| {
            let dropped: Vec<String> = map
                .destinations()
                .filter(|d| !address::is_root(d))
                .map(str::to_string)
                .collect();
            map.clear();
            dropped
        });
        for destination in dropped {
            self.shared.feed.emit(&destination, ChangeKind::Removed);
        }
        self.shared.pending.lock().clear();

        let completion = Completion::new();
        *refresh = Some(completion.clone());
        drop(refresh);

        if let Err(e) = self.shared.request_namespace(address::ROOT) {
            self.shared.pending.lock().clear();
            completion.complete();
            return Err(e);
        }
        Ok(completion)
    }

    /// Refresh and wait up to the configured request timeout
    pub fn refresh_blocking(&self) -> Result<()> {
        self.refresh()?.wait_timeout(self.shared.config.request_timeout)
    }

    /// Ask for one attribute of `path`
    pub fn request_attribute(&self, path: &str, attribute: MinuitAttribute) -> Result<()> {
        let path = address::normalize(path)?;
        self.shared.request_get(MinuitAddress::new(path, Some(attribute)))
    }

    /// Write `values` locally and push them to the peer
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

        let (updated, changed) = self
            .shared
            .map
            .update_attributes(&path, &ParameterPatch::new().values(values))
            .ok_or_else(|| MapError::PathNotFound(path.clone()))?;
        self.shared.send(OscMessage {
            addr: path,
            args: values_to_args(&updated.values),
        })?;

        if changed {
            self.shared.announce(&updated, ChangeKind::Changed);
        }
        Ok(())
    }

    /// Stop the receive thread; later requests fail
    pub fn disconnect(&self) {
        if let Some(mut receiver) = self.receiver.lock().take() {
            receiver.stop();
        }
        *self.shared.sink.write() = None;
        self.shared.pending.lock().clear();
        self.shared.finish_refresh();
    }
}

impl Drop for MinuitRemoteDevice {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl MinuitShared {
    fn send(&self, message: OscMessage) -> Result<()> {
        let sink = self
            .sink
            .read()
            .clone()
            .ok_or_else(|| DeviceError::NotConnected(format!("no route to {}", self.peer)))?;
        sink.send_message(self.peer, message)?;
        Ok(())
    }

    fn track(&self, key: PendingKey, message: OscMessage) -> Result<()> {
        self.pending.lock().insert(key.clone());
        if let Err(e) = self.send(message) {
            self.pending.lock().remove(&key);
            return Err(e);
        }
        Ok(())
    }

    fn request_namespace(&self, path: &str) -> Result<()> {
        let target = MinuitAddress::new(path, None);
        let message = minuit::request(&self.config.name, Operation::Namespace, &target);
        self.track(PendingKey::Namespace(path.to_string()), message)
    }

    fn request_get(&self, target: MinuitAddress) -> Result<()> {
        let message = minuit::request(&self.config.name, Operation::Get, &target);
        self.track(PendingKey::Get(target.to_string()), message)
    }

    fn announce(&self, parameter: &Parameter, kind: ChangeKind) {
        self.callbacks.invoke(parameter);
        self.feed.emit(&parameter.destination, kind);
    }

    fn finish_refresh(&self) {
        if let Some(completion) = self.refresh.lock().as_ref() {
            completion.complete();
        }
    }

    fn on_answer(&self, action: &MinuitAction, args: &[OscType]) -> Result<()> {
        match action.operation {
            Operation::Namespace => self.on_namespace(NamespaceAnswer::from_args(args)?),
            Operation::Get => {
                let target = match args.first() {
                    Some(OscType::String(s)) => MinuitAddress::parse(s)?,
                    other => return Err(control_protocol::ControlError::MalformedAddress(format!("{other:?}")).into()),
                };
                let result = self.on_attribute(&target, &args[1..]);
                self.pending.lock().remove(&PendingKey::Get(target.to_string()));
                result
            }
            Operation::Listen => {
                debug!("Ignoring listen push {:?}", args.first());
                Ok(())
            }
        }
    }

    fn on_namespace(&self, answer: NamespaceAnswer) -> Result<()> {
        // Queue the follow-ups before settling this one so the set never
        // looks empty mid-walk
        let result = match answer.kind {
            NodeKind::Application | NodeKind::Container => answer
                .children
                .iter()
                .try_for_each(|child| self.request_namespace(&address::join(&answer.path, child))),
            NodeKind::Data => {
                let parameter = Parameter::new(answer.path.as_str());
                if self.map.insert(parameter.clone()) {
                    self.feed.emit(&parameter.destination, ChangeKind::Added);
                }
                answer
                    .attributes
                    .iter()
                    .try_for_each(|attribute| self.request_get(MinuitAddress::new(answer.path.clone(), Some(*attribute))))
            }
        };

        self.pending.lock().remove(&PendingKey::Namespace(answer.path));
        result
    }

    fn on_attribute(&self, target: &MinuitAddress, payload: &[OscType]) -> Result<()> {
        let attribute = target.attribute_or_value();
        let existing = self.map.get(&target.path).unwrap_or_else(|| Parameter::new(target.path.as_str()));
        let patch = minuit::patch_from_payload(attribute, payload, &existing)?;

        let updated = match self.map.update_attributes(&target.path, &patch) {
            Some((parameter, changed)) => changed.then_some((parameter, ChangeKind::Changed)),
            None => {
                let mut parameter = existing;
                parameter.apply(&patch);
                self.map.upsert(parameter.clone());
                Some((parameter, ChangeKind::Added))
            }
        };

        if let Some((parameter, kind)) = updated {
            debug!("{}:{} updated", target.path, attribute);
            self.announce(&parameter, kind);
        }
        Ok(())
    }

    fn on_error(&self, action: &MinuitAction, args: &[OscType]) {
        let Some(OscType::String(text)) = args.first() else {
            warn!("{} from peer without an address", action);
            return;
        };
        warn!("Peer failed {} {}", action, text);

        let mut pending = self.pending.lock();
        match action.operation {
            Operation::Namespace => {
                pending.remove(&PendingKey::Namespace(text.clone()));
            }
            Operation::Get => match MinuitAddress::parse(text) {
                Ok(target) if target.attribute.is_some() => {
                    pending.remove(&PendingKey::Get(target.to_string()));
                }
                Ok(target) => {
                    let prefix = format!("{}:", target.path);
                    pending.retain(|key| !matches!(key, PendingKey::Get(addr) if addr.starts_with(&prefix)));
                }
                Err(e) => debug!("Unparseable error address {}: {}", text, e),
            },
            Operation::Listen => {}
        }
    }
}

impl OscHandler for MinuitShared {
    fn handle(&self, peer: SocketAddr, message: OscMessage) -> Vec<OscMessage> {
        if !is_action(&message.addr) {
            debug!("Ignoring value push {} from {}", message.addr, peer);
            return Vec::new();
        }

        let action = match MinuitAction::parse(&message.addr) {
            Ok(action) => action,
            Err(e) => {
                debug!("Dropping message from {}: {}", peer, e);
                return Vec::new();
            }
        };

        match action.command {
            Command::Answer => {
                if let Err(e) = self.on_answer(&action, &message.args) {
                    warn!("Bad {} answer from {}: {}", action, peer, e);
                }
            }
            Command::Error => self.on_error(&action, &message.args),
            Command::Request => debug!("Mirror does not serve {} from {}", action, peer),
        }

        if self.pending.lock().is_empty() {
            self.finish_refresh();
        }
        Vec::new()
    }
}

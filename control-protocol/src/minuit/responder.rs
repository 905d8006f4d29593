//! Local-side handling of Minuit requests
//!
//! Answers `?namespace`, `?get` and `?listen` against a shared map and keeps
//! the per-peer listener registry used for `:listen` pushes.

use std::collections::HashMap;
use std::net::SocketAddr;

use param_map::{address, LockedParameterMap, Parameter};
use parking_lot::Mutex;
use rosc::{OscMessage, OscType};
use tracing::{debug, warn};

use crate::error::{ControlError, Result};
use crate::minuit::action::{Command, MinuitAction, Operation};
use crate::minuit::address::{AttributeSet, MinuitAddress, MinuitAttribute};
use crate::minuit::reply::{attribute_reply, error_reply, NamespaceAnswer, NodeKind};

/// Answers Minuit requests for one device
pub struct MinuitResponder {
    name: String,
    map: LockedParameterMap,
    listeners: Mutex<HashMap<(SocketAddr, String), AttributeSet>>,
}

impl MinuitResponder {
    pub fn new(name: impl Into<String>, map: LockedParameterMap) -> Self {
        Self {
            name: name.into(),
            map,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Device name used in answer actions
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle one Minuit message from `peer`
    ///
    /// Only requests are answered. Unknown get targets produce no reply.
    pub fn respond(&self, peer: SocketAddr, message: &OscMessage) -> Result<Vec<OscMessage>> {
        let action = MinuitAction::parse(&message.addr)?;
        if action.command != Command::Request {
            debug!("Ignoring {} from {}", action, peer);
            return Ok(Vec::new());
        }

        let target = match message.args.first() {
            Some(OscType::String(s)) => MinuitAddress::parse(s)?,
            other => {
                return Err(ControlError::MalformedAddress(format!("{other:?}")));
            }
        };

        let replies = match action.operation {
            Operation::Namespace => vec![self.namespace(&target.path)],
            Operation::Get => self.get(&target).into_iter().collect(),
            Operation::Listen => {
                let enable = listen_state(message.args.get(1))?;
                self.set_listening(peer, &target, enable);
                Vec::new()
            }
        };
        Ok(replies)
    }

    fn namespace(&self, path: &str) -> OscMessage {
        let (exists, children) = self
            .map
            .read(|map| (map.has_node(path), map.children_names(path)));

        if !exists {
            debug!("Namespace request for unknown path {}", path);
            return error_reply(&self.name, Operation::Namespace, path);
        }

        let answer = if address::is_root(path) || !children.is_empty() {
            NamespaceAnswer {
                path: path.to_string(),
                kind: if address::is_root(path) {
                    NodeKind::Application
                } else {
                    NodeKind::Container
                },
                children: children.into_iter().collect(),
                attributes: Vec::new(),
            }
        } else {
            NamespaceAnswer {
                path: path.to_string(),
                kind: NodeKind::Data,
                children: Vec::new(),
                attributes: MinuitAttribute::ALL.to_vec(),
            }
        };

        OscMessage {
            addr: MinuitAction::new(&self.name, Command::Answer, Operation::Namespace).to_string(),
            args: answer.to_args(),
        }
    }

    fn get(&self, target: &MinuitAddress) -> Option<OscMessage> {
        let Some(parameter) = self.map.get(&target.path) else {
            debug!("Get request for unknown path {}", target.path);
            return None;
        };
        Some(attribute_reply(
            &self.name,
            Operation::Get,
            &parameter,
            target.attribute_or_value(),
        ))
    }

    /// Toggle one attribute subscription of `peer`
    ///
    /// The registration disappears once no attribute remains.
    pub fn set_listening(&self, peer: SocketAddr, target: &MinuitAddress, enable: bool) {
        let attribute = target.attribute_or_value();
        let key = (peer, target.path.clone());
        let mut listeners = self.listeners.lock();

        if enable {
            listeners.entry(key).or_default().insert(attribute);
            debug!("{} listens to {}:{}", peer, target.path, attribute);
        } else if let Some(set) = listeners.get_mut(&key) {
            set.remove(attribute);
            if set.is_empty() {
                listeners.remove(&key);
            }
            debug!("{} stopped listening to {}:{}", peer, target.path, attribute);
        }
    }

    /// `:listen` messages for every peer listening to `parameter`
    pub fn listen_pushes(&self, parameter: &Parameter) -> Vec<(SocketAddr, OscMessage)> {
        let listeners = self.listeners.lock();
        listeners
            .iter()
            .filter(|((_, path), _)| *path == parameter.destination)
            .flat_map(|((peer, _), set)| {
                set.iter()
                    .map(|attribute| (*peer, attribute_reply(&self.name, Operation::Listen, parameter, attribute)))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Drop listeners whose path starts with a removed `destination`
    pub fn forget_path(&self, destination: &str) {
        self.listeners
            .lock()
            .retain(|(_, path), _| !path.starts_with(destination));
    }

    pub fn forget_peer(&self, peer: SocketAddr) {
        self.listeners.lock().retain(|(p, _), _| *p != peer);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

fn listen_state(arg: Option<&OscType>) -> Result<bool> {
    match arg {
        Some(OscType::String(s)) if s == "enable" => Ok(true),
        Some(OscType::String(s)) if s == "disable" => Ok(false),
        Some(OscType::Bool(b)) => Ok(*b),
        other => {
            warn!("Listen request with state {:?}", other);
            Err(ControlError::InvalidInput(format!("listen expects enable or disable, got {other:?}")))
        }
    }
}

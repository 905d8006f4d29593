//! Server-to-client messages
//!
//! Every text frame a device sends is one of these. Change notifications
//! always carry the full resulting attribute state, so applying them in
//! receipt order is idempotent.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{QueryError, Result};

const PATH_ADDED: &str = "path_added";
const PATH_REMOVED: &str = "path_removed";
const ATTRIBUTES_CHANGED: &str = "attributes_changed";
const ERROR: &str = "error";

/// Device information pushed on connection open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// UDP port accepting control-protocol traffic
    pub osc_port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    DeviceInfo(DeviceInfo),
    /// A node document for a newly added parameter
    PathAdded(Value),
    /// Root of a removed subtree
    PathRemoved(String),
    /// Flat node with `full_path` and the full attribute state
    AttributesChanged(Value),
    /// Reply to a request that failed
    Error(String),
    /// Namespace dump or attribute projection
    Document(Value),
}

impl ServerMessage {
    /// Reply acknowledging a listen toggle
    ///
    /// Replies carry no request id, so every request gets exactly one reply
    /// and the client can match them in order.
    pub fn listen_ack(enable: bool) -> Self {
        ServerMessage::Document(json!({ "listen": enable }))
    }

    pub fn to_json(&self) -> Value {
        match self {
            ServerMessage::DeviceInfo(info) => json!({ "osc_port": info.osc_port }),
            ServerMessage::PathAdded(doc) => json!({ PATH_ADDED: doc }),
            ServerMessage::PathRemoved(path) => json!({ PATH_REMOVED: path }),
            ServerMessage::AttributesChanged(doc) => json!({ ATTRIBUTES_CHANGED: doc }),
            ServerMessage::Error(text) => json!({ ERROR: text }),
            ServerMessage::Document(doc) => doc.clone(),
        }
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }

    /// Classify an inbound text frame
    ///
    /// Single-key objects whose key names a message kind are decoded as that
    /// kind; anything else is a reply document.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json(value)
    }

    pub fn from_json(value: Value) -> Result<Self> {
        let single_key = value
            .as_object()
            .filter(|o| o.len() == 1)
            .and_then(|o| o.iter().next())
            .map(|(k, v)| (k.clone(), v.clone()));

        let Some((key, inner)) = single_key else {
            return Ok(ServerMessage::Document(value));
        };

        let message = match key.as_str() {
            "osc_port" => ServerMessage::DeviceInfo(serde_json::from_value(value)?),
            PATH_ADDED => ServerMessage::PathAdded(inner),
            PATH_REMOVED => ServerMessage::PathRemoved(
                inner
                    .as_str()
                    .ok_or_else(|| QueryError::InvalidInput(format!("{PATH_REMOVED} must be a string")))?
                    .to_string(),
            ),
            ATTRIBUTES_CHANGED => ServerMessage::AttributesChanged(inner),
            ERROR => ServerMessage::Error(match inner {
                Value::String(s) => s,
                other => other.to_string(),
            }),
            _ => ServerMessage::Document(value),
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_shape() {
        let message = ServerMessage::DeviceInfo(DeviceInfo { osc_port: 9997 });
        assert_eq!(message.to_json_string(), r#"{"osc_port":9997}"#);
        assert_eq!(ServerMessage::parse(r#"{"osc_port":9997}"#).unwrap(), message);
    }

    #[test]
    fn test_change_messages() {
        let removed = ServerMessage::PathRemoved("/a/b".to_string());
        assert_eq!(removed.to_json(), json!({"path_removed": "/a/b"}));
        assert_eq!(ServerMessage::from_json(removed.to_json()).unwrap(), removed);

        let changed = ServerMessage::AttributesChanged(json!({"full_path": "/x", "value": [1]}));
        assert_eq!(ServerMessage::parse(&changed.to_json_string()).unwrap(), changed);
    }

    #[test]
    fn test_documents_pass_through() {
        let doc = json!({"description": "plop"});
        assert_eq!(ServerMessage::parse(&doc.to_string()).unwrap(), ServerMessage::Document(doc));

        let doc = json!({"full_path": "/", "access": 0});
        assert_eq!(ServerMessage::from_json(doc.clone()).unwrap(), ServerMessage::Document(doc));
    }

    #[test]
    fn test_listen_ack_is_a_document() {
        let ack = ServerMessage::listen_ack(true);
        assert_eq!(ack.to_json_string(), r#"{"listen":true}"#);
        assert_eq!(ServerMessage::parse(&ack.to_json_string()).unwrap(), ack);
    }

    #[test]
    fn test_error_reply() {
        let message = ServerMessage::parse(r#"{"error":"Bad request: x"}"#).unwrap();
        assert_eq!(message, ServerMessage::Error("Bad request: x".to_string()));
    }

    #[test]
    fn test_invalid_frames() {
        assert!(ServerMessage::parse("not json").is_err());
        assert!(ServerMessage::parse(r#"{"path_removed": 3}"#).is_err());
        assert!(ServerMessage::parse(r#"{"osc_port": "x"}"#).is_err());
    }
}

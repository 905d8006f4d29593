//! Packet encoding and decoding
//!
//! Bundles are flattened: handlers only ever see individual messages, in
//! bundle order.

use std::net::SocketAddr;

use rosc::{OscMessage, OscPacket, OscType};

use crate::error::{ControlError, Result};

/// Encode a single message
pub fn encode_message(addr: impl Into<String>, args: Vec<OscType>) -> Result<Vec<u8>> {
    encode_packet(&OscPacket::Message(OscMessage {
        addr: addr.into(),
        args,
    }))
}

pub fn encode_packet(packet: &OscPacket) -> Result<Vec<u8>> {
    rosc::encoder::encode(packet).map_err(|e| ControlError::Encode(e.to_string()))
}

/// Decode one datagram into its messages
pub fn decode_packet(datagram: &[u8]) -> Result<Vec<OscMessage>> {
    let (_, packet) = rosc::decoder::decode_udp(datagram).map_err(|e| ControlError::Decode(e.to_string()))?;
    let mut messages = Vec::new();
    flatten(packet, &mut messages);
    Ok(messages)
}

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(message) => out.push(message),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out);
            }
        }
    }
}

// ============================================================================
// Transport seams
// ============================================================================

/// Outbound datagram transport
pub trait OscSink: Send + Sync {
    fn send_to(&self, target: SocketAddr, packet: &OscPacket) -> Result<()>;

    fn send_message(&self, target: SocketAddr, message: OscMessage) -> Result<()> {
        self.send_to(target, &OscPacket::Message(message))
    }
}

/// Inbound message consumer
///
/// Returned messages are sent back to `peer`.
pub trait OscHandler: Send + Sync {
    fn handle(&self, peer: SocketAddr, message: OscMessage) -> Vec<OscMessage>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{OscBundle, OscTime};

    #[test]
    fn test_message_round_trip() {
        let bytes = encode_message("/da/da", vec![OscType::Int(43)]).unwrap();
        let messages = decode_packet(&bytes).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].addr, "/da/da");
        assert_eq!(messages[0].args, vec![OscType::Int(43)]);
    }

    #[test]
    fn test_bundle_is_flattened() {
        let bundle = OscPacket::Bundle(OscBundle {
            timetag: OscTime {
                seconds: 0,
                fractional: 1,
            },
            content: vec![
                OscPacket::Message(OscMessage {
                    addr: "/a".to_string(),
                    args: vec![OscType::Float(1.0)],
                }),
                OscPacket::Message(OscMessage {
                    addr: "/b".to_string(),
                    args: vec![],
                }),
            ],
        });
        let bytes = encode_packet(&bundle).unwrap();
        let addrs: Vec<String> = decode_packet(&bytes).unwrap().into_iter().map(|m| m.addr).collect();
        assert_eq!(addrs, vec!["/a", "/b"]);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(decode_packet(&[1, 2, 3]), Err(ControlError::Decode(_))));
    }
}

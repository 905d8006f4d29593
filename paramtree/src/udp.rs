//! UDP plumbing for the control protocol
//!
//! One socket per device: a dedicated thread receives datagrams on it and
//! hands every decoded message to an [`OscHandler`]; replies go back to the
//! sender from the same socket.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use control_protocol::rosc::{OscMessage, OscPacket};
use control_protocol::{decode_packet, encode_packet, OscHandler, OscSink};
use tracing::{debug, error, info, warn};

use crate::error::{DeviceError, Result};

/// Poll interval for the shutdown flag
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Largest datagram accepted
const MAX_DATAGRAM: usize = 65_536;

/// [`OscSink`] over a shared UDP socket
#[derive(Debug, Clone)]
pub struct UdpOscSender {
    socket: Arc<UdpSocket>,
}

impl UdpOscSender {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }

    /// Sender on a fresh ephemeral port of `address`
    pub fn bind(address: std::net::IpAddr) -> Result<Self> {
        Ok(Self::new(Arc::new(UdpSocket::bind((address, 0))?)))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl OscSink for UdpOscSender {
    fn send_to(&self, target: SocketAddr, packet: &OscPacket) -> control_protocol::Result<()> {
        let bytes = encode_packet(packet)?;
        self.socket.send_to(&bytes, target)?;
        Ok(())
    }
}

/// Handle to a running receive thread
///
/// Dropping the handle stops the thread.
pub struct UdpReceiver {
    local_addr: SocketAddr,
    sender: UdpOscSender,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl UdpReceiver {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sender sharing the receive socket
    pub fn sender(&self) -> UdpOscSender {
        self.sender.clone()
    }

    /// Stop the receive thread and wait for it
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("UDP receiver thread for {} panicked", self.local_addr);
            }
        }
    }
}

impl Drop for UdpReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bind `address` and start a receive thread feeding `handler`
pub fn spawn_udp_receiver(address: SocketAddr, handler: Arc<dyn OscHandler>) -> Result<UdpReceiver> {
    let socket = UdpSocket::bind(address)?;
    socket.set_read_timeout(Some(READ_TIMEOUT))?;
    let local_addr = socket.local_addr()?;
    let socket = Arc::new(socket);
    let sender = UdpOscSender::new(socket.clone());

    let shutdown = Arc::new(AtomicBool::new(false));
    let handle = {
        let shutdown = shutdown.clone();
        let sender = sender.clone();
        thread::Builder::new()
            .name(format!("osc-udp-{}", local_addr.port()))
            .spawn(move || receive_loop(&socket, &sender, handler.as_ref(), &shutdown))
            .map_err(|e| DeviceError::WorkerStartup(e.to_string()))?
    };

    info!("Control protocol listening on udp://{}", local_addr);
    Ok(UdpReceiver {
        local_addr,
        sender,
        shutdown,
        handle: Some(handle),
    })
}

fn receive_loop(socket: &UdpSocket, sender: &UdpOscSender, handler: &dyn OscHandler, shutdown: &AtomicBool) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    while !shutdown.load(Ordering::SeqCst) {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => continue,
            Err(e) => {
                warn!("UDP receive failed: {}", e);
                continue;
            }
        };

        let messages = match decode_packet(&buf[..len]) {
            Ok(messages) => messages,
            Err(e) => {
                debug!("Dropping undecodable datagram from {}: {}", peer, e);
                continue;
            }
        };

        for message in messages {
            for reply in handler.handle(peer, message) {
                send_reply(sender, peer, reply);
            }
        }
    }

    debug!("UDP receive loop stopped");
}

fn send_reply(sender: &UdpOscSender, peer: SocketAddr, reply: OscMessage) {
    if let Err(e) = sender.send_message(peer, reply) {
        warn!("Failed to reply to {}: {}", peer, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use control_protocol::rosc::OscType;
    use control_protocol::encode_message;
    use parking_lot::Mutex;
    use std::net::{IpAddr, Ipv4Addr};

    /// Records messages and echoes them back
    #[derive(Default)]
    struct Echo {
        seen: Mutex<Vec<OscMessage>>,
    }

    impl OscHandler for Echo {
        fn handle(&self, _peer: SocketAddr, message: OscMessage) -> Vec<OscMessage> {
            self.seen.lock().push(message.clone());
            vec![message]
        }
    }

    fn loopback() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[test]
    fn test_receive_and_reply() {
        let echo = Arc::new(Echo::default());
        let mut receiver = spawn_udp_receiver(loopback(), echo.clone()).unwrap();

        let client = UdpSocket::bind(loopback()).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let bytes = encode_message("/da/da", vec![OscType::Int(7)]).unwrap();
        client.send_to(&bytes, receiver.local_addr()).unwrap();

        let mut buf = [0u8; 1024];
        let (len, _) = client.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], bytes.as_slice());
        assert_eq!(echo.seen.lock()[0].addr, "/da/da");

        receiver.stop();
    }

    #[test]
    fn test_sender_reaches_socket() {
        let target = UdpSocket::bind(loopback()).unwrap();
        target.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let sender = UdpOscSender::bind(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        sender
            .send_message(
                target.local_addr().unwrap(),
                OscMessage {
                    addr: "/x".to_string(),
                    args: vec![OscType::Float(1.5)],
                },
            )
            .unwrap();

        let mut buf = [0u8; 1024];
        let (len, from) = target.recv_from(&mut buf).unwrap();
        assert_eq!(from, sender.local_addr().unwrap());
        let messages = decode_packet(&buf[..len]).unwrap();
        assert_eq!(messages[0].args, vec![OscType::Float(1.5)]);
    }
}

//! Configuration types for devices
//!
//! One struct covers local and remote devices: local devices read the bind
//! address and ports, remote devices the peer address and request timeout.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::error::{DeviceError, Result};

/// Which query clients receive attribute change notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanOutPolicy {
    /// Only clients listening to the changed path or an ancestor
    #[default]
    Listeners,
    /// Every connected client
    Broadcast,
}

/// Configuration for a device
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Device name used in Minuit actions
    /// Default: "paramtree"
    pub name: String,

    /// Address the UDP and query servers bind to
    /// Default: 0.0.0.0
    pub bind_address: IpAddr,

    /// UDP port for control-protocol traffic, 0 for ephemeral
    /// Default: 9997
    pub osc_port: u16,

    /// Port range searched for the WebSocket/HTTP server
    /// Default: (5678, 5778)
    pub query_port_range: (u16, u16),

    /// Change notification fan-out
    /// Default: Listeners
    pub fan_out: FanOutPolicy,

    /// Bounded wait for remote namespace walks and requests
    /// Default: 5 seconds
    pub request_timeout: Duration,

    /// Host of the peer a remote device mirrors
    /// Default: 127.0.0.1
    pub remote_host: IpAddr,

    /// Control-protocol port of the peer, if known before connecting
    /// Default: None (learned from the device-info message)
    pub remote_osc_port: Option<u16>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "paramtree".to_string(),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            osc_port: 9997,
            query_port_range: (5678, 5778),
            fan_out: FanOutPolicy::Listeners,
            request_timeout: Duration::from_secs(5),
            remote_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            remote_osc_port: None,
        }
    }
}

impl DeviceConfig {
    /// Default configuration under another device name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Loopback-only configuration on ephemeral ports with a short timeout
    pub fn loopback() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            osc_port: 0,
            query_port_range: (0, 0),
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    /// Configuration that pushes every change to every client
    pub fn broadcast() -> Self {
        Self {
            fan_out: FanOutPolicy::Broadcast,
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(DeviceError::Config("name must not be empty".to_string()));
        }

        if self.name.starts_with('/') || self.name.contains(['?', ':', '!']) {
            return Err(DeviceError::Config(format!(
                "name {:?} must not start with '/' or contain '?', ':' or '!'",
                self.name
            )));
        }

        let (start, end) = self.query_port_range;
        if start > end {
            return Err(DeviceError::Config(format!("query_port_range start {start} exceeds end {end}")));
        }

        if self.request_timeout.is_zero() {
            return Err(DeviceError::Config("request_timeout must be greater than zero".to_string()));
        }

        Ok(())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    pub fn with_osc_port(mut self, port: u16) -> Self {
        self.osc_port = port;
        self
    }

    pub fn with_query_port_range(mut self, start: u16, end: u16) -> Self {
        self.query_port_range = (start, end);
        self
    }

    pub fn with_fan_out(mut self, policy: FanOutPolicy) -> Self {
        self.fan_out = policy;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Peer a remote device mirrors
    pub fn with_remote(mut self, host: IpAddr, osc_port: Option<u16>) -> Self {
        self.remote_host = host;
        self.remote_osc_port = osc_port;
        self
    }
}

//! Synchronized Parameter Trees
//!
//! Publish a tree of typed parameters from one process and mirror it in
//! others. A [`LocalDevice`] owns its tree and serves it over two
//! transports; remote devices keep a mirror up to date.
//!
//! # Features
//!
//! - **Query Protocol**: JSON namespace and attribute queries over HTTP GET
//!   and WebSocket, with listen subscriptions and change pushes
//! - **Control Protocol**: OSC value pushes over UDP, plus Minuit
//!   namespace, get and listen requests
//! - **Mirrors**: [`RemoteDevice`] follows a peer over the query protocol,
//!   [`MinuitRemoteDevice`] walks a peer over Minuit
//! - **Change Delivery**: per-path callbacks and a blocking
//!   [`ChangeIterator`] for every device
//!
//! # Quick Start
//!
//! ```rust
//! use paramtree::{DeviceConfig, LocalDevice};
//! use paramtree::param_map::{Access, Parameter, Variant};
//!
//! let device = LocalDevice::new(DeviceConfig::loopback().with_name("synth")).unwrap();
//! device
//!     .add(
//!         Parameter::new("/osc1/freq")
//!             .with_values(vec![Variant::Float(440.0)])
//!             .with_access(Access::Both),
//!     )
//!     .unwrap();
//!
//! device.set_values("/osc1/freq", vec![Variant::Float(220.0)]).unwrap();
//! assert_eq!(device.get("/osc1/freq").unwrap().values, vec![Variant::Float(220.0)]);
//!
//! let reply = device.query("/osc1/freq?value").unwrap();
//! assert_eq!(reply, r#"{"value":[220.0]}"#);
//! ```
//!
//! # Architecture
//!
//! ```text
//! LocalDevice
//!     ├── LockedParameterMap      (the tree)
//!     ├── query worker thread     (tokio runtime → warp HTTP/WebSocket)
//!     └── UDP receive thread      (OSC values, Minuit requests)
//!
//! RemoteDevice        ── QueryTransport ──▶  LocalDevice
//! MinuitRemoteDevice  ──── UDP/Minuit ────▶  LocalDevice
//! ```

// Modules
pub mod callbacks;
pub mod completion;
pub mod config;
pub mod error;
pub mod event;
pub mod iter;
pub mod local;
pub mod logging;
pub mod minuit_remote;
pub mod remote;
pub mod udp;
pub mod worker;

// Re-exports - Public API
pub use callbacks::{Callback, CallbackRegistry};
pub use completion::Completion;
pub use config::{DeviceConfig, FanOutPolicy};
pub use error::{DeviceError, Result};
pub use event::{ChangeEvent, ChangeKind};
pub use iter::ChangeIterator;
pub use local::LocalDevice;
pub use logging::{init_logging, init_logging_from_env, LoggingError, LoggingMode};
pub use minuit_remote::MinuitRemoteDevice;
pub use remote::{LoopbackTransport, QueryTransport, RemoteDevice};
pub use udp::{spawn_udp_receiver, UdpOscSender, UdpReceiver};
pub use worker::{spawn_query_worker, QueryWorker};

// Building blocks
pub use control_protocol;
pub use param_map;
pub use query_protocol;
pub use query_server;

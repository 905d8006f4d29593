//! WebSocket and HTTP transport for the paramtree query protocol.
//!
//! This crate only moves text. It knows nothing about parameter trees:
//! request lines go to a [`RequestHandler`] supplied by the device, and the
//! [`ClientRegistry`] fans replies and notifications out to connections.
//!
//! # Overview
//!
//! - [`QueryServer`]: binds the first free port in a range and serves both
//!   WebSocket text frames and plain HTTP `GET` requests
//! - [`ClientRegistry`]: connected clients, their listened paths, and
//!   broadcast or listener-only delivery
//! - [`RequestHandler`]: the device-side hook invoked for every connection
//!   event and request
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use query_server::{ClientId, ClientRegistry, QueryServer, RequestHandler};
//! use query_protocol::QueryError;
//!
//! struct Nothing;
//!
//! impl RequestHandler for Nothing {
//!     fn on_open(&self, _client: ClientId) -> Vec<String> {
//!         Vec::new()
//!     }
//!     fn on_message(&self, _client: ClientId, _text: &str) -> Option<String> {
//!         None
//!     }
//!     fn on_http(&self, line: &str) -> Result<String, QueryError> {
//!         Err(QueryError::PathNotFound(line.to_string()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(ClientRegistry::new());
//!     let server = QueryServer::bind("0.0.0.0".parse().unwrap(), (5678, 5678), registry.clone(), Arc::new(Nothing))
//!         .await
//!         .expect("bind");
//!
//!     registry.broadcast(r#"{"path_added":{}}"#);
//!     server.shutdown().await;
//! }
//! ```

pub mod error;
pub mod router;
pub mod server;

pub use error::{Result, ServerError};
pub use router::{ClientId, ClientRegistry, ConnectionHandle};
pub use server::{routes, QueryServer, RequestHandler};

//! Query Protocol Codec
//!
//! Translates a [`ParameterMap`](param_map::ParameterMap) to and from nested
//! JSON namespace documents, parses request lines and frames the messages a
//! device pushes to its clients.
//!
//! # Quick Start
//!
//! ```rust
//! use param_map::{Access, ParameterMap, Parameter, Variant};
//! use query_protocol::{document_to_map, map_to_document, QueryRequest};
//!
//! let mut map = ParameterMap::new();
//! map.insert(Parameter::new("/synth/gain").with_values(vec![Variant::Float(0.5)]).with_access(Access::Both));
//!
//! let doc = map_to_document(&map, "/");
//! assert_eq!(doc["contents"]["synth"]["contents"]["gain"]["type"], "f");
//!
//! let mut mirror = ParameterMap::new();
//! document_to_map(&doc, &mut mirror).unwrap();
//! assert_eq!(mirror, map);
//!
//! let request = QueryRequest::parse("/synth/gain?value&access").unwrap();
//! assert_eq!(request.path(), "/synth/gain");
//! ```

pub mod document;
pub mod error;
pub mod message;
pub mod request;
pub mod value;

pub use document::{
    attribute_query, attribute_value, document_to_map, full_path, map_to_document, node_attributes,
    parameter_from_node, parameter_to_document, patch_from_node, CONTENTS,
};
pub use error::{QueryError, Result};
pub use message::{DeviceInfo, ServerMessage};
pub use request::QueryRequest;

//! Control Protocol Codec
//!
//! Binary OSC traffic for high-rate value pushes plus the Minuit
//! request/answer protocol used to walk and observe a remote namespace.
//!
//! # Features
//!
//! - **Type Tags**: [`osc_type_tags`] uses the same codes as
//!   [`param_map::Variant::type_tag`], so a message can be checked against a
//!   parameter's type string before it is decoded
//! - **Conversion Policies**: [`ConversionPolicy`] selects between coercing,
//!   ignoring, trusting or replacing when arguments meet stored values
//! - **Minuit**: action and address parsing, namespace/get/listen replies and
//!   a [`MinuitResponder`] with a per-peer listener registry
//!
//! # Quick Start
//!
//! ```rust
//! use control_protocol::{apply_args, decode_packet, encode_message, osc_type_tags, ConversionPolicy};
//! use param_map::Variant;
//! use rosc::OscType;
//!
//! let bytes = encode_message("/da/da", vec![OscType::Int(43)]).unwrap();
//! let message = decode_packet(&bytes).unwrap().remove(0);
//!
//! let mut values = vec![Variant::Int(42)];
//! assert_eq!(osc_type_tags(&message.args), param_map::type_tags(&values));
//! apply_args(&mut values, &message.args, ConversionPolicy::Prechecked).unwrap();
//! assert_eq!(values, vec![Variant::Int(43)]);
//! ```

pub mod codec;
pub mod convert;
pub mod error;
pub mod minuit;
pub mod tags;

pub use codec::{decode_packet, encode_message, encode_packet, OscHandler, OscSink};
pub use convert::{apply_args, args_to_values, osc_to_variant, values_to_args, variant_to_osc, ConversionPolicy};
pub use error::{ControlError, Result};
pub use minuit::{MinuitAction, MinuitAddress, MinuitAttribute, MinuitResponder};
pub use tags::osc_type_tags;

/// Re-exported so downstream crates share one `rosc` version
pub use rosc;

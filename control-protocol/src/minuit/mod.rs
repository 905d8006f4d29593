//! Minuit command protocol
//!
//! Actions are OSC addresses of the form `<device><?|:|!><operation>`; the
//! first argument is a `<path>[:<attribute>]` address.

pub mod action;
pub mod address;
pub mod reply;
pub mod responder;

pub use action::{is_action, Command, MinuitAction, Operation};
pub use address::{AttributeSet, MinuitAddress, MinuitAttribute};
pub use reply::{
    access_from_service, attribute_payload, attribute_reply, clipmode_from_text, clipmode_text, error_reply,
    listen_request, patch_from_payload, request, service_text, template_for_type, type_text, NamespaceAnswer,
    NodeKind,
};
pub use responder::MinuitResponder;

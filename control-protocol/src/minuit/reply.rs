//! Minuit message bodies
//!
//! Namespace answers list children and attributes between brace tokens:
//!
//! ```text
//! local:namespace /synth Container nodes={ freq wave } attributes={ }
//! local:namespace /synth/freq Data attributes={ value type service ... }
//! ```
//!
//! Get answers and listen pushes carry `<path>:<attribute>` followed by the
//! attribute payload.

use param_map::{Access, ClipMode, Parameter, ParameterPatch, Variant};
use rosc::{OscMessage, OscType};

use crate::convert::{apply_args, args_to_values, osc_to_variant, values_to_args, variant_to_osc, ConversionPolicy};
use crate::error::{ControlError, Result};
use crate::minuit::action::{Command, MinuitAction, Operation};
use crate::minuit::address::{MinuitAddress, MinuitAttribute};

const NODES_OPEN: &str = "nodes={";
const ATTRIBUTES_OPEN: &str = "attributes={";
const CLOSE: &str = "}";

pub fn message(action: &MinuitAction, args: Vec<OscType>) -> OscMessage {
    OscMessage {
        addr: action.to_string(),
        args,
    }
}

/// `<device>?<operation> <address>`
pub fn request(device: &str, operation: Operation, address: &MinuitAddress) -> OscMessage {
    message(
        &MinuitAction::new(device, Command::Request, operation),
        vec![OscType::String(address.to_string())],
    )
}

/// `<device>?listen <address> enable|disable`
pub fn listen_request(device: &str, address: &MinuitAddress, enable: bool) -> OscMessage {
    let state = if enable { "enable" } else { "disable" };
    message(
        &MinuitAction::new(device, Command::Request, Operation::Listen),
        vec![OscType::String(address.to_string()), OscType::String(state.to_string())],
    )
}

/// `<device>!<operation> <address>`
pub fn error_reply(device: &str, operation: Operation, address: &str) -> OscMessage {
    message(
        &MinuitAction::new(device, Command::Error, operation),
        vec![OscType::String(address.to_string())],
    )
}

/// `<device>:<operation> <path>:<attribute> <payload...>`
pub fn attribute_reply(
    device: &str,
    operation: Operation,
    parameter: &Parameter,
    attribute: MinuitAttribute,
) -> OscMessage {
    let address = MinuitAddress::new(parameter.destination.clone(), Some(attribute));
    let mut args = vec![OscType::String(address.to_string())];
    args.extend(attribute_payload(parameter, attribute));
    message(&MinuitAction::new(device, Command::Answer, operation), args)
}

// ============================================================================
// Namespace answers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Application,
    Container,
    Data,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Application => "Application",
            NodeKind::Container => "Container",
            NodeKind::Data => "Data",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "Application" => Some(NodeKind::Application),
            "Container" => Some(NodeKind::Container),
            "Data" => Some(NodeKind::Data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceAnswer {
    pub path: String,
    pub kind: NodeKind,
    pub children: Vec<String>,
    pub attributes: Vec<MinuitAttribute>,
}

impl NamespaceAnswer {
    pub fn to_args(&self) -> Vec<OscType> {
        let text = |s: &str| OscType::String(s.to_string());
        let mut args = vec![text(self.path.as_str()), text(self.kind.as_str())];

        if self.kind != NodeKind::Data {
            args.push(text(NODES_OPEN));
            args.extend(self.children.iter().map(|c| text(c.as_str())));
            args.push(text(CLOSE));
        }
        args.push(text(ATTRIBUTES_OPEN));
        args.extend(self.attributes.iter().map(|a| text(a.as_str())));
        args.push(text(CLOSE));
        args
    }

    pub fn from_args(args: &[OscType]) -> Result<Self> {
        let mut strings = args.iter().map(|arg| match arg {
            OscType::String(s) => Ok(s.as_str()),
            other => Err(ControlError::InvalidInput(format!("namespace answer token {other:?}"))),
        });

        let path = strings
            .next()
            .transpose()?
            .ok_or_else(|| ControlError::InvalidInput("empty namespace answer".to_string()))?;
        let path = MinuitAddress::parse(path)?.path;
        let kind = strings
            .next()
            .transpose()?
            .and_then(NodeKind::parse)
            .ok_or_else(|| ControlError::InvalidInput(format!("namespace answer for {path} has no node kind")))?;

        enum Section {
            Outside,
            Nodes,
            Attributes,
        }

        let mut section = Section::Outside;
        let mut children = Vec::new();
        let mut attributes = Vec::new();
        for token in strings {
            let token = token?;
            match (token, &section) {
                (NODES_OPEN, Section::Outside) => section = Section::Nodes,
                (ATTRIBUTES_OPEN, Section::Outside) => section = Section::Attributes,
                (CLOSE, _) => section = Section::Outside,
                (child, Section::Nodes) => children.push(child.to_string()),
                (attribute, Section::Attributes) => attributes.push(MinuitAttribute::from_token(attribute)?),
                (other, Section::Outside) => {
                    return Err(ControlError::InvalidInput(format!("unexpected namespace token {other:?}")));
                }
            }
        }

        Ok(Self {
            path,
            kind,
            children,
            attributes,
        })
    }
}

// ============================================================================
// Attribute payloads
// ============================================================================

/// Minuit type name of a value list
pub fn type_text(values: &[Variant]) -> &'static str {
    match values {
        [] => "none",
        [single] => match single {
            Variant::None => "none",
            Variant::Impulse => "impulse",
            Variant::Bool(_) => "boolean",
            Variant::Int(_) => "integer",
            Variant::Float(_) => "decimal",
            Variant::Char(_) => "char",
            Variant::String(_) => "string",
            Variant::Generic(_) => "generic",
            Variant::Tuple(_) => "array",
        },
        _ => "array",
    }
}

/// Default value for a Minuit type name; `None` when the name doesn't fix a tag
pub fn template_for_type(text: &str) -> Option<Variant> {
    let template = match text {
        "none" => Variant::None,
        "impulse" => Variant::Impulse,
        "boolean" => Variant::Bool(false),
        "integer" => Variant::Int(0),
        "decimal" => Variant::Float(0.0),
        "char" => Variant::Char('\0'),
        "string" => Variant::String(String::new()),
        "generic" => Variant::Generic(Vec::new()),
        _ => return None,
    };
    Some(template)
}

pub fn service_text(access: Access) -> &'static str {
    match access {
        Access::None => "none",
        Access::Get => "return",
        Access::Set => "message",
        Access::Both => "parameter",
    }
}

pub fn access_from_service(text: &str) -> Option<Access> {
    match text {
        "none" => Some(Access::None),
        "return" => Some(Access::Get),
        "message" => Some(Access::Set),
        "parameter" => Some(Access::Both),
        _ => None,
    }
}

pub fn clipmode_text(clipmode: ClipMode) -> &'static str {
    match clipmode {
        ClipMode::None => "none",
        ClipMode::Low => "low",
        ClipMode::High => "high",
        ClipMode::Both => "both",
    }
}

pub fn clipmode_from_text(text: &str) -> Option<ClipMode> {
    ClipMode::ALL.iter().copied().find(|c| clipmode_text(*c) == text)
}

/// Payload arguments answering `attribute` for `parameter`
pub fn attribute_payload(parameter: &Parameter, attribute: MinuitAttribute) -> Vec<OscType> {
    let text = |s: &str| OscType::String(s.to_string());
    match attribute {
        MinuitAttribute::Value => values_to_args(&parameter.values),
        MinuitAttribute::Type => vec![text(type_text(&parameter.values))],
        MinuitAttribute::Service => vec![text(service_text(parameter.access))],
        MinuitAttribute::Priority => vec![OscType::Int(0)],
        MinuitAttribute::RangeBounds => parameter
            .ranges
            .iter()
            .flat_map(|range| {
                let bound = |b: &Option<Variant>| b.as_ref().map(variant_to_osc).unwrap_or(OscType::Nil);
                [bound(&range.min), bound(&range.max)]
            })
            .collect(),
        MinuitAttribute::RangeClipMode => parameter.clipmodes.iter().map(|c| text(clipmode_text(*c))).collect(),
        MinuitAttribute::Description => vec![text(parameter.description.as_str())],
        MinuitAttribute::RepetitionFilter => vec![OscType::Int(i32::from(parameter.repetition_filter))],
    }
}

fn string_arg(args: &[OscType], attribute: MinuitAttribute) -> Result<&str> {
    match args.first() {
        Some(OscType::String(s)) => Ok(s),
        other => Err(ControlError::InvalidInput(format!("{attribute} expects a string, got {other:?}"))),
    }
}

/// Coerce `arg` to `template`'s tag, falling back to the wire tag
fn coerce(template: Option<&Variant>, arg: &OscType) -> Variant {
    if let Some(template) = template {
        let mut slot = vec![template.clone()];
        if apply_args(&mut slot, std::slice::from_ref(arg), ConversionPolicy::Convert).is_ok() {
            if let Some(value) = slot.pop() {
                return value;
            }
        }
    }
    osc_to_variant(arg)
}

/// Patch applying an answered attribute onto the mirrored `existing`
pub fn patch_from_payload(
    attribute: MinuitAttribute,
    args: &[OscType],
    existing: &Parameter,
) -> Result<ParameterPatch> {
    let patch = ParameterPatch::new();
    let patch = match attribute {
        MinuitAttribute::Value => {
            let mut values = existing.values.clone();
            let converted = values.len() == args.len()
                && apply_args(&mut values, args, ConversionPolicy::Convert).is_ok();
            if !converted {
                values = args_to_values(args);
            }
            patch.values(values)
        }
        MinuitAttribute::Type => {
            let text = string_arg(args, attribute)?;
            match (template_for_type(text), existing.values.as_slice()) {
                // "none" on an empty node is a container, not a value slot
                (Some(Variant::None), []) => patch,
                (Some(template), []) => patch.values(vec![template]),
                (Some(template), [current]) if current.kind() != template.kind() => {
                    let converted = coerce(Some(&template), &variant_to_osc(current));
                    let value = if converted.kind() == template.kind() {
                        converted
                    } else {
                        template
                    };
                    patch.values(vec![value])
                }
                _ => patch,
            }
        }
        MinuitAttribute::Service => {
            let text = string_arg(args, attribute)?;
            let access = access_from_service(text)
                .ok_or_else(|| ControlError::InvalidInput(format!("unknown service {text:?}")))?;
            patch.access(access)
        }
        MinuitAttribute::Priority => patch,
        MinuitAttribute::RangeBounds => {
            let ranges = args
                .chunks(2)
                .enumerate()
                .map(|(idx, pair)| {
                    let template = existing.values.get(idx);
                    let bound = |arg: Option<&OscType>| match arg {
                        None | Some(OscType::Nil) => None,
                        Some(arg) => Some(coerce(template, arg)),
                    };
                    let mut range = existing.ranges.get(idx).cloned().unwrap_or_default();
                    range.min = bound(pair.first());
                    range.max = bound(pair.get(1));
                    range
                })
                .collect();
            patch.ranges(ranges)
        }
        MinuitAttribute::RangeClipMode => {
            let clipmodes = args
                .iter()
                .map(|arg| match arg {
                    OscType::String(s) => clipmode_from_text(s)
                        .ok_or_else(|| ControlError::InvalidInput(format!("unknown clip mode {s:?}"))),
                    other => Err(ControlError::InvalidInput(format!("clip mode must be a string, got {other:?}"))),
                })
                .collect::<Result<Vec<_>>>()?;
            patch.clipmodes(clipmodes)
        }
        MinuitAttribute::Description => patch.description(string_arg(args, attribute)?),
        MinuitAttribute::RepetitionFilter => {
            let enabled = match args.first() {
                Some(OscType::Bool(b)) => *b,
                Some(OscType::Int(i)) => *i != 0,
                other => {
                    return Err(ControlError::InvalidInput(format!(
                        "repetitionFilter expects an int, got {other:?}"
                    )))
                }
            };
            patch.repetition_filter(enabled)
        }
    };
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use param_map::Range;

    fn freq() -> Parameter {
        Parameter::new("/synth/freq")
            .with_value(Variant::Float(440.0), Range::new(20.0f32, 20000.0f32), ClipMode::Both)
            .with_access(Access::Both)
            .with_description("frequency")
    }

    #[test]
    fn test_namespace_answer_round_trip() {
        let answer = NamespaceAnswer {
            path: "/synth".to_string(),
            kind: NodeKind::Container,
            children: vec!["freq".to_string(), "wave".to_string()],
            attributes: vec![],
        };
        let args = answer.to_args();
        assert_eq!(args[2], OscType::String("nodes={".to_string()));
        assert_eq!(NamespaceAnswer::from_args(&args).unwrap(), answer);

        let data = NamespaceAnswer {
            path: "/synth/freq".to_string(),
            kind: NodeKind::Data,
            children: vec![],
            attributes: MinuitAttribute::ALL.to_vec(),
        };
        assert_eq!(NamespaceAnswer::from_args(&data.to_args()).unwrap(), data);
    }

    #[test]
    fn test_get_reply_shape() {
        let reply = attribute_reply("local", Operation::Get, &freq(), MinuitAttribute::Value);
        assert_eq!(reply.addr, "local:get");
        assert_eq!(
            reply.args,
            vec![OscType::String("/synth/freq:value".to_string()), OscType::Float(440.0)]
        );
    }

    #[test]
    fn test_payload_texts() {
        let parameter = freq();
        assert_eq!(
            attribute_payload(&parameter, MinuitAttribute::Type),
            vec![OscType::String("decimal".to_string())]
        );
        assert_eq!(
            attribute_payload(&parameter, MinuitAttribute::Service),
            vec![OscType::String("parameter".to_string())]
        );
        assert_eq!(
            attribute_payload(&parameter, MinuitAttribute::RangeClipMode),
            vec![OscType::String("both".to_string())]
        );
        assert_eq!(
            attribute_payload(&parameter, MinuitAttribute::RangeBounds),
            vec![OscType::Float(20.0), OscType::Float(20000.0)]
        );
    }

    #[test]
    fn test_payloads_rebuild_parameter() {
        let source = freq();
        let mut mirror = Parameter::new("/synth/freq");
        for attribute in MinuitAttribute::ALL {
            let payload = attribute_payload(&source, *attribute);
            let patch = patch_from_payload(*attribute, &payload, &mirror).unwrap();
            mirror.apply(&patch);
        }
        assert_eq!(mirror, source);
    }

    #[test]
    fn test_type_converts_existing_value() {
        let mirror = Parameter::new("/x").with_values(vec![Variant::Float(3.0)]);
        let patch = patch_from_payload(
            MinuitAttribute::Type,
            &[OscType::String("integer".to_string())],
            &mirror,
        )
        .unwrap();
        assert_eq!(patch.values, Some(vec![Variant::Int(3)]));
    }

    #[test]
    fn test_bad_payloads() {
        let mirror = Parameter::new("/x");
        assert!(patch_from_payload(MinuitAttribute::Service, &[OscType::Int(1)], &mirror).is_err());
        assert!(patch_from_payload(
            MinuitAttribute::RangeClipMode,
            &[OscType::String("sideways".to_string())],
            &mirror
        )
        .is_err());
    }
}

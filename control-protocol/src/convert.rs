//! Applying OSC arguments onto stored values
//!
//! A stored value's tag decides how an incoming argument is read, except
//! under [`ConversionPolicy::Replace`] where tags come from the wire. The
//! four policies share one positional traversal:
//!
//! | Policy       | Mismatched argument                         |
//! |--------------|---------------------------------------------|
//! | `Convert`    | coerced to the stored tag, error if it can't |
//! | `Ignore`     | skipped, stored value kept                   |
//! | `Prechecked` | not expected; caller compared type tags      |
//! | `Replace`    | stored values discarded, tags inferred       |

use param_map::Variant;
use rosc::{OscArray, OscType};

use crate::error::{ControlError, Result};

/// How wire arguments are applied onto existing values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversionPolicy {
    /// Coerce to the stored tag; structural mismatches are errors
    #[default]
    Convert,
    /// Leave values whose tag doesn't match the argument untouched
    Ignore,
    /// Tags already verified equal; assign positionally
    Prechecked,
    /// Discard stored values and take tags from the wire
    Replace,
}

// ============================================================================
// Variant <-> OscType
// ============================================================================

/// Wire form of one value
pub fn variant_to_osc(value: &Variant) -> OscType {
    match value {
        Variant::None => OscType::Nil,
        Variant::Impulse => OscType::Inf,
        Variant::Bool(b) => OscType::Bool(*b),
        Variant::Int(i) => OscType::Int(*i),
        Variant::Float(f) => OscType::Float(*f),
        Variant::Char(c) => OscType::Char(*c),
        Variant::String(s) => OscType::String(s.clone()),
        Variant::Generic(bytes) => OscType::Blob(bytes.clone()),
        Variant::Tuple(items) => OscType::Array(OscArray {
            content: items.iter().map(variant_to_osc).collect(),
        }),
    }
}

pub fn values_to_args(values: &[Variant]) -> Vec<OscType> {
    values.iter().map(variant_to_osc).collect()
}

/// Value inferred purely from the wire type
///
/// Wide OSC types fold onto the closest tag: `h` becomes an int when it
/// fits and a float otherwise, `d` becomes a float, and time tags, colors
/// and MIDI messages become blobs of their raw bytes.
pub fn osc_to_variant(arg: &OscType) -> Variant {
    match arg {
        OscType::Int(i) => Variant::Int(*i),
        OscType::Float(f) => Variant::Float(*f),
        OscType::String(s) => Variant::String(s.clone()),
        OscType::Blob(bytes) => Variant::Generic(bytes.clone()),
        OscType::Long(l) => match i32::try_from(*l) {
            Ok(i) => Variant::Int(i),
            Err(_) => Variant::Float(*l as f32),
        },
        OscType::Double(d) => Variant::Float(*d as f32),
        OscType::Char(c) => Variant::Char(*c),
        OscType::Bool(b) => Variant::Bool(*b),
        OscType::Nil => Variant::None,
        OscType::Inf => Variant::Impulse,
        OscType::Time(t) => {
            let mut bytes = t.seconds.to_be_bytes().to_vec();
            bytes.extend_from_slice(&t.fractional.to_be_bytes());
            Variant::Generic(bytes)
        }
        OscType::Color(c) => Variant::Generic(vec![c.red, c.green, c.blue, c.alpha]),
        OscType::Midi(m) => Variant::Generic(vec![m.port, m.status, m.data1, m.data2]),
        OscType::Array(array) => Variant::Tuple(array.content.iter().map(osc_to_variant).collect()),
    }
}

pub fn args_to_values(args: &[OscType]) -> Vec<Variant> {
    args.iter().map(osc_to_variant).collect()
}

// ============================================================================
// Policies
// ============================================================================

/// Apply `args` positionally onto `values` under `policy`
///
/// On error `values` is left untouched.
pub fn apply_args(values: &mut Vec<Variant>, args: &[OscType], policy: ConversionPolicy) -> Result<()> {
    match policy {
        ConversionPolicy::Replace => {
            *values = args_to_values(args);
        }
        ConversionPolicy::Prechecked => {
            for (slot, arg) in values.iter_mut().zip(args) {
                *slot = osc_to_variant(arg);
            }
        }
        ConversionPolicy::Ignore => {
            for (slot, arg) in values.iter_mut().zip(args) {
                if let Some(value) = same_tag(slot, arg) {
                    *slot = value;
                }
            }
        }
        ConversionPolicy::Convert => {
            if args.len() > values.len() {
                return Err(ControlError::InvalidInput(format!(
                    "{} arguments for {} values",
                    args.len(),
                    values.len()
                )));
            }
            let converted = values
                .iter()
                .zip(args)
                .map(|(slot, arg)| convert(slot, arg))
                .collect::<Result<Vec<_>>>()?;
            for (slot, value) in values.iter_mut().zip(converted) {
                *slot = value;
            }
        }
    }
    Ok(())
}

/// `arg` as a value of `current`'s tag, if the wire type is that tag
fn same_tag(current: &Variant, arg: &OscType) -> Option<Variant> {
    let value = match (current, arg) {
        (Variant::None, OscType::Nil) => Variant::None,
        (Variant::Impulse, OscType::Inf) => Variant::Impulse,
        (Variant::Bool(_), OscType::Bool(b)) => Variant::Bool(*b),
        (Variant::Int(_), OscType::Int(i)) => Variant::Int(*i),
        (Variant::Float(_), OscType::Float(f)) => Variant::Float(*f),
        (Variant::Char(_), OscType::Char(c)) => Variant::Char(*c),
        (Variant::String(_), OscType::String(s)) => Variant::String(s.clone()),
        (Variant::Generic(_), OscType::Blob(b)) => Variant::Generic(b.clone()),
        (Variant::Tuple(items), OscType::Array(array)) => {
            let mut items = items.clone();
            for (slot, arg) in items.iter_mut().zip(&array.content) {
                if let Some(value) = same_tag(slot, arg) {
                    *slot = value;
                }
            }
            Variant::Tuple(items)
        }
        _ => return None,
    };
    Some(value)
}

fn numeric(arg: &OscType) -> Option<f64> {
    match arg {
        OscType::Int(i) => Some(f64::from(*i)),
        OscType::Float(f) => Some(f64::from(*f)),
        OscType::Long(l) => Some(*l as f64),
        OscType::Double(d) => Some(*d),
        OscType::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        OscType::Char(c) => Some(f64::from(u32::from(*c))),
        OscType::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Coerce `arg` to `current`'s tag
fn convert(current: &Variant, arg: &OscType) -> Result<Variant> {
    let incompatible = || ControlError::InvalidInput(format!("cannot convert {arg:?} to {:?}", current.kind()));

    let value = match current {
        Variant::None => Variant::None,
        Variant::Impulse => Variant::Impulse,
        Variant::Bool(_) => match arg {
            OscType::String(s) if s == "true" => Variant::Bool(true),
            OscType::String(s) if s == "false" => Variant::Bool(false),
            OscType::Inf => Variant::Bool(true),
            other => Variant::Bool(numeric(other).ok_or_else(incompatible)? != 0.0),
        },
        Variant::Int(_) => {
            let n = numeric(arg).ok_or_else(incompatible)?;
            if !n.is_finite() || n < f64::from(i32::MIN) || n > f64::from(i32::MAX) {
                return Err(incompatible());
            }
            Variant::Int(n as i32)
        }
        Variant::Float(_) => Variant::Float(numeric(arg).ok_or_else(incompatible)? as f32),
        Variant::Char(_) => match arg {
            OscType::Char(c) => Variant::Char(*c),
            OscType::String(s) if s.chars().count() == 1 => {
                Variant::Char(s.chars().next().ok_or_else(incompatible)?)
            }
            OscType::Int(i) => Variant::Char(
                u32::try_from(*i)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(incompatible)?,
            ),
            _ => return Err(incompatible()),
        },
        Variant::String(_) => match arg {
            OscType::String(s) => Variant::String(s.clone()),
            OscType::Char(c) => Variant::String(c.to_string()),
            OscType::Int(i) => Variant::String(i.to_string()),
            OscType::Float(f) => Variant::String(f.to_string()),
            OscType::Long(l) => Variant::String(l.to_string()),
            OscType::Double(d) => Variant::String(d.to_string()),
            OscType::Bool(b) => Variant::String(b.to_string()),
            _ => return Err(incompatible()),
        },
        Variant::Generic(_) => match arg {
            OscType::Blob(bytes) => Variant::Generic(bytes.clone()),
            OscType::String(s) => Variant::Generic(s.as_bytes().to_vec()),
            _ => return Err(incompatible()),
        },
        Variant::Tuple(items) => match arg {
            OscType::Array(array) if array.content.len() == items.len() => Variant::Tuple(
                items
                    .iter()
                    .zip(&array.content)
                    .map(|(item, arg)| convert(item, arg))
                    .collect::<Result<_>>()?,
            ),
            _ => return Err(incompatible()),
        },
    };
    Ok(value)
}

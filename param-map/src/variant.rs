//! Tagged-union value model
//!
//! A [`Variant`] is everything a parameter's value slot can hold. Its active
//! tag drives every serialization decision, so each tag has exactly one
//! single-character wire code (tuples are bracketed sequences of codes).
//!
//! | Tag       | Wire code     |
//! |-----------|---------------|
//! | None      | `N`           |
//! | Impulse   | `I`           |
//! | Bool      | `T` / `F`     |
//! | Int       | `i`           |
//! | Float     | `f`           |
//! | Char      | `c`           |
//! | String    | `s`           |
//! | Tuple     | `[` ... `]`   |
//! | Generic   | `b`           |

use std::fmt;

use crate::error::{MapError, Result};

/// Ordered value list of a parameter
pub type Values = Vec<Variant>;

/// A single parameter value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    /// No value
    #[default]
    None,
    /// Trigger without payload
    Impulse,
    Bool(bool),
    Int(i32),
    Float(f32),
    Char(char),
    String(String),
    /// Nested sequence of values
    Tuple(Vec<Variant>),
    /// Opaque binary blob
    Generic(Vec<u8>),
}

/// Active tag of a [`Variant`], without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    None,
    Impulse,
    Bool,
    Int,
    Float,
    Char,
    String,
    Tuple,
    Generic,
}

impl Variant {
    /// The active tag
    pub fn kind(&self) -> VariantKind {
        match self {
            Variant::None => VariantKind::None,
            Variant::Impulse => VariantKind::Impulse,
            Variant::Bool(_) => VariantKind::Bool,
            Variant::Int(_) => VariantKind::Int,
            Variant::Float(_) => VariantKind::Float,
            Variant::Char(_) => VariantKind::Char,
            Variant::String(_) => VariantKind::String,
            Variant::Tuple(_) => VariantKind::Tuple,
            Variant::Generic(_) => VariantKind::Generic,
        }
    }

    /// Append this value's wire type code(s) to `out`
    pub fn write_type_tag(&self, out: &mut String) {
        match self {
            Variant::None => out.push('N'),
            Variant::Impulse => out.push('I'),
            Variant::Bool(true) => out.push('T'),
            Variant::Bool(false) => out.push('F'),
            Variant::Int(_) => out.push('i'),
            Variant::Float(_) => out.push('f'),
            Variant::Char(_) => out.push('c'),
            Variant::String(_) => out.push('s'),
            Variant::Generic(_) => out.push('b'),
            Variant::Tuple(items) => {
                out.push('[');
                for item in items {
                    item.write_type_tag(out);
                }
                out.push(']');
            }
        }
    }

    /// This value's wire type code(s)
    pub fn type_tag(&self) -> String {
        let mut out = String::new();
        self.write_type_tag(&mut out);
        out
    }

    /// Numeric view used for clipping and bounding
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::Int(i) => Some(f64::from(*i)),
            Variant::Float(f) => Some(f64::from(*f)),
            Variant::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Same tag as `self`, carrying the numeric value `n`
    ///
    /// Non-numeric values are returned unchanged.
    pub fn with_numeric(&self, n: f64) -> Variant {
        match self {
            Variant::Int(_) => Variant::Int(n.round() as i32),
            Variant::Float(_) => Variant::Float(n as f32),
            Variant::Bool(_) => Variant::Bool(n != 0.0),
            other => other.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Variant::None)
    }
}

/// Concatenated wire type codes of a value list
///
/// ```rust
/// use param_map::{type_tags, Variant};
///
/// let values = vec![Variant::Int(1), Variant::Float(0.5), Variant::Bool(true)];
/// assert_eq!(type_tags(&values), "ifT");
/// ```
pub fn type_tags(values: &[Variant]) -> String {
    let mut out = String::new();
    for value in values {
        value.write_type_tag(&mut out);
    }
    out
}

/// Compare two type-tag strings, treating `T` and `F` as the same type
///
/// Booleans carry their value in the tag, so a stored `T` must accept an
/// incoming `F`.
pub fn type_tags_compatible(stored: &str, incoming: &str) -> bool {
    fn fold(c: char) -> char {
        if c == 'F' {
            'T'
        } else {
            c
        }
    }
    stored.len() == incoming.len() && stored.chars().map(fold).eq(incoming.chars().map(fold))
}

/// Build default-valued templates from a type-tag string
///
/// The inverse of [`type_tags`] up to payloads: `"i[fs]T"` yields
/// `[Int(0), Tuple([Float(0.0), String("")]), Bool(true)]`.
pub fn parse_type_tags(tags: &str) -> Result<Values> {
    let mut chars = tags.chars();
    let values = parse_sequence(&mut chars, tags, false)?;
    Ok(values)
}

fn parse_sequence(chars: &mut std::str::Chars<'_>, tags: &str, nested: bool) -> Result<Values> {
    let mut values = Vec::new();
    while let Some(c) = chars.next() {
        let value = match c {
            'N' => Variant::None,
            'I' => Variant::Impulse,
            'T' => Variant::Bool(true),
            'F' => Variant::Bool(false),
            'i' => Variant::Int(0),
            'f' => Variant::Float(0.0),
            'c' => Variant::Char('\0'),
            's' => Variant::String(String::new()),
            'b' => Variant::Generic(Vec::new()),
            '[' => Variant::Tuple(parse_sequence(chars, tags, true)?),
            ']' if nested => return Ok(values),
            other => {
                return Err(MapError::InvalidInput(format!(
                    "unknown type tag {other:?} in {tags:?}"
                )))
            }
        };
        values.push(value);
    }

    if nested {
        return Err(MapError::InvalidInput(format!("unterminated tuple in {tags:?}")));
    }
    Ok(values)
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::None => write!(f, "none"),
            Variant::Impulse => write!(f, "impulse"),
            Variant::Bool(b) => write!(f, "{b}"),
            Variant::Int(i) => write!(f, "{i}"),
            Variant::Float(x) => write!(f, "{x}"),
            Variant::Char(c) => write!(f, "{c}"),
            Variant::String(s) => write!(f, "{s}"),
            Variant::Generic(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Variant::Tuple(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int(v)
    }
}

impl From<f32> for Variant {
    fn from(v: f32) -> Self {
        Variant::Float(v)
    }
}

impl From<char> for Variant {
    fn from(v: char) -> Self {
        Variant::Char(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}

impl From<Vec<Variant>> for Variant {
    fn from(v: Vec<Variant>) -> Self {
        Variant::Tuple(v)
    }
}

//! `<path>[:<attribute>]` addresses
//!
//! The attribute token is identified by its leading characters, so
//! `/gain:v` and `/gain:value` name the same attribute.

use std::fmt;

use param_map::address;

use crate::error::{ControlError, Result};

/// Attribute addressable through the Minuit protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MinuitAttribute {
    Value,
    Type,
    Service,
    Priority,
    RangeBounds,
    RangeClipMode,
    Description,
    RepetitionFilter,
}

impl MinuitAttribute {
    /// Every attribute, in the order leaf nodes advertise them
    pub const ALL: &'static [MinuitAttribute] = &[
        MinuitAttribute::Value,
        MinuitAttribute::Type,
        MinuitAttribute::Service,
        MinuitAttribute::Priority,
        MinuitAttribute::RangeBounds,
        MinuitAttribute::RangeClipMode,
        MinuitAttribute::Description,
        MinuitAttribute::RepetitionFilter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MinuitAttribute::Value => "value",
            MinuitAttribute::Type => "type",
            MinuitAttribute::Service => "service",
            MinuitAttribute::Priority => "priority",
            MinuitAttribute::RangeBounds => "rangeBounds",
            MinuitAttribute::RangeClipMode => "rangeClipMode",
            MinuitAttribute::Description => "description",
            MinuitAttribute::RepetitionFilter => "repetitionFilter",
        }
    }

    /// Identify an attribute token by its prefix
    pub fn from_token(token: &str) -> Result<Self> {
        let unknown = || ControlError::UnknownAttribute(token.to_string());
        let attribute = match token.as_bytes() {
            [b'v', ..] => MinuitAttribute::Value,
            [b't', ..] => MinuitAttribute::Type,
            [b's', ..] => MinuitAttribute::Service,
            [b'p', ..] => MinuitAttribute::Priority,
            [b'd', ..] => MinuitAttribute::Description,
            [b'r', b'e', ..] => MinuitAttribute::RepetitionFilter,
            [b'r', b'a', b'n', b'g', b'e', b'B', ..] => MinuitAttribute::RangeBounds,
            [b'r', b'a', b'n', b'g', b'e', b'C', ..] => MinuitAttribute::RangeClipMode,
            _ => return Err(unknown()),
        };
        Ok(attribute)
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for MinuitAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of attributes a listener is subscribed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeSet(u16);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attribute: MinuitAttribute) {
        self.0 |= attribute.bit();
    }

    pub fn remove(&mut self, attribute: MinuitAttribute) {
        self.0 &= !attribute.bit();
    }

    pub fn contains(&self, attribute: MinuitAttribute) -> bool {
        self.0 & attribute.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = MinuitAttribute> + '_ {
        MinuitAttribute::ALL.iter().copied().filter(|a| self.contains(*a))
    }
}

/// A parsed `<path>[:<attribute>]` address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinuitAddress {
    pub path: String,
    pub attribute: Option<MinuitAttribute>,
}

impl MinuitAddress {
    pub fn new(path: impl Into<String>, attribute: Option<MinuitAttribute>) -> Self {
        Self {
            path: path.into(),
            attribute,
        }
    }

    /// Split at the first `:`
    ///
    /// A trailing `:` with no attribute token is rejected rather than
    /// guessed at.
    pub fn parse(text: &str) -> Result<Self> {
        let (raw_path, token) = match text.split_once(':') {
            Some((path, token)) => (path, Some(token)),
            None => (text, None),
        };

        let path = address::normalize(raw_path).map_err(|_| ControlError::MalformedAddress(text.to_string()))?;
        let attribute = match token {
            None => None,
            Some("") => return Err(ControlError::MalformedAddress(text.to_string())),
            Some(token) => Some(MinuitAttribute::from_token(token)?),
        };

        Ok(Self { path, attribute })
    }

    /// The addressed attribute, `value` when none was given
    pub fn attribute_or_value(&self) -> MinuitAttribute {
        self.attribute.unwrap_or(MinuitAttribute::Value)
    }
}

impl fmt::Display for MinuitAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.attribute {
            Some(attribute) => write!(f, "{}:{}", self.path, attribute),
            None => f.write_str(&self.path),
        }
    }
}

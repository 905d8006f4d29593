//! Attribute facets of a parameter
//!
//! Each facet is an independent, orthogonal piece of parameter state. The
//! string forms used on the wire live here as constant tables so both
//! protocol codecs agree on them.

use std::fmt;
use std::str::FromStr;

use crate::error::MapError;
use crate::variant::Variant;

/// Per-value bounds and optional enumeration of allowed values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Range {
    pub min: Option<Variant>,
    pub max: Option<Variant>,
    /// Allowed values; empty means unrestricted
    pub values: Vec<Variant>,
}

impl Range {
    /// Range with both bounds set
    pub fn new(min: impl Into<Variant>, max: impl Into<Variant>) -> Self {
        Self {
            min: Some(min.into()),
            max: Some(max.into()),
            values: Vec::new(),
        }
    }

    /// Range restricted to an enumeration
    pub fn enumeration(values: Vec<Variant>) -> Self {
        Self {
            min: None,
            max: None,
            values,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none() && self.values.is_empty()
    }
}

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            #[default]
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire name of this variant
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = MapError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| {
                        MapError::InvalidInput(format!(
                            concat!("unknown ", stringify!($name), " {:?}"),
                            s
                        ))
                    })
            }
        }
    };
}

string_enum! {
    /// Clipping policy applied to a value against its range
    ClipMode {
        None => "None",
        Low => "Low",
        High => "High",
        Both => "Both",
    }
}

string_enum! {
    /// Bounding behaviour when a value leaves its range
    Bounding {
        Free => "Free",
        Clip => "Clip",
        Wrap => "Wrap",
        Fold => "Fold",
    }
}

/// Read/write capability of a parameter
///
/// Encoded as an integer 0-3 in query documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Access {
    #[default]
    None,
    Get,
    Set,
    Both,
}

impl Access {
    pub fn as_int(&self) -> i64 {
        match self {
            Access::None => 0,
            Access::Get => 1,
            Access::Set => 2,
            Access::Both => 3,
        }
    }

    pub fn from_int(value: i64) -> Option<Self> {
        match value {
            0 => Some(Access::None),
            1 => Some(Access::Get),
            2 => Some(Access::Set),
            3 => Some(Access::Both),
            _ => None,
        }
    }

    pub fn can_read(&self) -> bool {
        matches!(self, Access::Get | Access::Both)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Access::Set | Access::Both)
    }
}

/// Named attribute of a parameter, as addressed by queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    FullPath,
    Access,
    Description,
    Tags,
    Type,
    Value,
    Range,
    ClipMode,
    Bounding,
    RepetitionFilter,
}

impl Attribute {
    pub const ALL: &'static [Attribute] = &[
        Attribute::FullPath,
        Attribute::Access,
        Attribute::Description,
        Attribute::Tags,
        Attribute::Type,
        Attribute::Value,
        Attribute::Range,
        Attribute::ClipMode,
        Attribute::Bounding,
        Attribute::RepetitionFilter,
    ];

    /// Key used in query documents
    pub fn key(&self) -> &'static str {
        match self {
            Attribute::FullPath => "full_path",
            Attribute::Access => "access",
            Attribute::Description => "description",
            Attribute::Tags => "tags",
            Attribute::Type => "type",
            Attribute::Value => "value",
            Attribute::Range => "range",
            Attribute::ClipMode => "clipmode",
            Attribute::Bounding => "bounding",
            Attribute::RepetitionFilter => "repetition_filter",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Attribute {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attribute::ALL
            .iter()
            .copied()
            .find(|a| a.key() == s)
            .ok_or_else(|| MapError::InvalidInput(format!("unknown attribute {s:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("None", ClipMode::None)]
    #[case("Low", ClipMode::Low)]
    #[case("High", ClipMode::High)]
    #[case("Both", ClipMode::Both)]
    fn test_clipmode_names(#[case] text: &str, #[case] mode: ClipMode) {
        assert_eq!(text.parse::<ClipMode>().unwrap(), mode);
        assert_eq!(mode.to_string(), text);
    }

    #[test]
    fn test_unknown_clipmode() {
        assert!("low".parse::<ClipMode>().is_err());
    }

    #[test]
    fn test_access_round_trip() {
        for access in [Access::None, Access::Get, Access::Set, Access::Both] {
            assert_eq!(Access::from_int(access.as_int()), Some(access));
        }
        assert_eq!(Access::from_int(4), None);
        assert!(Access::Set.can_write());
        assert!(!Access::Get.can_write());
        assert!(Access::Both.can_read());
    }

    #[test]
    fn test_attribute_keys() {
        for attribute in Attribute::ALL {
            assert_eq!(attribute.key().parse::<Attribute>().unwrap(), *attribute);
        }
        assert!("colour".parse::<Attribute>().is_err());
    }

    #[test]
    fn test_range_emptiness() {
        assert!(Range::default().is_empty());
        assert!(!Range::new(0, 10).is_empty());
        assert!(!Range::enumeration(vec![Variant::from("a")]).is_empty());
    }

    #[test]
    fn test_bounding_default() {
        assert_eq!(Bounding::default(), Bounding::Free);
        assert_eq!("Wrap".parse::<Bounding>().unwrap(), Bounding::Wrap);
    }
}

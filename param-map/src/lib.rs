//! Address-Indexed Parameter Tree
//!
//! A concurrency-safe store of parameters keyed by hierarchical address
//! (`/synth/osc1/freq`). Hierarchy is derived from the address strings at
//! read time; nothing stores parent or child edges.
//!
//! # Features
//!
//! - **Tagged Values**: [`Variant`] covers none, impulse, bool, int, float,
//!   char, string, nested tuples and binary blobs, each with a wire type code
//! - **Flat Parameters**: one struct per node with every attribute facet
//! - **Prefix Hierarchy**: subtree removal, filtering and child listing by
//!   address prefix over a sorted map
//! - **Root Invariant**: `/` always exists and is reseeded when removed
//! - **Locked Access**: [`LockedParameterMap`] guards the map with a single
//!   reader/writer lock
//!
//! # Quick Start
//!
//! ```rust
//! use param_map::{Access, LockedParameterMap, Parameter, Variant};
//!
//! let map = LockedParameterMap::new();
//! map.insert(
//!     Parameter::new("/synth/osc1/freq")
//!         .with_values(vec![Variant::Float(440.0)])
//!         .with_access(Access::Both),
//! );
//!
//! assert!(map.existing_path("/synth"));
//! assert!(!map.has("/synth"));
//! assert_eq!(map.type_tags("/synth/osc1/freq").as_deref(), Some("f"));
//! ```
//!
//! # Architecture
//!
//! ```text
//! LockedParameterMap
//!     │
//!     └── Arc<RwLock<ParameterMap>>
//!             │
//!             └── BTreeMap<destination, Parameter>
//!                     │
//!                     └── Parameter { values, ranges, clipmodes, access,
//!                                     description, tags, bounding,
//!                                     repetition_filter }
//! ```

// Modules
pub mod address;
pub mod attributes;
pub mod error;
pub mod locked;
pub mod map;
pub mod parameter;
pub mod variant;

// Re-exports - Public API
pub use attributes::{Access, Attribute, Bounding, ClipMode, Range};
pub use error::{MapError, Result};
pub use locked::LockedParameterMap;
pub use map::{ParameterMap, ROOT_DESCRIPTION};
pub use parameter::{Parameter, ParameterPatch};
pub use variant::{parse_type_tags, type_tags, type_tags_compatible, Values, Variant, VariantKind};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::attributes::{Access, Attribute, Bounding, ClipMode, Range};
    pub use crate::locked::LockedParameterMap;
    pub use crate::map::ParameterMap;
    pub use crate::parameter::{Parameter, ParameterPatch};
    pub use crate::variant::Variant;
}

//! The parameter record and its partial-update patch

use crate::attributes::{Access, Bounding, ClipMode, Range};
use crate::error::{MapError, Result};
use crate::variant::{type_tags, Variant};

/// One addressable node of the tree
///
/// Identity is `destination` alone. Every facet is always present; an empty
/// `values` list marks a pure container node. Whenever `values` is non-empty,
/// `ranges` and `clipmodes` hold one slot per value.
///
/// ```rust
/// use param_map::{Access, Parameter, Range, Variant};
///
/// let freq = Parameter::new("/synth/osc1/freq")
///     .with_value(Variant::Float(440.0), Range::new(20.0f32, 20000.0f32), Default::default())
///     .with_access(Access::Both)
///     .with_description("Oscillator frequency");
///
/// assert_eq!(freq.type_tags(), "f");
/// assert!(freq.check_facets().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameter {
    pub destination: String,
    pub values: Vec<Variant>,
    pub ranges: Vec<Range>,
    pub clipmodes: Vec<ClipMode>,
    pub access: Access,
    pub description: String,
    pub tags: Vec<String>,
    pub bounding: Bounding,
    pub repetition_filter: bool,
}

impl Parameter {
    /// Empty container node at `destination`
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            ..Default::default()
        }
    }

    /// Append one value with its range and clip mode
    pub fn with_value(mut self, value: Variant, range: Range, clipmode: ClipMode) -> Self {
        self.push_value(value, range, clipmode);
        self
    }

    /// Replace the value list, resetting ranges and clip modes to defaults
    pub fn with_values(mut self, values: Vec<Variant>) -> Self {
        self.set_values(values);
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_bounding(mut self, bounding: Bounding) -> Self {
        self.bounding = bounding;
        self
    }

    pub fn with_repetition_filter(mut self, enabled: bool) -> Self {
        self.repetition_filter = enabled;
        self
    }

    pub fn push_value(&mut self, value: Variant, range: Range, clipmode: ClipMode) {
        self.values.push(value);
        self.ranges.push(range);
        self.clipmodes.push(clipmode);
    }

    /// Replace values, keeping existing range/clip slots where indices survive
    pub fn set_values(&mut self, values: Vec<Variant>) {
        self.values = values;
        self.align_facets();
    }

    /// Pad or truncate ranges and clip modes to the value count
    pub fn align_facets(&mut self) {
        let n = self.values.len();
        self.ranges.resize_with(n, Range::default);
        self.clipmodes.resize(n, ClipMode::None);
    }

    /// Check the parallel-facet invariant
    pub fn check_facets(&self) -> Result<()> {
        let n = self.values.len();
        if n > 0 && (self.ranges.len() != n || self.clipmodes.len() != n) {
            return Err(MapError::LengthMismatch {
                destination: self.destination.clone(),
                values: n,
                ranges: self.ranges.len(),
                clipmodes: self.clipmodes.len(),
            });
        }
        Ok(())
    }

    /// Whether this node carries no leaf value
    pub fn is_container(&self) -> bool {
        self.values.is_empty()
    }

    /// Wire type codes of the current values
    pub fn type_tags(&self) -> String {
        type_tags(&self.values)
    }

    /// Apply the facets present in `patch`
    ///
    /// Returns whether anything changed.
    pub fn apply(&mut self, patch: &ParameterPatch) -> bool {
        let before = self.clone();

        if let Some(values) = &patch.values {
            self.values = values.clone();
        }
        if let Some(ranges) = &patch.ranges {
            self.ranges = ranges.clone();
        }
        if let Some(clipmodes) = &patch.clipmodes {
            self.clipmodes = clipmodes.clone();
        }
        if let Some(access) = patch.access {
            self.access = access;
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(tags) = &patch.tags {
            self.tags = tags.clone();
        }
        if let Some(bounding) = patch.bounding {
            self.bounding = bounding;
        }
        if let Some(filter) = patch.repetition_filter {
            self.repetition_filter = filter;
        }
        self.align_facets();

        *self != before
    }

    /// Values after clip modes and bounding are applied against ranges
    pub fn bounded_values(&self) -> Vec<Variant> {
        self.values
            .iter()
            .enumerate()
            .map(|(idx, value)| {
                let range = self.ranges.get(idx);
                let clipmode = self.clipmodes.get(idx).copied().unwrap_or_default();
                bound_value(value, range, clipmode, self.bounding)
            })
            .collect()
    }
}

fn bound_value(value: &Variant, range: Option<&Range>, clipmode: ClipMode, bounding: Bounding) -> Variant {
    let (Some(range), Some(n)) = (range, value.as_f64()) else {
        return value.clone();
    };
    let min = range.min.as_ref().and_then(Variant::as_f64);
    let max = range.max.as_ref().and_then(Variant::as_f64);

    let mut n = match (clipmode, min, max) {
        (ClipMode::Low, Some(lo), _) => n.max(lo),
        (ClipMode::High, _, Some(hi)) => n.min(hi),
        (ClipMode::Both, Some(lo), Some(hi)) => n.clamp(lo, hi),
        (ClipMode::Both, Some(lo), None) => n.max(lo),
        (ClipMode::Both, None, Some(hi)) => n.min(hi),
        _ => n,
    };

    if let (Some(lo), Some(hi)) = (min, max) {
        if hi > lo {
            n = match bounding {
                Bounding::Free => n,
                Bounding::Clip => n.clamp(lo, hi),
                Bounding::Wrap => lo + (n - lo).rem_euclid(hi - lo),
                Bounding::Fold => {
                    let span = hi - lo;
                    let t = (n - lo).rem_euclid(2.0 * span);
                    if t <= span {
                        lo + t
                    } else {
                        hi - (t - span)
                    }
                }
            };
        }
    }

    value.with_numeric(n)
}

/// Partial update of a parameter's facets
///
/// `None` leaves the corresponding facet untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterPatch {
    pub values: Option<Vec<Variant>>,
    pub ranges: Option<Vec<Range>>,
    pub clipmodes: Option<Vec<ClipMode>>,
    pub access: Option<Access>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub bounding: Option<Bounding>,
    pub repetition_filter: Option<bool>,
}

impl ParameterPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(mut self, values: Vec<Variant>) -> Self {
        self.values = Some(values);
        self
    }

    pub fn ranges(mut self, ranges: Vec<Range>) -> Self {
        self.ranges = Some(ranges);
        self
    }

    pub fn clipmodes(mut self, clipmodes: Vec<ClipMode>) -> Self {
        self.clipmodes = Some(clipmodes);
        self
    }

    pub fn access(mut self, access: Access) -> Self {
        self.access = Some(access);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn bounding(mut self, bounding: Bounding) -> Self {
        self.bounding = Some(bounding);
        self
    }

    pub fn repetition_filter(mut self, enabled: bool) -> Self {
        self.repetition_filter = Some(enabled);
        self
    }

    /// Patch carrying every facet of `parameter`
    pub fn from_parameter(parameter: &Parameter) -> Self {
        Self {
            values: Some(parameter.values.clone()),
            ranges: Some(parameter.ranges.clone()),
            clipmodes: Some(parameter.clipmodes.clone()),
            access: Some(parameter.access),
            description: Some(parameter.description.clone()),
            tags: Some(parameter.tags.clone()),
            bounding: Some(parameter.bounding),
            repetition_filter: Some(parameter.repetition_filter),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_node() {
        let node = Parameter::new("/synth");
        assert!(node.is_container());
        assert_eq!(node.type_tags(), "");
        assert!(node.check_facets().is_ok());
    }

    #[test]
    fn test_set_values_aligns_facets() {
        let mut param = Parameter::new("/a")
            .with_value(Variant::Int(1), Range::new(0, 10), ClipMode::Both);
        param.set_values(vec![Variant::Int(1), Variant::Float(2.0)]);
        assert_eq!(param.ranges.len(), 2);
        assert_eq!(param.clipmodes, vec![ClipMode::Both, ClipMode::None]);
        assert_eq!(param.ranges[0], Range::new(0, 10));

        param.set_values(vec![]);
        assert!(param.ranges.is_empty());
        assert!(param.clipmodes.is_empty());
    }

    #[test]
    fn test_check_facets_detects_mismatch() {
        let mut param = Parameter::new("/a").with_values(vec![Variant::Int(1)]);
        param.ranges.clear();
        assert!(matches!(
            param.check_facets(),
            Err(MapError::LengthMismatch { values: 1, ranges: 0, .. })
        ));
    }

    #[test]
    fn test_apply_patch_reports_change() {
        let mut param = Parameter::new("/a").with_values(vec![Variant::Int(1)]);

        let patch = ParameterPatch::new().values(vec![Variant::Int(2)]).description("two");
        assert!(param.apply(&patch));
        assert_eq!(param.values, vec![Variant::Int(2)]);
        assert_eq!(param.description, "two");

        // Same patch again changes nothing
        assert!(!param.apply(&patch));
        assert!(!param.apply(&ParameterPatch::new()));
    }

    #[test]
    fn test_patch_from_parameter_reproduces_it() {
        let source = Parameter::new("/a")
            .with_value(Variant::Float(0.5), Range::new(0.0f32, 1.0f32), ClipMode::Low)
            .with_access(Access::Set)
            .with_tags(["x", "y"])
            .with_bounding(Bounding::Wrap)
            .with_repetition_filter(true);

        let mut target = Parameter::new("/a");
        target.apply(&ParameterPatch::from_parameter(&source));
        assert_eq!(target, source);
    }

    #[test]
    fn test_clipmodes_bound_values() {
        let param = Parameter::new("/a")
            .with_value(Variant::Int(15), Range::new(0, 10), ClipMode::Both)
            .with_value(Variant::Float(-1.0), Range::new(0.0f32, 1.0f32), ClipMode::High)
            .with_value(Variant::Float(-1.0), Range::new(0.0f32, 1.0f32), ClipMode::Low);

        assert_eq!(
            param.bounded_values(),
            vec![Variant::Int(10), Variant::Float(-1.0), Variant::Float(0.0)]
        );
    }

    #[test]
    fn test_wrap_and_fold_bounding() {
        let wrap = Parameter::new("/w")
            .with_value(Variant::Float(12.0), Range::new(0.0f32, 10.0f32), ClipMode::None)
            .with_bounding(Bounding::Wrap);
        assert_eq!(wrap.bounded_values(), vec![Variant::Float(2.0)]);

        let fold = Parameter::new("/f")
            .with_value(Variant::Float(12.0), Range::new(0.0f32, 10.0f32), ClipMode::None)
            .with_bounding(Bounding::Fold);
        assert_eq!(fold.bounded_values(), vec![Variant::Float(8.0)]);
    }

    #[test]
    fn test_non_numeric_values_pass_through() {
        let param = Parameter::new("/s")
            .with_value(Variant::from("hello"), Range::new(0, 1), ClipMode::Both);
        assert_eq!(param.bounded_values(), vec![Variant::from("hello")]);
    }
}

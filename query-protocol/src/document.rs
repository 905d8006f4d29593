//! Namespace documents
//!
//! A document is a JSON tree with one node per path segment. Nodes that
//! correspond to a stored parameter carry `full_path` and the attribute keys;
//! nodes implied only by descendants are bare containers. Children hang
//! under `contents`, keyed by segment name.
//!
//! ```text
//! {
//!   "full_path": "/", "access": 0, "description": "root node",
//!   "contents": {
//!     "synth": {
//!       "contents": {
//!         "freq": { "full_path": "/synth/freq", "access": 3, "type": "f",
//!                   "value": [440.0], "range": [[20.0, 20000.0, null]],
//!                   "clipmode": ["Both"] }
//!       }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use param_map::{address, parse_type_tags, Access, Attribute, Bounding, Parameter, ParameterMap, ParameterPatch, Variant};
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{QueryError, Result};
use crate::value::{
    as_array, clipmodes_from_json, clipmodes_to_json, ranges_from_json, ranges_to_json, values_from_json,
    values_to_json,
};

/// Key holding a node's children
pub const CONTENTS: &str = "contents";

/// JSON form of a single attribute of `parameter`
pub fn attribute_value(parameter: &Parameter, attribute: Attribute) -> Value {
    match attribute {
        Attribute::FullPath => Value::from(parameter.destination.as_str()),
        Attribute::Access => Value::from(parameter.access.as_int()),
        Attribute::Description => Value::from(parameter.description.as_str()),
        Attribute::Tags => Value::from(parameter.tags.clone()),
        Attribute::Type => Value::from(parameter.type_tags()),
        Attribute::Value => values_to_json(&parameter.values),
        Attribute::Range => ranges_to_json(&parameter.ranges),
        Attribute::ClipMode => clipmodes_to_json(&parameter.clipmodes),
        Attribute::Bounding => Value::from(parameter.bounding.as_str()),
        Attribute::RepetitionFilter => Value::from(parameter.repetition_filter),
    }
}

/// Leaf attributes of a parameter node, without `contents`
///
/// `full_path` and `access` are always present; the other keys are omitted
/// when their facet is empty or at its default.
pub fn node_attributes(parameter: &Parameter) -> Map<String, Value> {
    let mut node = Map::new();
    let mut put = |attribute: Attribute| {
        node.insert(attribute.key().to_string(), attribute_value(parameter, attribute));
    };

    put(Attribute::FullPath);
    put(Attribute::Access);
    if !parameter.description.is_empty() {
        put(Attribute::Description);
    }
    if !parameter.tags.is_empty() {
        put(Attribute::Tags);
    }
    if !parameter.values.is_empty() {
        put(Attribute::Type);
        put(Attribute::Value);
        put(Attribute::Range);
        put(Attribute::ClipMode);
    }
    if parameter.bounding != Bounding::Free {
        put(Attribute::Bounding);
    }
    if parameter.repetition_filter {
        put(Attribute::RepetitionFilter);
    }
    node
}

/// Projection of `parameter` onto the requested attributes only
pub fn attribute_query(parameter: &Parameter, attributes: &[Attribute]) -> Value {
    let node: Map<String, Value> = attributes
        .iter()
        .map(|a| (a.key().to_string(), attribute_value(parameter, *a)))
        .collect();
    Value::Object(node)
}

#[derive(Default)]
struct TreeNode {
    attributes: Option<Map<String, Value>>,
    children: BTreeMap<String, TreeNode>,
}

impl TreeNode {
    fn into_json(self) -> Value {
        let mut node = self.attributes.unwrap_or_default();
        if !self.children.is_empty() {
            let contents: Map<String, Value> = self
                .children
                .into_iter()
                .map(|(segment, child)| (segment, child.into_json()))
                .collect();
            node.insert(CONTENTS.to_string(), Value::Object(contents));
        }
        Value::Object(node)
    }
}

/// Render every parameter at or beneath `root` as a nested document
///
/// The returned top-level node stands for `root` itself.
pub fn map_to_document(map: &ParameterMap, root: &str) -> Value {
    let mut top = TreeNode::default();

    for parameter in map.iter() {
        let Some(rel) = address::relative(&parameter.destination, root) else {
            continue;
        };
        let mut node = &mut top;
        for segment in address::segments(rel) {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.attributes = Some(node_attributes(parameter));
    }

    top.into_json()
}

/// Render a single parameter as a node document
pub fn parameter_to_document(parameter: &Parameter) -> Value {
    Value::Object(node_attributes(parameter))
}

/// Read every parameter node of `document` into `map`
///
/// A node is a parameter iff it has `full_path`; `contents` is descended
/// recursively. Entries are upserted. Returns the number of parameters read.
pub fn document_to_map(document: &Value, map: &mut ParameterMap) -> Result<usize> {
    let mut count = 0;
    visit(document, map, &mut count)?;
    trace!("Read {} parameters from document", count);
    Ok(count)
}

fn visit(node: &Value, map: &mut ParameterMap, count: &mut usize) -> Result<()> {
    let object = node
        .as_object()
        .ok_or_else(|| QueryError::InvalidInput(format!("node must be an object: {node}")))?;

    if object.contains_key(Attribute::FullPath.key()) {
        map.upsert(parameter_from_node(object)?);
        *count += 1;
    }

    if let Some(contents) = object.get(CONTENTS) {
        let children = contents
            .as_object()
            .ok_or_else(|| QueryError::InvalidInput(format!("{CONTENTS} must be an object")))?;
        for child in children.values() {
            visit(child, map, count)?;
        }
    }
    Ok(())
}

/// Build a parameter from a node carrying `full_path`
pub fn parameter_from_node(node: &Map<String, Value>) -> Result<Parameter> {
    let destination = full_path(node)?;
    let mut parameter = Parameter::new(destination);
    parameter.apply(&patch_from_node(node, None)?);
    Ok(parameter)
}

/// The `full_path` of a node, normalised
pub fn full_path(node: &Map<String, Value>) -> Result<String> {
    let raw = node
        .get(Attribute::FullPath.key())
        .and_then(Value::as_str)
        .ok_or_else(|| QueryError::InvalidInput("node has no full_path string".to_string()))?;
    Ok(address::normalize(raw)?)
}

/// Patch holding exactly the attribute keys present in `node`
///
/// Values are decoded against the node's `type` string when present,
/// otherwise against `existing` (tag-preserving), otherwise inferred.
pub fn patch_from_node(node: &Map<String, Value>, existing: Option<&Parameter>) -> Result<ParameterPatch> {
    let mut patch = ParameterPatch::new();

    let templates: Option<Vec<Variant>> = match node.get(Attribute::Type.key()) {
        Some(tags) => {
            let tags = tags
                .as_str()
                .ok_or_else(|| QueryError::InvalidInput(format!("type must be a string: {tags}")))?;
            Some(parse_type_tags(tags)?)
        }
        None => existing.filter(|p| !p.values.is_empty()).map(|p| p.values.clone()),
    };

    if let Some(access) = node.get(Attribute::Access.key()) {
        let access = access
            .as_i64()
            .and_then(Access::from_int)
            .ok_or_else(|| QueryError::InvalidInput(format!("access must be 0-3: {access}")))?;
        patch.access = Some(access);
    }

    if let Some(description) = node.get(Attribute::Description.key()) {
        let description = description
            .as_str()
            .ok_or_else(|| QueryError::InvalidInput("description must be a string".to_string()))?;
        patch.description = Some(description.to_string());
    }

    if let Some(tags) = node.get(Attribute::Tags.key()) {
        let tags = as_array(tags, "tags")?
            .iter()
            .map(|t| {
                t.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| QueryError::InvalidInput(format!("tag must be a string: {t}")))
            })
            .collect::<Result<Vec<_>>>()?;
        patch.tags = Some(tags);
    }

    match node.get(Attribute::Value.key()) {
        Some(values) => patch.values = Some(values_from_json(values, templates.as_deref())?),
        // A type string alone still declares the value layout
        None => {
            if node.contains_key(Attribute::Type.key()) {
                patch.values = templates.clone();
            }
        }
    }

    if let Some(ranges) = node.get(Attribute::Range.key()) {
        let value_templates = patch.values.as_deref().or(templates.as_deref());
        patch.ranges = Some(ranges_from_json(ranges, value_templates)?);
    }

    if let Some(clipmodes) = node.get(Attribute::ClipMode.key()) {
        patch.clipmodes = Some(clipmodes_from_json(clipmodes)?);
    }

    if let Some(bounding) = node.get(Attribute::Bounding.key()) {
        let bounding = bounding
            .as_str()
            .ok_or_else(|| QueryError::InvalidInput("bounding must be a string".to_string()))?;
        patch.bounding = Some(bounding.parse::<Bounding>()?);
    }

    if let Some(filter) = node.get(Attribute::RepetitionFilter.key()) {
        let filter = filter
            .as_bool()
            .ok_or_else(|| QueryError::InvalidInput("repetition_filter must be a bool".to_string()))?;
        patch.repetition_filter = Some(filter);
    }

    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use param_map::{ClipMode, Range};
    use serde_json::json;

    fn sample_map() -> ParameterMap {
        let mut map = ParameterMap::new();
        map.insert(
            Parameter::new("/synth/freq")
                .with_value(Variant::Float(440.0), Range::new(20.0f32, 20000.0f32), ClipMode::Both)
                .with_access(Access::Both)
                .with_description("frequency"),
        );
        map.insert(
            Parameter::new("/synth/wave")
                .with_value(
                    Variant::from("sine"),
                    Range::enumeration(vec![Variant::from("sine"), Variant::from("saw")]),
                    ClipMode::None,
                )
                .with_access(Access::Get)
                .with_tags(["osc"]),
        );
        map
    }

    #[test]
    fn test_map_to_document_layout() {
        let doc = map_to_document(&sample_map(), "/");

        assert_eq!(doc["full_path"], json!("/"));
        assert_eq!(doc["description"], json!("root node"));

        let synth = &doc["contents"]["synth"];
        assert!(synth.get("full_path").is_none(), "virtual node carries no attributes");

        let freq = &synth["contents"]["freq"];
        assert_eq!(freq["full_path"], json!("/synth/freq"));
        assert_eq!(freq["access"], json!(3));
        assert_eq!(freq["type"], json!("f"));
        assert_eq!(freq["value"], json!([440.0]));
        assert_eq!(freq["range"], json!([[20.0, 20000.0, null]]));
        assert_eq!(freq["clipmode"], json!(["Both"]));
        assert!(freq.get("tags").is_none());
        assert!(freq.get("contents").is_none());

        let wave = &synth["contents"]["wave"];
        assert_eq!(wave["tags"], json!(["osc"]));
        assert_eq!(wave["range"], json!([[null, null, ["sine", "saw"]]]));
        assert!(wave.get("description").is_none());
    }

    #[test]
    fn test_subtree_document() {
        let doc = map_to_document(&sample_map(), "/synth");
        assert!(doc.get("full_path").is_none());
        assert_eq!(doc["contents"]["freq"]["full_path"], json!("/synth/freq"));
        assert!(doc["contents"].get("synth").is_none());
    }

    #[test]
    fn test_container_omits_value_family() {
        let node = node_attributes(&Parameter::new("/group").with_access(Access::Get));
        let keys: Vec<_> = node.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["access", "full_path"]);
    }

    #[test]
    fn test_round_trip() {
        let original = sample_map();
        let doc = map_to_document(&original, "/");

        let mut decoded = ParameterMap::new();
        let count = document_to_map(&doc, &mut decoded).unwrap();
        assert_eq!(count, 3);
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_round_trip_survives_infinite_float() {
        let mut original = ParameterMap::new();
        original.insert(Parameter::new("/ok").with_values(vec![Variant::Float(1.0)]));
        original.insert(Parameter::new("/inf").with_values(vec![Variant::Float(f32::INFINITY)]));
        let doc = map_to_document(&original, "/");
        assert_eq!(doc["contents"]["inf"]["value"], json!([null]));

        let mut decoded = ParameterMap::new();
        document_to_map(&doc, &mut decoded).unwrap();
        assert_eq!(decoded.get("/ok").unwrap().values, vec![Variant::Float(1.0)]);
        match decoded.get("/inf").unwrap().values.as_slice() {
            [Variant::Float(f)] => assert!(f.is_nan()),
            other => panic!("unexpected values {other:?}"),
        }
    }

    #[test]
    fn test_attribute_query_projection() {
        let parameter = Parameter::new("/plop").with_description("plop").with_tags(["a"]);
        let doc = attribute_query(&parameter, &[Attribute::Description, Attribute::Tags]);
        assert_eq!(doc, json!({"description": "plop", "tags": ["a"]}));
    }

    #[test]
    fn test_patch_uses_existing_tags() {
        let existing = Parameter::new("/x").with_values(vec![Variant::Float(0.0)]);
        let node = json!({"full_path": "/x", "value": [2]});
        let patch = patch_from_node(node.as_object().unwrap(), Some(&existing)).unwrap();
        assert_eq!(patch.values, Some(vec![Variant::Float(2.0)]));
        assert!(patch.access.is_none());
        assert!(patch.description.is_none());
    }

    #[test]
    fn test_type_without_value_declares_layout() {
        let node = json!({"full_path": "/x", "type": "if"});
        let parameter = parameter_from_node(node.as_object().unwrap()).unwrap();
        assert_eq!(parameter.values, vec![Variant::Int(0), Variant::Float(0.0)]);
        assert_eq!(parameter.ranges.len(), 2);
    }

    #[test]
    fn test_invalid_nodes() {
        let mut map = ParameterMap::new();
        assert!(document_to_map(&json!([1, 2]), &mut map).is_err());
        assert!(document_to_map(&json!({"full_path": "/x", "access": 9}), &mut map).is_err());
        assert!(document_to_map(&json!({"full_path": "/x", "type": "i", "value": ["no"]}), &mut map).is_err());
        assert!(document_to_map(&json!({"contents": 3}), &mut map).is_err());
    }
}

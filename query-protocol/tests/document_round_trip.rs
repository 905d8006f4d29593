//! Namespace document round trips and attribute-only queries

use proptest::prelude::*;
use serde_json::json;

use param_map::{Access, Attribute, Bounding, ClipMode, Parameter, ParameterMap, Range, Variant};
use query_protocol::{attribute_query, document_to_map, map_to_document, QueryRequest, ServerMessage};

// ============================================================================
// Strategies
// ============================================================================

fn address_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(vec!["osc", "gain", "a", "b"]), 1..4)
        .prop_map(|segments| format!("/{}", segments.join("/")))
}

/// A value together with a range of the same tag
fn slot_strategy() -> impl Strategy<Value = (Variant, Range, ClipMode)> {
    let clipmode = prop::sample::select(ClipMode::ALL.to_vec());
    let slot = prop_oneof![
        (any::<i32>(), any::<i32>(), any::<i32>()).prop_map(|(v, a, b)| (Variant::Int(v), Range::new(a.min(b), a.max(b)))),
        (-1.0e4f32..1.0e4f32).prop_map(|v| (Variant::Float(v), Range::new(-1.0e4f32, 1.0e4f32))),
        any::<bool>().prop_map(|b| (Variant::Bool(b), Range::default())),
        "[a-z]{0,6}".prop_map(|s| (
            Variant::String(s),
            Range::enumeration(vec![Variant::from("x"), Variant::from("y")])
        )),
        any::<char>().prop_map(|c| (Variant::Char(c), Range::default())),
        prop::collection::vec(any::<u8>(), 0..6).prop_map(|b| (Variant::Generic(b), Range::default())),
        Just((Variant::Impulse, Range::default())),
        (any::<i32>(), "[a-z]{0,3}").prop_map(|(i, s)| (
            Variant::Tuple(vec![Variant::Int(i), Variant::String(s)]),
            Range::default()
        )),
    ];
    (slot, clipmode).prop_map(|((value, range), clipmode)| (value, range, clipmode))
}

fn parameter_strategy() -> impl Strategy<Value = Parameter> {
    (
        address_strategy(),
        prop::collection::vec(slot_strategy(), 1..4),
        0i64..4,
        "[a-z ]{0,10}",
        prop::collection::vec("[a-z]{1,5}", 0..3),
        prop::sample::select(Bounding::ALL.to_vec()),
        any::<bool>(),
    )
        .prop_map(|(address, slots, access, description, tags, bounding, filter)| {
            let mut parameter = Parameter::new(address)
                .with_access(Access::from_int(access).unwrap_or_default())
                .with_description(description)
                .with_tags(tags)
                .with_bounding(bounding)
                .with_repetition_filter(filter);
            for (value, range, clipmode) in slots {
                parameter.push_value(value, range, clipmode);
            }
            parameter
        })
}

proptest! {
    /// Rendering then reading a map yields an equal map
    #[test]
    fn prop_document_round_trip(parameters in prop::collection::vec(parameter_strategy(), 0..8)) {
        let mut original = ParameterMap::new();
        for parameter in parameters {
            original.upsert(parameter);
        }

        let text = map_to_document(&original, "/").to_string();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();

        let mut decoded = ParameterMap::new();
        let count = document_to_map(&doc, &mut decoded).unwrap();

        prop_assert_eq!(count, original.len());
        prop_assert_eq!(decoded, original);
    }

    /// Type strings survive the document round trip character for character
    #[test]
    fn prop_type_string_preserved(parameter in parameter_strategy()) {
        let mut map = ParameterMap::new();
        map.insert(parameter.clone());

        let mut decoded = ParameterMap::new();
        document_to_map(&map_to_document(&map, "/"), &mut decoded).unwrap();

        let stored = decoded.get(&parameter.destination).unwrap();
        prop_assert_eq!(stored.type_tags(), parameter.type_tags());
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_attribute_only_query() {
    let mut map = ParameterMap::new();
    map.insert(
        Parameter::new("/plop")
            .with_values(vec![Variant::Int(1)])
            .with_access(Access::Both)
            .with_description("plop description")
            .with_tags(["a", "b"]),
    );

    let request = QueryRequest::parse("/plop?description&tags").unwrap();
    let QueryRequest::Attributes { path, attributes } = request else {
        panic!("expected an attribute request");
    };

    let doc = attribute_query(map.get(&path).unwrap(), &attributes);
    assert_eq!(doc, json!({"description": "plop description", "tags": ["a", "b"]}));
    assert!(doc.get("value").is_none());
    assert!(doc.get("access").is_none());
    assert!(doc.get("full_path").is_none());

    let doc = attribute_query(map.get("/plop").unwrap(), &[Attribute::FullPath, Attribute::Value]);
    assert_eq!(doc, json!({"full_path": "/plop", "value": [1]}));
}

#[test]
fn test_change_notification_applies_to_mirror() {
    let mut device = ParameterMap::new();
    device.insert(Parameter::new("/x").with_values(vec![Variant::Float(0.0)]));

    let mut mirror = device.clone();

    device.update("/x", |p| p.values = vec![Variant::Float(0.25)]);
    let node = query_protocol::parameter_to_document(device.get("/x").unwrap());
    let text = ServerMessage::AttributesChanged(node).to_json_string();

    let ServerMessage::AttributesChanged(node) = ServerMessage::parse(&text).unwrap() else {
        panic!("expected attributes_changed");
    };
    document_to_map(&node, &mut mirror).unwrap();
    assert_eq!(mirror, device);
}

//! Variant <-> JSON marshalling
//!
//! JSON alone cannot tell an int from a float or a tuple from a blob, so
//! decoding is guided by a template value whenever one is known (from the
//! node's `type` string, or from the stored parameter being updated).
//! Without a template the tag is inferred from the JSON shape.

use param_map::{ClipMode, Range, Variant};
use serde_json::Value;

use crate::error::{QueryError, Result};

/// JSON form of one value
pub fn variant_to_json(value: &Variant) -> Value {
    match value {
        Variant::None | Variant::Impulse => Value::Null,
        Variant::Bool(b) => Value::Bool(*b),
        Variant::Int(i) => Value::from(*i),
        Variant::Float(f) => Value::from(f64::from(*f)),
        Variant::Char(c) => Value::String(c.to_string()),
        Variant::String(s) => Value::String(s.clone()),
        Variant::Tuple(items) => Value::Array(items.iter().map(variant_to_json).collect()),
        Variant::Generic(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

/// Decode one value, keeping the tag of `template`
pub fn variant_from_json(json: &Value, template: &Variant) -> Result<Variant> {
    let mismatch = || QueryError::InvalidInput(format!("expected {:?}-like value, got {json}", template.kind()));

    let value = match template {
        Variant::None => Variant::None,
        Variant::Impulse => Variant::Impulse,
        Variant::Bool(_) => match json {
            Value::Bool(b) => Variant::Bool(*b),
            Value::Number(n) => Variant::Bool(n.as_f64().is_some_and(|x| x != 0.0)),
            _ => return Err(mismatch()),
        },
        Variant::Int(_) => {
            let n = json.as_i64().or_else(|| json.as_f64().map(|f| f as i64)).ok_or_else(mismatch)?;
            Variant::Int(i32::try_from(n).map_err(|_| mismatch())?)
        }
        // Non-finite floats are written as null
        Variant::Float(_) if json.is_null() => Variant::Float(f32::NAN),
        Variant::Float(_) => Variant::Float(json.as_f64().ok_or_else(mismatch)? as f32),
        Variant::Char(_) => {
            let s = json.as_str().ok_or_else(mismatch)?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Variant::Char(c),
                _ => return Err(mismatch()),
            }
        }
        Variant::String(_) => Variant::String(json.as_str().ok_or_else(mismatch)?.to_string()),
        Variant::Tuple(items) => {
            let array = json.as_array().ok_or_else(mismatch)?;
            if array.len() != items.len() {
                return Err(mismatch());
            }
            let decoded = array
                .iter()
                .zip(items)
                .map(|(j, t)| variant_from_json(j, t))
                .collect::<Result<Vec<_>>>()?;
            Variant::Tuple(decoded)
        }
        Variant::Generic(_) => match json {
            Value::Array(bytes) => Variant::Generic(
                bytes
                    .iter()
                    .map(|b| b.as_u64().and_then(|n| u8::try_from(n).ok()).ok_or_else(mismatch))
                    .collect::<Result<Vec<u8>>>()?,
            ),
            Value::String(s) => Variant::Generic(s.as_bytes().to_vec()),
            _ => return Err(mismatch()),
        },
    };
    Ok(value)
}

/// Decode one value, inferring its tag from the JSON shape
pub fn infer_variant(json: &Value) -> Result<Variant> {
    let value = match json {
        Value::Null => Variant::None,
        Value::Bool(b) => Variant::Bool(*b),
        Value::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
            Some(i) => Variant::Int(i),
            None => Variant::Float(n.as_f64().unwrap_or_default() as f32),
        },
        Value::String(s) => Variant::String(s.clone()),
        Value::Array(items) => Variant::Tuple(items.iter().map(infer_variant).collect::<Result<_>>()?),
        Value::Object(_) => {
            return Err(QueryError::InvalidInput(format!("object is not a value: {json}")));
        }
    };
    Ok(value)
}

/// JSON array of a value list
pub fn values_to_json(values: &[Variant]) -> Value {
    Value::Array(values.iter().map(variant_to_json).collect())
}

/// Decode a value array using `templates` element-wise when given
///
/// Extra JSON elements beyond the templates are inferred.
pub fn values_from_json(json: &Value, templates: Option<&[Variant]>) -> Result<Vec<Variant>> {
    let array = as_array(json, "value")?;
    array
        .iter()
        .enumerate()
        .map(|(idx, item)| match templates.and_then(|t| t.get(idx)) {
            Some(template) => variant_from_json(item, template),
            None => infer_variant(item),
        })
        .collect()
}

/// `[min|null, max|null, [enum...]|null]`
pub fn range_to_json(range: &Range) -> Value {
    let bound = |b: &Option<Variant>| b.as_ref().map(variant_to_json).unwrap_or(Value::Null);
    let values = if range.values.is_empty() {
        Value::Null
    } else {
        values_to_json(&range.values)
    };
    Value::Array(vec![bound(&range.min), bound(&range.max), values])
}

pub fn range_from_json(json: &Value, template: Option<&Variant>) -> Result<Range> {
    let parts = as_array(json, "range")?;
    if parts.len() != 3 {
        return Err(QueryError::InvalidInput(format!("range must have 3 elements: {json}")));
    }

    let decode = |j: &Value| -> Result<Option<Variant>> {
        if j.is_null() {
            return Ok(None);
        }
        match template {
            Some(t) if !matches!(t, Variant::None | Variant::Impulse) => variant_from_json(j, t).map(Some),
            _ => infer_variant(j).map(Some),
        }
    };

    let values = match &parts[2] {
        Value::Null => Vec::new(),
        other => as_array(other, "range values")?
            .iter()
            .map(|j| decode(j).map(|v| v.unwrap_or_default()))
            .collect::<Result<_>>()?,
    };

    Ok(Range {
        min: decode(&parts[0])?,
        max: decode(&parts[1])?,
        values,
    })
}

pub fn ranges_to_json(ranges: &[Range]) -> Value {
    Value::Array(ranges.iter().map(range_to_json).collect())
}

pub fn ranges_from_json(json: &Value, templates: Option<&[Variant]>) -> Result<Vec<Range>> {
    as_array(json, "range")?
        .iter()
        .enumerate()
        .map(|(idx, r)| range_from_json(r, templates.and_then(|t| t.get(idx))))
        .collect()
}

pub fn clipmodes_to_json(clipmodes: &[ClipMode]) -> Value {
    Value::Array(clipmodes.iter().map(|c| Value::from(c.as_str())).collect())
}

pub fn clipmodes_from_json(json: &Value) -> Result<Vec<ClipMode>> {
    as_array(json, "clipmode")?
        .iter()
        .map(|c| {
            let text = c
                .as_str()
                .ok_or_else(|| QueryError::InvalidInput(format!("clipmode must be a string: {c}")))?;
            Ok(text.parse::<ClipMode>()?)
        })
        .collect()
}

pub(crate) fn as_array<'a>(json: &'a Value, what: &str) -> Result<&'a Vec<Value>> {
    json.as_array()
        .ok_or_else(|| QueryError::InvalidInput(format!("{what} must be an array: {json}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_keeps_int_tag() {
        let decoded = variant_from_json(&json!(3.0), &Variant::Int(0)).unwrap();
        assert_eq!(decoded, Variant::Int(3));

        let decoded = variant_from_json(&json!(3), &Variant::Float(0.0)).unwrap();
        assert_eq!(decoded, Variant::Float(3.0));
    }

    #[test]
    fn test_null_float_decodes_to_nan() {
        assert_eq!(variant_to_json(&Variant::Float(f32::INFINITY)), Value::Null);
        match variant_from_json(&Value::Null, &Variant::Float(0.0)).unwrap() {
            Variant::Float(f) => assert!(f.is_nan()),
            other => panic!("expected a float, got {other:?}"),
        }
        assert!(variant_from_json(&Value::Null, &Variant::Int(0)).is_err());
    }

    #[test]
    fn test_template_rejects_incompatible_shape() {
        assert!(variant_from_json(&json!("x"), &Variant::Float(0.0)).is_err());
        assert!(variant_from_json(&json!([1, 2]), &Variant::Int(0)).is_err());
        assert!(variant_from_json(&json!("ab"), &Variant::Char('a')).is_err());
    }

    #[test]
    fn test_infer_variant() {
        assert_eq!(infer_variant(&json!(1)).unwrap(), Variant::Int(1));
        assert_eq!(infer_variant(&json!(1.5)).unwrap(), Variant::Float(1.5));
        assert_eq!(infer_variant(&json!(null)).unwrap(), Variant::None);
        assert_eq!(
            infer_variant(&json!([true, "a"])).unwrap(),
            Variant::Tuple(vec![Variant::Bool(true), Variant::from("a")])
        );
        assert!(infer_variant(&json!({"a": 1})).is_err());
    }

    #[test]
    fn test_blob_as_byte_array() {
        let blob = Variant::Generic(vec![0, 127, 255]);
        let json = variant_to_json(&blob);
        assert_eq!(json, json!([0, 127, 255]));
        assert_eq!(variant_from_json(&json, &Variant::Generic(vec![])).unwrap(), blob);
    }

    #[test]
    fn test_range_shape() {
        let range = Range::new(0, 10);
        assert_eq!(range_to_json(&range), json!([0, 10, null]));

        let only_max = Range {
            min: None,
            max: Some(Variant::Float(1.0)),
            values: vec![],
        };
        let json = range_to_json(&only_max);
        assert_eq!(json, json!([null, 1.0, null]));
        assert_eq!(range_from_json(&json, Some(&Variant::Float(0.0))).unwrap(), only_max);
    }

    #[test]
    fn test_range_enumeration() {
        let range = Range::enumeration(vec![Variant::from("sine"), Variant::from("square")]);
        let json = range_to_json(&range);
        assert_eq!(json, json!([null, null, ["sine", "square"]]));
        assert_eq!(range_from_json(&json, Some(&Variant::from(""))).unwrap(), range);
    }

    #[test]
    fn test_clipmodes() {
        let modes = vec![ClipMode::None, ClipMode::Both];
        let json = clipmodes_to_json(&modes);
        assert_eq!(json, json!(["None", "Both"]));
        assert_eq!(clipmodes_from_json(&json).unwrap(), modes);
        assert!(clipmodes_from_json(&json!(["Sideways"])).is_err());
    }
}

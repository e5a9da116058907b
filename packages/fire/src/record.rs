//! Conversion of raw JSON features into [`FireRecord`]s.
//!
//! Field names follow the USGS combined wildland fire dataset. A feature
//! is either a flat object carrying those fields plus `rings`, or an Esri
//! feature with `attributes` and `geometry.rings`.

use serde_json::{Map, Value};
use smoke_fire_models::{FireRecord, FireType, Ring};

use crate::FireDataError;

pub const YEAR_FIELD: &str = "Fire_Year";
pub const ID_FIELD: &str = "USGS_Assigned_ID";
pub const NAME_FIELD: &str = "Listed_Fire_Names";
pub const ACRES_FIELD: &str = "GIS_Acres";
pub const TYPE_FIELD: &str = "Assigned_Fire_Type";
pub const RINGS_FIELD: &str = "rings";

/// Parses one feature of either layout.
///
/// # Errors
///
/// Returns [`FireDataError::MalformedRecord`] when a required attribute
/// is missing or mistyped, when the rings are not arrays of numeric
/// pairs, or when the perimeter has no vertices.
pub fn parse_record(value: &Value) -> Result<FireRecord, FireDataError> {
    let (attributes, rings) = split_feature(value)?;

    let year = parse_year(required(attributes, YEAR_FIELD)?)?;
    let id = id_string(required(attributes, ID_FIELD)?)
        .ok_or_else(|| FireDataError::malformed(format!("{ID_FIELD} is not a string or number")))?;
    let name = match attributes.get(NAME_FIELD) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(name)) => name.clone(),
        Some(other) => other.to_string(),
    };
    let size_acres = number(required(attributes, ACRES_FIELD)?).ok_or_else(|| {
        FireDataError::malformed(format!("{ACRES_FIELD} is not numeric"))
    })?;
    let fire_type = attributes
        .get(TYPE_FIELD)
        .and_then(Value::as_str)
        .map_or(FireType::Unknown, FireType::from_label);

    let rings = parse_rings(rings.ok_or_else(|| FireDataError::malformed("missing perimeter rings"))?)?;
    if rings.iter().all(Vec::is_empty) {
        return Err(FireDataError::malformed("perimeter has no vertices"));
    }

    Ok(FireRecord {
        year,
        id,
        name,
        size_acres,
        fire_type,
        rings,
    })
}

/// Key identifying a feature in skip reports: its USGS id when one can be
/// read, else its position in the input.
#[must_use]
pub fn record_key(value: &Value, ordinal: u64) -> String {
    split_feature(value)
        .ok()
        .and_then(|(attributes, _)| attributes.get(ID_FIELD))
        .and_then(id_string)
        .unwrap_or_else(|| format!("feature #{ordinal}"))
}

fn split_feature(value: &Value) -> Result<(&Map<String, Value>, Option<&Value>), FireDataError> {
    let object = value
        .as_object()
        .ok_or_else(|| FireDataError::malformed("feature is not a JSON object"))?;

    match object.get("attributes") {
        Some(attributes) => {
            let attributes = attributes
                .as_object()
                .ok_or_else(|| FireDataError::malformed("attributes is not an object"))?;
            let rings = object
                .get("geometry")
                .and_then(|geometry| geometry.get(RINGS_FIELD));
            Ok((attributes, rings))
        }
        None => Ok((object, object.get(RINGS_FIELD))),
    }
}

fn required<'a>(attributes: &'a Map<String, Value>, field: &str) -> Result<&'a Value, FireDataError> {
    match attributes.get(field) {
        None | Some(Value::Null) => Err(FireDataError::malformed(format!("missing {field}"))),
        Some(value) => Ok(value),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn parse_year(value: &Value) -> Result<i32, FireDataError> {
    let year = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    year.and_then(|year| i32::try_from(year).ok())
        .ok_or_else(|| FireDataError::malformed(format!("{YEAR_FIELD} is not an integer: {value}")))
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn parse_rings(value: &Value) -> Result<Vec<Ring>, FireDataError> {
    let rings = value
        .as_array()
        .ok_or_else(|| FireDataError::malformed("rings is not an array"))?;

    rings
        .iter()
        .enumerate()
        .map(|(ring_index, ring)| {
            let vertices = ring.as_array().ok_or_else(|| {
                FireDataError::malformed(format!("ring {ring_index} is not an array"))
            })?;
            vertices
                .iter()
                .enumerate()
                .map(|(vertex_index, vertex)| {
                    parse_vertex(vertex).ok_or_else(|| {
                        FireDataError::malformed(format!(
                            "ring {ring_index} vertex {vertex_index} is not a coordinate pair: {vertex}"
                        ))
                    })
                })
                .collect()
        })
        .collect()
}

/// Reads `[x, y]`, ignoring any trailing z/m values.
fn parse_vertex(vertex: &Value) -> Option<[f64; 2]> {
    match vertex.as_array()?.as_slice() {
        [x, y, ..] => Some([x.as_f64()?, y.as_f64()?]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn assert_malformed(value: &Value, needle: &str) {
        match parse_record(value) {
            Err(FireDataError::MalformedRecord { message }) => {
                assert!(message.contains(needle), "{message:?} does not mention {needle:?}");
            }
            other => panic!("expected MalformedRecord, got {other:?}"),
        }
    }

    #[test]
    fn parses_flat_record() {
        let value = json!({
            "Fire_Year": 2018,
            "USGS_Assigned_ID": 1234,
            "Listed_Fire_Names": "MENDOCINO COMPLEX (3)",
            "GIS_Acres": 459_123.5,
            "Assigned_Fire_Type": "Wildfire",
            "rings": [[[-123.0, 39.0], [-122.9, 39.1], [-123.0, 39.0]]]
        });

        let record = parse_record(&value).unwrap();
        assert_eq!(record.year, 2018);
        assert_eq!(record.id, "1234");
        assert_eq!(record.name, "MENDOCINO COMPLEX (3)");
        assert!((record.size_acres - 459_123.5).abs() < 1e-9);
        assert_eq!(record.fire_type, FireType::Wildfire);
        assert_eq!(record.vertex_count(), 3);
    }

    #[test]
    fn parses_esri_feature() {
        let value = json!({
            "attributes": {
                "OBJECTID": 7,
                "Fire_Year": "1999",
                "USGS_Assigned_ID": " 88 ",
                "Listed_Fire_Names": null,
                "GIS_Acres": "12.25",
                "Assigned_Fire_Type": "Unknown - Likely Wildfire"
            },
            "geometry": { "rings": [[[100.0, 200.0, 0.0], [150.0, 250.0, 0.0]], []] }
        });

        let record = parse_record(&value).unwrap();
        assert_eq!(record.year, 1999);
        assert_eq!(record.id, "88");
        assert_eq!(record.name, "");
        assert_eq!(record.fire_type, FireType::LikelyWildfire);
        assert_eq!(record.rings[0][1], [150.0, 250.0]);
        assert!(record.rings[1].is_empty());
    }

    #[test]
    fn missing_type_is_unknown() {
        let value = json!({
            "Fire_Year": 2001, "USGS_Assigned_ID": 1, "GIS_Acres": 1.0,
            "rings": [[[0.0, 0.0]]]
        });
        assert_eq!(parse_record(&value).unwrap().fire_type, FireType::Unknown);
    }

    #[test]
    fn malformed_records() {
        assert_malformed(&json!([1, 2]), "not a JSON object");
        assert_malformed(
            &json!({ "USGS_Assigned_ID": 1, "GIS_Acres": 1.0, "rings": [[[0.0, 0.0]]] }),
            "missing Fire_Year",
        );
        assert_malformed(
            &json!({ "Fire_Year": 2001.5, "USGS_Assigned_ID": 1, "GIS_Acres": 1.0, "rings": [[[0.0, 0.0]]] }),
            "not an integer",
        );
        assert_malformed(
            &json!({ "Fire_Year": 2001, "USGS_Assigned_ID": 1, "GIS_Acres": "lots", "rings": [[[0.0, 0.0]]] }),
            "GIS_Acres",
        );
        assert_malformed(
            &json!({ "Fire_Year": 2001, "USGS_Assigned_ID": 1, "GIS_Acres": 1.0 }),
            "missing perimeter rings",
        );
        assert_malformed(
            &json!({ "Fire_Year": 2001, "USGS_Assigned_ID": 1, "GIS_Acres": 1.0, "rings": [[], []] }),
            "no vertices",
        );
        assert_malformed(
            &json!({ "Fire_Year": 2001, "USGS_Assigned_ID": 1, "GIS_Acres": 1.0, "rings": [[[0.0, "x"]]] }),
            "ring 0 vertex 0",
        );
        assert_malformed(
            &json!({ "attributes": { "Fire_Year": 2001, "USGS_Assigned_ID": 1, "GIS_Acres": 1.0 }, "geometry": null }),
            "missing perimeter rings",
        );
    }

    #[test]
    fn record_key_falls_back_to_ordinal() {
        assert_eq!(record_key(&json!({ "USGS_Assigned_ID": 55 }), 3), "55");
        assert_eq!(
            record_key(&json!({ "attributes": { "USGS_Assigned_ID": "A-1" } }), 3),
            "A-1"
        );
        assert_eq!(record_key(&json!({ "rings": [] }), 3), "feature #3");
        assert_eq!(record_key(&json!("garbage"), 9), "feature #9");
    }
}

//! Task response parsing
//!
//! [`parse_value`] is the single mapping from a task's declared type to a
//! [`Value`] variant. `Ok(None)` means "no value" (e.g. blank text); `Err`
//! is a malformed field that callers log and omit.

use chrono::{DateTime, NaiveTime, Utc};
use serde_json::{Map, Value as JsonValue, json};

use fieldkit_core::{
    CaptureLocationResult, FieldError, Geometry, MultipleChoiceSelection, Task, TaskType, Value,
    json_type_name,
};

use crate::geometry::{self, GeometryEncoder, geometry_from_map};
use crate::timestamp::{timestamp_from_wire, timestamp_to_wire};

const CAPTURE_GEOMETRY: &str = "geometry";
const CAPTURE_ALTITUDE: &str = "altitude";
const CAPTURE_ACCURACY: &str = "accuracy";

fn wrong_type(expected: &'static str, found: &JsonValue) -> FieldError {
    FieldError::WrongType {
        expected,
        found: json_type_name(found).to_string(),
    }
}

/// Parse a raw response under the rules of `task`'s declared type
pub fn parse_value(task: &Task, raw: &JsonValue) -> Result<Option<Value>, FieldError> {
    match &task.task_type {
        TaskType::Text | TaskType::Photo => {
            let text = raw.as_str().ok_or_else(|| wrong_type("string", raw))?;
            Ok(Value::text(text))
        }
        TaskType::Number => {
            let number = raw.as_f64().ok_or_else(|| wrong_type("number", raw))?;
            Ok(Value::number(number))
        }
        TaskType::Date => Ok(Some(Value::Date(timestamp_from_wire(raw)?.date_naive()))),
        TaskType::Time => Ok(Some(Value::Time(timestamp_from_wire(raw)?.time()))),
        TaskType::MultipleChoice => parse_multiple_choice(raw),
        TaskType::DropPin => parse_geometry(raw, geometry::POINT).map(Some),
        TaskType::DrawArea => parse_geometry(raw, geometry::POLYGON).map(Some),
        TaskType::CaptureLocation => parse_capture_location(raw).map(Some),
        TaskType::Unknown(tag) => Err(FieldError::WrongType {
            expected: "a response to a known task type",
            found: format!("task type '{tag}'"),
        }),
    }
}

/// Option ids, in order; cardinality is not checked here
fn parse_multiple_choice(raw: &JsonValue) -> Result<Option<Value>, FieldError> {
    let entries = raw.as_array().ok_or_else(|| wrong_type("list", raw))?;
    let ids = entries
        .iter()
        .map(|entry| {
            entry
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| wrong_type("string", entry))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MultipleChoiceSelection::from_ids(ids).map(Value::MultipleChoice))
}

fn geometry_map<'a>(
    raw: &'a JsonValue,
    expected: &'static str,
) -> Result<&'a Map<String, JsonValue>, FieldError> {
    let map = raw.as_object().ok_or_else(|| wrong_type("map", raw))?;
    match map.get(geometry::TYPE).and_then(JsonValue::as_str) {
        Some(found) if found == expected => Ok(map),
        found => Err(FieldError::UnexpectedGeometry {
            expected,
            found: found.unwrap_or("nothing").to_string(),
        }),
    }
}

fn parse_geometry(raw: &JsonValue, expected: &'static str) -> Result<Value, FieldError> {
    let map = geometry_map(raw, expected)?;
    Ok(Value::Geometry(geometry_from_map(map)?))
}

fn optional_number(
    map: &Map<String, JsonValue>,
    field: &'static str,
) -> Result<Option<f64>, FieldError> {
    match map.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| wrong_type("number", value)),
    }
}

/// Decode `{"geometry": Point, "altitude"?, "accuracy"?}`
pub fn parse_capture_location(raw: &JsonValue) -> Result<Value, FieldError> {
    let map = raw.as_object().ok_or_else(|| wrong_type("map", raw))?;
    let location_raw = map
        .get(CAPTURE_GEOMETRY)
        .ok_or(FieldError::MissingField(CAPTURE_GEOMETRY))?;
    let location = match geometry_from_map(geometry_map(location_raw, geometry::POINT)?)? {
        Geometry::Point(point) => point,
        other => {
            return Err(FieldError::UnexpectedGeometry {
                expected: geometry::POINT,
                found: other.type_name().to_string(),
            });
        }
    };
    Ok(Value::CaptureLocation(CaptureLocationResult {
        location,
        altitude: optional_number(map, CAPTURE_ALTITUDE)?,
        accuracy: optional_number(map, CAPTURE_ACCURACY)?,
    }))
}

/// Encode a value in the wire shape its task type expects
pub fn value_to_wire(value: &Value, encoder: &GeometryEncoder) -> JsonValue {
    match value {
        Value::Text(text) => json!(text),
        Value::Number(n) => json!(n),
        Value::Date(date) => timestamp_to_wire(date.and_time(NaiveTime::MIN).and_utc()),
        Value::Time(time) => timestamp_to_wire(
            DateTime::<Utc>::UNIX_EPOCH
                .date_naive()
                .and_time(*time)
                .and_utc(),
        ),
        Value::MultipleChoice(selection) => json!(selection.option_ids),
        Value::Geometry(geometry) => encoder.encode(geometry),
        Value::CaptureLocation(result) => {
            let mut map = Map::new();
            map.insert(
                CAPTURE_GEOMETRY.to_string(),
                encoder.encode(&Geometry::Point(result.location)),
            );
            if let Some(altitude) = result.altitude {
                map.insert(CAPTURE_ALTITUDE.to_string(), json!(altitude));
            }
            if let Some(accuracy) = result.accuracy {
                map.insert(CAPTURE_ACCURACY.to_string(), json!(accuracy));
            }
            JsonValue::Object(map)
        }
    }
}

//! Geometry conversion between the wire shape and typed geometry
//!
//! Wire shape: `{"type": "Point" | "Polygon" | "MultiPolygon", "coordinates": [...]}`
//! with `[x, y]` positions. `MultiPolygon` is recognized but unsupported.

use serde_json::{Map, Value as JsonValue, json};

use fieldkit_core::{
    Coordinate, Geometry, GeometryError, LinearRing, Point, Polygon, json_type_name,
};

pub const TYPE: &str = "type";
pub const COORDINATES: &str = "coordinates";
pub const POINT: &str = "Point";
pub const POLYGON: &str = "Polygon";
pub const MULTI_POLYGON: &str = "MultiPolygon";

/// Decimal places kept when encoding coordinates
pub const DEFAULT_COORDINATE_PRECISION: u32 = 8;

/// Decode a wire geometry
pub fn geometry_from_wire(value: &JsonValue) -> Result<Geometry, GeometryError> {
    let map = value.as_object().ok_or_else(|| {
        GeometryError::InvalidShape(format!("expected a map, found {}", json_type_name(value)))
    })?;
    geometry_from_map(map)
}

/// Decode a wire geometry that is already known to be a map
pub fn geometry_from_map(map: &Map<String, JsonValue>) -> Result<Geometry, GeometryError> {
    let type_name = map
        .get(TYPE)
        .and_then(JsonValue::as_str)
        .ok_or(GeometryError::MissingField(TYPE))?;
    let coordinates = map
        .get(COORDINATES)
        .ok_or(GeometryError::MissingField(COORDINATES))?;

    match type_name {
        POINT => Ok(Geometry::Point(Point {
            coordinate: parse_position(coordinates)?,
        })),
        POLYGON => parse_polygon(coordinates).map(Geometry::Polygon),
        MULTI_POLYGON => Err(GeometryError::Unsupported(MULTI_POLYGON.to_string())),
        other => Err(GeometryError::UnknownType(other.to_string())),
    }
}

fn as_list<'a>(value: &'a JsonValue, what: &str) -> Result<&'a Vec<JsonValue>, GeometryError> {
    value.as_array().ok_or_else(|| {
        GeometryError::InvalidCoordinates(format!(
            "{what} must be a list, found {}",
            json_type_name(value)
        ))
    })
}

fn parse_position(value: &JsonValue) -> Result<Coordinate, GeometryError> {
    let parts = as_list(value, "position")?;
    let [x, y] = parts.as_slice() else {
        return Err(GeometryError::InvalidCoordinates(format!(
            "position must have 2 values, found {}",
            parts.len()
        )));
    };
    match (x.as_f64(), y.as_f64()) {
        (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Ok(Coordinate::new(x, y)),
        _ => Err(GeometryError::InvalidCoordinates(format!(
            "position values must be numbers, found [{x}, {y}]"
        ))),
    }
}

fn parse_polygon(value: &JsonValue) -> Result<Polygon, GeometryError> {
    let rings = as_list(value, "polygon")?
        .iter()
        .enumerate()
        .map(|(index, ring)| {
            let coordinates = as_list(ring, "ring")?
                .iter()
                .map(parse_position)
                .collect::<Result<Vec<_>, _>>()?;
            LinearRing::new(coordinates, index)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut rings = rings.into_iter();
    let shell = rings.next().ok_or(GeometryError::EmptyPolygon)?;
    Ok(Polygon::new(shell, rings.collect()))
}

/// Encodes typed geometry back to the wire shape
///
/// Coordinates are rounded to `precision` decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryEncoder {
    precision: u32,
}

impl Default for GeometryEncoder {
    fn default() -> Self {
        Self::with_precision(DEFAULT_COORDINATE_PRECISION)
    }
}

impl GeometryEncoder {
    pub fn with_precision(precision: u32) -> Self {
        Self { precision }
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn encode(&self, geometry: &Geometry) -> JsonValue {
        match geometry {
            Geometry::Point(point) => json!({
                TYPE: POINT,
                COORDINATES: self.position(&point.coordinate),
            }),
            Geometry::Polygon(polygon) => json!({
                TYPE: POLYGON,
                COORDINATES: polygon
                    .rings()
                    .map(|ring| self.ring(ring))
                    .collect::<Vec<_>>(),
            }),
        }
    }

    fn ring(&self, ring: &LinearRing) -> JsonValue {
        JsonValue::Array(ring.coordinates().iter().map(|c| self.position(c)).collect())
    }

    fn position(&self, coordinate: &Coordinate) -> JsonValue {
        json!([self.round(coordinate.x), self.round(coordinate.y)])
    }

    fn round(&self, value: f64) -> f64 {
        let scale = 10f64.powi(self.precision as i32);
        (value * scale).round() / scale
    }
}

/// Encode with [`DEFAULT_COORDINATE_PRECISION`]
pub fn geometry_to_wire(geometry: &Geometry) -> JsonValue {
    GeometryEncoder::default().encode(geometry)
}

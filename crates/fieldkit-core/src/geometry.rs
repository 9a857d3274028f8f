//! Typed geometry values
//!
//! Only points and polygons exist in the model. A [`LinearRing`] can only be
//! constructed closed, so every [`Polygon`] in memory is valid.

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Minimum number of coordinates in a closed ring (triangle plus closing point)
pub const MIN_RING_COORDINATES: usize = 4;

/// A planar coordinate (`x` = longitude, `y` = latitude)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A single position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub coordinate: Coordinate,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            coordinate: Coordinate::new(x, y),
        }
    }
}

/// A closed sequence of coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coordinate>", into = "Vec<Coordinate>")]
pub struct LinearRing {
    coordinates: Vec<Coordinate>,
}

impl LinearRing {
    /// Build a ring, checking closure and minimum length
    ///
    /// `index` is the ring's position within its polygon and only feeds the
    /// error message.
    pub fn new(coordinates: Vec<Coordinate>, index: usize) -> Result<Self, GeometryError> {
        if coordinates.len() < MIN_RING_COORDINATES {
            return Err(GeometryError::RingTooShort {
                ring: index,
                len: coordinates.len(),
            });
        }
        if coordinates.first() != coordinates.last() {
            return Err(GeometryError::RingNotClosed { ring: index });
        }
        Ok(Self { coordinates })
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }
}

impl TryFrom<Vec<Coordinate>> for LinearRing {
    type Error = GeometryError;

    fn try_from(coordinates: Vec<Coordinate>) -> Result<Self, Self::Error> {
        LinearRing::new(coordinates, 0)
    }
}

impl From<LinearRing> for Vec<Coordinate> {
    fn from(ring: LinearRing) -> Self {
        ring.coordinates
    }
}

/// A shell ring with zero or more holes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub shell: LinearRing,
    pub holes: Vec<LinearRing>,
}

impl Polygon {
    pub fn new(shell: LinearRing, holes: Vec<LinearRing>) -> Self {
        Self { shell, holes }
    }

    /// All rings, shell first
    pub fn rings(&self) -> impl Iterator<Item = &LinearRing> {
        std::iter::once(&self.shell).chain(self.holes.iter())
    }
}

/// Geometry attached to an LOI or captured by a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point(Point),
    Polygon(Polygon),
}

impl Geometry {
    /// The wire type tag for this geometry
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::Polygon(_) => "Polygon",
        }
    }

    pub fn as_point(&self) -> Option<&Point> {
        match self {
            Geometry::Point(p) => Some(p),
            Geometry::Polygon(_) => None,
        }
    }

    pub fn as_polygon(&self) -> Option<&Polygon> {
        match self {
            Geometry::Polygon(p) => Some(p),
            Geometry::Point(_) => None,
        }
    }
}

impl From<Point> for Geometry {
    fn from(point: Point) -> Self {
        Geometry::Point(point)
    }
}

impl From<Polygon> for Geometry {
    fn from(polygon: Polygon) -> Self {
        Geometry::Polygon(polygon)
    }
}

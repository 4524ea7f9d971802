//! `GeoJSON` feature records and their identity keys.
//!
//! Event payloads arrive as text and are decoded through a validating
//! step: the JSON must be an object, any `type` member must be
//! `"Feature"`, the geometry (if any) must be a well-formed `GeoJSON`
//! geometry, and a top-level `id` must be a string or a number.
//! Anything else is a [`DecodeError`] rather than a half-built record.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};

/// A single coordinate: `[x, y]` or `[x, y, z]`.
pub type Position = Vec<f64>;

/// Largest magnitude at which every integer is exactly representable
/// as an `f64` (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Errors produced while decoding an event payload into a [`Feature`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not valid JSON or not a JSON object.
    #[error("malformed feature JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload declares a `type` other than `Feature`.
    #[error("expected a GeoJSON Feature, found type {found:?}")]
    NotAFeature {
        /// The `type` member that was present.
        found: String,
    },

    /// The `geometry` member is not a valid `GeoJSON` geometry.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The top-level `id` member is neither a string nor a number.
    #[error("feature id must be a string or a number, found {0}")]
    InvalidId(Value),
}

/// A `GeoJSON` geometry object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    /// A single position.
    Point {
        /// The position.
        coordinates: Position,
    },
    /// Several unconnected positions.
    MultiPoint {
        /// The positions.
        coordinates: Vec<Position>,
    },
    /// A path through two or more positions.
    LineString {
        /// The path.
        coordinates: Vec<Position>,
    },
    /// Several paths.
    MultiLineString {
        /// The paths.
        coordinates: Vec<Vec<Position>>,
    },
    /// An exterior ring followed by optional interior rings (holes).
    Polygon {
        /// The rings.
        coordinates: Vec<Vec<Position>>,
    },
    /// Several polygons.
    MultiPolygon {
        /// The polygons.
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    /// A heterogeneous set of geometries.
    GeometryCollection {
        /// The member geometries.
        geometries: Vec<Self>,
    },
}

impl Geometry {
    /// Check the structural rules `GeoJSON` places on coordinates.
    ///
    /// Positions need at least two coordinates, line strings at least two
    /// positions, and polygon rings at least four positions with the last
    /// equal to the first.
    pub fn validate(&self) -> Result<(), DecodeError> {
        match self {
            Self::Point { coordinates } => check_position(coordinates),
            Self::MultiPoint { coordinates } => coordinates.iter().try_for_each(|p| check_position(p)),
            Self::LineString { coordinates } => check_line(coordinates),
            Self::MultiLineString { coordinates } => coordinates.iter().try_for_each(|l| check_line(l)),
            Self::Polygon { coordinates } => check_polygon(coordinates),
            Self::MultiPolygon { coordinates } => {
                coordinates.iter().try_for_each(|p| check_polygon(p))
            }
            Self::GeometryCollection { geometries } => geometries.iter().try_for_each(Self::validate),
        }
    }
}

fn check_position(position: &[f64]) -> Result<(), DecodeError> {
    if position.len() < 2 {
        return Err(DecodeError::InvalidGeometry(format!(
            "position needs at least 2 coordinates, found {}",
            position.len()
        )));
    }
    Ok(())
}

fn check_line(line: &[Position]) -> Result<(), DecodeError> {
    if line.len() < 2 {
        return Err(DecodeError::InvalidGeometry(format!(
            "line string needs at least 2 positions, found {}",
            line.len()
        )));
    }
    line.iter().try_for_each(|p| check_position(p))
}

fn check_polygon(rings: &[Vec<Position>]) -> Result<(), DecodeError> {
    for ring in rings {
        if ring.len() < 4 {
            return Err(DecodeError::InvalidGeometry(format!(
                "linear ring needs at least 4 positions, found {}",
                ring.len()
            )));
        }
        ring.iter().try_for_each(|p| check_position(p))?;
        if ring.first() != ring.last() {
            return Err(DecodeError::InvalidGeometry(
                "linear ring is not closed".to_owned(),
            ));
        }
    }
    Ok(())
}

/// The identity value of a feature under some property name.
///
/// Only strings and numbers act as keys. Numbers are normalized so that
/// `1` and `1.0` compare equal, while `"1"` and `1` never do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureKey {
    /// A string key.
    Text(String),
    /// A numeric key.
    Number(Number),
}

impl FeatureKey {
    /// Extract a key from a JSON value.
    ///
    /// Returns `None` for `null`, booleans, arrays, and objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Number(n) => Some(Self::Number(normalize_number(n))),
            Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Convert back into a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Number(n) => Value::Number(n.clone()),
        }
    }
}

impl From<&str> for FeatureKey {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for FeatureKey {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for FeatureKey {
    fn from(n: i64) -> Self {
        Self::Number(Number::from(n))
    }
}

impl core::fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Collapse integral floats onto the integer representation.
fn normalize_number(n: &Number) -> Number {
    if let Some(f) = n.as_f64().filter(|_| n.is_f64()) {
        if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER {
            #[allow(clippy::cast_possible_truncation)]
            return Number::from(f as i64);
        }
    }
    n.clone()
}

/// A `GeoJSON` Feature: optional id, optional geometry, and a property bag.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Feature {
    /// The top-level `id` member, if present.
    pub id: Option<FeatureKey>,
    /// The geometry, or `None` for `null`/absent geometry.
    pub geometry: Option<Geometry>,
    /// The property bag. Missing or `null` properties decode as empty.
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Create a feature with the given geometry and no properties.
    pub fn new(geometry: Option<Geometry>) -> Self {
        Self {
            id: None,
            geometry,
            properties: Map::new(),
        }
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Decode one event payload.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let object: Map<String, Value> = serde_json::from_str(text)?;
        Self::try_from(object)
    }

    /// Look up a property by name.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// The identity key stored under `field`, if it is a usable key.
    pub fn key(&self, field: &str) -> Option<FeatureKey> {
        self.properties.get(field).and_then(FeatureKey::from_value)
    }
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", "Feature")?;
        if let Some(id) = &self.id {
            map.serialize_entry("id", id)?;
        }
        map.serialize_entry("geometry", &self.geometry)?;
        map.serialize_entry("properties", &self.properties)?;
        map.end()
    }
}

impl TryFrom<Map<String, Value>> for Feature {
    type Error = DecodeError;

    fn try_from(object: Map<String, Value>) -> Result<Self, Self::Error> {
        let raw: RawFeature = serde_json::from_value(Value::Object(object))?;
        Self::try_from(raw)
    }
}

/// Wire shape accepted before validation.
#[derive(Debug, Deserialize)]
struct RawFeature {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    geometry: Option<Value>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

impl TryFrom<RawFeature> for Feature {
    type Error = DecodeError;

    fn try_from(raw: RawFeature) -> Result<Self, Self::Error> {
        if let Some(kind) = raw.kind {
            if kind != "Feature" {
                return Err(DecodeError::NotAFeature { found: kind });
            }
        }

        let id = match raw.id {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                FeatureKey::from_value(&value).ok_or(DecodeError::InvalidId(value))?,
            ),
        };

        let geometry = match raw.geometry {
            None | Some(Value::Null) => None,
            Some(value) => {
                let geometry: Geometry = serde_json::from_value(value)
                    .map_err(|e| DecodeError::InvalidGeometry(e.to_string()))?;
                geometry.validate()?;
                Some(geometry)
            }
        };

        Ok(Self {
            id,
            geometry,
            properties: raw.properties.unwrap_or_default(),
        })
    }
}

//
// Copyright (c) geolayers contributors. All rights reserved.
//

//! Write the geometry model as [GeoJSON](https://datatracker.ietf.org/doc/html/rfc7946).
//!
//! ```rust
//! use geolayers::{geojson, Feature, FeatureCollection, Geometry, Point};
//!
//! let point = Feature::new(Geometry::Point(Point::new(10.0, -20.0)));
//! let text = geojson::to_string(&FeatureCollection::from(vec![point])).unwrap();
//! assert!(text.starts_with(r#"{"type":"FeatureCollection","features":[{"type":"Feature""#));
//! assert!(text.contains(r#""geometry":{"type":"Point","coordinates":[10.0,-20.0]}"#));
//! ```

use crate::error::Result;
use crate::types::{
    AttributeRecord, AttributeValue, Feature, FeatureCollection, Geometry, LineString,
    MultiLineString, Point, Polygon,
};
use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};

// Largest integer an f64 holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

impl Serialize for Point {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        [self.x, self.y].serialize(s)
    }
}

impl Serialize for LineString {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.points.serialize(s)
    }
}

impl Serialize for MultiLineString {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.lines.serialize(s)
    }
}

impl Serialize for Polygon {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.rings.serialize(s)
    }
}

impl Serialize for Geometry {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        let mut geom = s.serialize_struct("Geometry", 2)?;
        geom.serialize_field("type", self.type_name())?;
        match self {
            Geometry::Point(p) => geom.serialize_field("coordinates", p)?,
            Geometry::LineString(line) => geom.serialize_field("coordinates", line)?,
            Geometry::MultiLineString(lines) => geom.serialize_field("coordinates", lines)?,
            Geometry::Polygon(poly) => geom.serialize_field("coordinates", poly)?,
        }
        geom.end()
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            AttributeValue::String(v) => s.serialize_str(v),
            AttributeValue::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER => {
                s.serialize_i64(*n as i64)
            }
            AttributeValue::Number(n) => s.serialize_f64(*n),
        }
    }
}

impl Serialize for AttributeRecord {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        let mut feature = s.serialize_struct("Feature", 3)?;
        feature.serialize_field("type", "Feature")?;
        feature.serialize_field("geometry", &self.geometry)?;
        feature.serialize_field("properties", &self.properties)?;
        feature.end()
    }
}

impl Serialize for FeatureCollection {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        let mut collection = s.serialize_struct("FeatureCollection", 2)?;
        collection.serialize_field("type", "FeatureCollection")?;
        collection.serialize_field("features", &self.features)?;
        collection.end()
    }
}

pub fn to_string(collection: &FeatureCollection) -> Result<String> {
    Ok(serde_json::to_string(collection)?)
}

/// Two-space indented output, as written by `geolayers convert`.
pub fn to_string_pretty(collection: &FeatureCollection) -> Result<String> {
    Ok(serde_json::to_string_pretty(collection)?)
}

pub fn to_vec(collection: &FeatureCollection) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(collection)?)
}

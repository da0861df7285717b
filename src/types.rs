//
// Copyright (c) geolayers contributors. All rights reserved.
//

use std::slice::Iter;

/// Coordinate pair, passed through exactly as stored (no CRS transformation).
#[derive(PartialEq, Clone, Copy, Debug)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(PartialEq, Clone, Debug, Default)]
pub struct LineString {
    pub points: Vec<Point>,
}

#[derive(PartialEq, Clone, Debug, Default)]
pub struct MultiLineString {
    pub lines: Vec<LineString>,
}

/// First ring is the exterior.
#[derive(PartialEq, Clone, Debug, Default)]
pub struct Polygon {
    pub rings: Vec<LineString>,
}

#[derive(PartialEq, Clone, Debug)]
pub enum Geometry {
    Point(Point),
    LineString(LineString),
    MultiLineString(MultiLineString),
    Polygon(Polygon),
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

impl LineString {
    pub fn points(&self) -> Iter<'_, Point> {
        self.points.iter()
    }

    /// First and last points are coordinate-equal. No other ring validity is checked.
    pub fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => first.x == last.x && first.y == last.y,
            _ => false,
        }
    }
}

impl From<Vec<Point>> for LineString {
    fn from(points: Vec<Point>) -> Self {
        LineString { points }
    }
}

impl MultiLineString {
    pub fn lines(&self) -> Iter<'_, LineString> {
        self.lines.iter()
    }
}

impl Polygon {
    pub fn rings(&self) -> Iter<'_, LineString> {
        self.rings.iter()
    }
}

impl Geometry {
    /// GeoJSON type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
        }
    }

    pub fn num_points(&self) -> usize {
        match self {
            Geometry::Point(_) => 1,
            Geometry::LineString(line) => line.points.len(),
            Geometry::MultiLineString(multi) => multi.lines().map(|l| l.points.len()).sum(),
            Geometry::Polygon(poly) => poly.rings().map(|r| r.points.len()).sum(),
        }
    }
}

#[derive(PartialEq, Clone, Debug)]
pub enum AttributeValue {
    String(String),
    Number(f64),
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Number(n)
    }
}

/// Field name to value mapping that keeps insertion order.
#[derive(PartialEq, Clone, Debug, Default)]
pub struct AttributeRecord {
    fields: Vec<(String, AttributeValue)>,
}

impl AttributeRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value. An existing key keeps its position and takes the new value.
    pub fn insert<K: Into<String>, V: Into<AttributeValue>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<AttributeValue>> FromIterator<(K, V)> for AttributeRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = AttributeRecord::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

#[derive(PartialEq, Clone, Debug)]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: AttributeRecord,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Feature { geometry, properties: AttributeRecord::new() }
    }
}

/// Ordered set of features. Order is kept for deterministic output only.
#[derive(PartialEq, Clone, Debug, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn features(&self) -> Iter<'_, Feature> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl From<Vec<Feature>> for FeatureCollection {
    fn from(features: Vec<Feature>) -> Self {
        FeatureCollection { features }
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;
    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

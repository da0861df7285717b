//
// Copyright (c) geolayers contributors. All rights reserved.
//

//! Convert a simplified [OSM XML](https://wiki.openstreetmap.org/wiki/OSM_XML) export
//! into features.
//!
//! This is structural extraction, not an XML parser. Supported input:
//!
//! - `<node id=".." lat=".." lon=".."/>`: self-closed, on one line, attributes in any order
//! - `<way ..> <nd ref=".."/> .. <tag k=".." v=".."/> .. </way>`
//!
//! Node elements with children, or spread over several lines, are rejected
//! with [`Error::MalformedOsm`] instead of being skipped. Relations and any
//! other elements are ignored.
//!
//! ```rust
//! let xml = r#"<osm>
//!   <node id="1" lat="59.91" lon="10.75"/>
//!   <node id="2" lat="59.92" lon="10.76"/>
//!   <way id="7"><nd ref="1"/><nd ref="2"/><tag k="highway" v="path"/></way>
//! </osm>"#;
//! let collection = geolayers::osm::decode(xml).unwrap();
//! assert_eq!(collection.features[0].geometry.type_name(), "LineString");
//! ```

use crate::error::{Error, Result};
use crate::types::{
    AttributeRecord, Feature, FeatureCollection, Geometry, LineString, Point, Polygon,
};
use memchr::memmem;
use std::collections::{HashMap, HashSet};

/// Fewest resolved points a closed way needs to become a polygon.
const MIN_RING_POINTS: usize = 4;

#[derive(PartialEq, Clone, Copy, Debug)]
pub struct OsmNode {
    pub lat: f64,
    pub lon: f64,
}

#[derive(PartialEq, Clone, Debug, Default)]
pub struct OsmWay {
    pub refs: Vec<String>,
    pub tags: Vec<(String, String)>,
}

/// Node table and ways of one document, before way resolution.
#[derive(Clone, Debug, Default)]
pub struct OsmDocument {
    nodes: Vec<(String, OsmNode)>,
    index: HashMap<String, usize>,
    ways: Vec<OsmWay>,
}

impl OsmDocument {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut doc = OsmDocument::default();
        for (id, node) in extract_nodes(xml)? {
            doc.insert_node(id, node);
        }
        doc.ways = extract_ways(xml)?;
        Ok(doc)
    }

    // A repeated id takes the new coordinates and keeps its first position.
    fn insert_node(&mut self, id: String, node: OsmNode) {
        match self.index.get(&id) {
            Some(&i) => self.nodes[i].1 = node,
            None => {
                self.index.insert(id.clone(), self.nodes.len());
                self.nodes.push((id, node));
            }
        }
    }

    pub fn node(&self, id: &str) -> Option<&OsmNode> {
        self.index.get(id).map(|&i| &self.nodes[i].1)
    }

    /// Nodes in first-seen order.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &OsmNode)> {
        self.nodes.iter().map(|(id, node)| (id.as_str(), node))
    }

    pub fn ways(&self) -> &[OsmWay] {
        &self.ways
    }

    /// Way features in document order, then one point per node no way references.
    pub fn to_feature_collection(&self) -> Result<FeatureCollection> {
        let mut features = Vec::with_capacity(self.ways.len());
        let mut referenced: HashSet<&str> = HashSet::new();

        for way in self.ways.iter() {
            let mut points = Vec::with_capacity(way.refs.len());
            for r in way.refs.iter() {
                let node = self.node(r).ok_or_else(|| {
                    Error::MalformedOsm(format!("way references missing node {}", r))
                })?;
                points.push(Point { x: node.lon, y: node.lat });
                referenced.insert(r.as_str());
            }
            let line = LineString { points };
            let geometry = if line.points.len() >= MIN_RING_POINTS && line.is_closed() {
                Geometry::Polygon(Polygon { rings: vec![line] })
            } else {
                Geometry::LineString(line)
            };
            let properties: AttributeRecord =
                way.tags.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            features.push(Feature { geometry, properties });
        }

        let way_features = features.len();
        for (id, node) in self.nodes() {
            if !referenced.contains(id) {
                features.push(Feature::new(Geometry::Point(Point { x: node.lon, y: node.lat })));
            }
        }

        tracing::debug!(
            nodes = self.nodes.len(),
            ways = way_features,
            points = features.len() - way_features,
            "decoded osm"
        );
        Ok(features.into())
    }
}

pub fn decode(xml: &str) -> Result<FeatureCollection> {
    OsmDocument::parse(xml)?.to_feature_collection()
}

// Yields (offset, element text from '<' to '>') for every `<name ...>` start tag.
struct Elements<'a> {
    xml: &'a str,
    name: &'a str,
    pos: usize,
}

impl<'a> Elements<'a> {
    fn new(xml: &'a str, name: &'a str) -> Self {
        Elements { xml, name, pos: 0 }
    }
}

impl<'a> Iterator for Elements<'a> {
    type Item = Result<(usize, &'a str)>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.xml.as_bytes();
        let needle = format!("<{}", self.name);
        loop {
            let start = self.pos + memmem::find(&bytes[self.pos..], needle.as_bytes())?;
            let after = start + needle.len();
            self.pos = after;
            match bytes.get(after) {
                Some(b) if b.is_ascii_whitespace() || *b == b'/' || *b == b'>' => {}
                _ => continue,
            }
            return Some(match memchr::memchr(b'>', &bytes[after..]) {
                Some(i) => {
                    self.pos = after + i + 1;
                    Ok((start, &self.xml[start..after + i + 1]))
                }
                None => Err(Error::MalformedOsm(format!(
                    "unterminated <{}> element at offset {}",
                    self.name, start
                ))),
            });
        }
    }
}

fn extract_nodes(xml: &str) -> Result<Vec<(String, OsmNode)>> {
    let mut nodes = Vec::new();
    for element in Elements::new(xml, "node") {
        let (offset, text) = element?;
        if text.contains(|c: char| c == '\n' || c == '\r') {
            return Err(Error::MalformedOsm(format!(
                "node element at offset {} spans several lines",
                offset
            )));
        }
        let attrs = match text.strip_suffix("/>") {
            Some(inner) => parse_attributes(&inner["<node".len()..], offset)?,
            None => {
                return Err(Error::MalformedOsm(format!(
                    "node element at offset {} is not self-closed",
                    offset
                )))
            }
        };
        let id = required(&attrs, "id", offset)?;
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::MalformedOsm(format!(
                "node id {:?} at offset {} is not numeric",
                id, offset
            )));
        }
        let lat = coordinate(&attrs, "lat", offset)?;
        let lon = coordinate(&attrs, "lon", offset)?;
        nodes.push((id.to_string(), OsmNode { lat, lon }));
    }
    Ok(nodes)
}

fn extract_ways(xml: &str) -> Result<Vec<OsmWay>> {
    let finder = memmem::Finder::new(b"</way>");
    let mut ways = Vec::new();
    let mut elements = Elements::new(xml, "way");
    while let Some(element) = elements.next() {
        let (offset, text) = element?;
        if text.ends_with("/>") {
            ways.push(OsmWay::default());
            continue;
        }
        let body_start = offset + text.len();
        let body_len = finder.find(&xml.as_bytes()[body_start..]).ok_or_else(|| {
            Error::MalformedOsm(format!("way element at offset {} is never closed", offset))
        })?;
        let body = &xml[body_start..body_start + body_len];
        ways.push(parse_way_body(body, body_start)?);
        elements.pos = body_start + body_len + "</way>".len();
    }
    Ok(ways)
}

fn parse_way_body(body: &str, base: usize) -> Result<OsmWay> {
    let mut way = OsmWay::default();
    for element in Elements::new(body, "nd") {
        let (offset, text) = element?;
        let attrs = parse_attributes(child_attributes(text, "<nd"), base + offset)?;
        let r = required(&attrs, "ref", base + offset)?;
        way.refs.push(r.to_string());
    }
    for element in Elements::new(body, "tag") {
        let (offset, text) = element?;
        let attrs = parse_attributes(child_attributes(text, "<tag"), base + offset)?;
        let k = required(&attrs, "k", base + offset)?;
        let v = required(&attrs, "v", base + offset)?;
        way.tags.push((k.to_string(), v.to_string()));
    }
    Ok(way)
}

fn child_attributes<'a>(text: &'a str, open: &str) -> &'a str {
    let inner = text.strip_suffix("/>").or_else(|| text.strip_suffix('>')).unwrap_or(text);
    &inner[open.len()..]
}

fn required<'a>(attrs: &'a [(&str, String)], name: &str, offset: usize) -> Result<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| {
            Error::MalformedOsm(format!("element at offset {} has no {} attribute", offset, name))
        })
}

fn coordinate(attrs: &[(&str, String)], name: &str, offset: usize) -> Result<f64> {
    let raw = required(attrs, name, offset)?;
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            Error::MalformedOsm(format!(
                "{}={:?} at offset {} is not a number",
                name, raw, offset
            ))
        })
}

// `name="value"` pairs separated by whitespace; either quote style.
fn parse_attributes(s: &str, offset: usize) -> Result<Vec<(&str, String)>> {
    let malformed =
        || Error::MalformedOsm(format!("unreadable attributes in element at offset {}", offset));
    let mut attrs = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        let eq = rest.find('=').ok_or_else(malformed)?;
        let name = rest[..eq].trim_end();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(malformed());
        }
        let value_part = rest[eq + 1..].trim_start();
        let quote = value_part
            .chars()
            .next()
            .filter(|c| *c == '"' || *c == '\'')
            .ok_or_else(malformed)?;
        let close = value_part[1..].find(quote).ok_or_else(malformed)?;
        attrs.push((name, unescape(&value_part[1..close + 1])));
        rest = value_part[close + 2..].trim_start();
    }
    Ok(attrs)
}

fn unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(|dec| dec.parse::<u32>()))
                    .and_then(|n| n.ok())
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

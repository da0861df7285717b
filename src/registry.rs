//
// Copyright (c) geolayers contributors. All rights reserved.
//

//! Named layers discovered on disk, decoded once and held as GeoJSON text.

use crate::error::{Error, Result};
use crate::types::FeatureCollection;
use crate::{geojson, join, osm};
use bytes::Bytes;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Directories to scan. `None` disables a source.
#[derive(Clone, Debug, Default)]
pub struct RegistryConfig {
    /// `<name>.shp` + `<name>.dbf` pairs.
    pub shapes_dir: Option<PathBuf>,
    /// `<name>.osm` files.
    pub osm_dir: Option<PathBuf>,
    /// `<name>.geojson` files, served as they are.
    pub geojson_dir: Option<PathBuf>,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum LayerSource {
    Shapefile,
    Osm,
    GeoJson,
}

#[derive(Clone, Debug)]
pub struct Layer {
    name: String,
    source: LayerSource,
    feature_count: usize,
    body: Bytes,
}

impl Layer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> LayerSource {
        self.source
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    /// Serialized GeoJSON `FeatureCollection`.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

#[derive(Clone, Debug, Default)]
pub struct LayerRegistry {
    layers: Vec<Layer>,
    index: HashMap<String, usize>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads shapefile layers, then OSM layers, then GeoJSON layers. A layer that
    /// fails to load is logged and left out.
    pub fn load(config: &RegistryConfig) -> Self {
        let mut registry = LayerRegistry::new();

        if let Some(dir) = &config.shapes_dir {
            for (name, path) in discover_or_warn(dir, "shp") {
                match load_shapefile(&path) {
                    Ok(collection) => {
                        registry.insert_logged(name, LayerSource::Shapefile, &collection)
                    }
                    Err(e) => {
                        tracing::error!(layer = %name, error = %e, "failed to load shapefile layer")
                    }
                }
            }
        }

        if let Some(dir) = &config.osm_dir {
            for (name, path) in discover_or_warn(dir, "osm") {
                match load_osm(&path) {
                    Ok(collection) => registry.insert_logged(name, LayerSource::Osm, &collection),
                    Err(e) => {
                        tracing::error!(layer = %name, error = %e, "failed to load osm layer")
                    }
                }
            }
        }

        if let Some(dir) = &config.geojson_dir {
            for (name, path) in discover_or_warn(dir, "geojson") {
                match load_geojson(&path) {
                    Ok((feature_count, body)) => {
                        tracing::info!(
                            layer = %name,
                            features = feature_count,
                            "loaded geojson layer"
                        );
                        let source = LayerSource::GeoJson;
                        registry.put(Layer { name, source, feature_count, body });
                    }
                    Err(e) => {
                        tracing::error!(layer = %name, error = %e, "failed to load geojson layer")
                    }
                }
            }
        }

        tracing::info!(layers = registry.len(), "layer registry ready");
        registry
    }

    /// Serializes `collection` and stores it under `name`. A layer of the same name
    /// is replaced in place.
    pub fn insert<N: Into<String>>(
        &mut self,
        name: N,
        source: LayerSource,
        collection: &FeatureCollection,
    ) -> Result<()> {
        let body = Bytes::from(geojson::to_vec(collection)?);
        self.put(Layer { name: name.into(), source, feature_count: collection.len(), body });
        Ok(())
    }

    fn insert_logged(&mut self, name: String, source: LayerSource, collection: &FeatureCollection) {
        let features = collection.len();
        match self.insert(name.clone(), source, collection) {
            Ok(()) => tracing::info!(layer = %name, ?source, features, "loaded layer"),
            Err(e) => tracing::error!(layer = %name, error = %e, "failed to serialize layer"),
        }
    }

    fn put(&mut self, layer: Layer) {
        match self.index.get(&layer.name) {
            Some(&i) => {
                tracing::debug!(layer = %layer.name, "replacing layer");
                self.layers[i] = layer;
            }
            None => {
                self.index.insert(layer.name.clone(), self.layers.len());
                self.layers.push(layer);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Layer> {
        self.index.get(name).map(|&i| &self.layers[i])
    }

    /// Layer names in load order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|l| l.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Files in `dir` with the given extension, as `(file stem, path)` sorted by name.
pub fn discover(dir: &Path, extension: &str) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension() != Some(OsStr::new(extension)) {
            continue;
        }
        if let Some(stem) = path.file_stem() {
            found.push((stem.to_string_lossy().into_owned(), path));
        }
    }
    found.sort();
    Ok(found)
}

fn discover_or_warn(dir: &Path, extension: &str) -> Vec<(String, PathBuf)> {
    discover(dir, extension).unwrap_or_else(|e| {
        tracing::warn!(dir = %dir.display(), error = %e, "cannot list layer directory");
        Vec::new()
    })
}

fn load_shapefile(shp_path: &Path) -> Result<FeatureCollection> {
    let shp_raw = fs::read(shp_path)?;
    let dbf_raw = fs::read(shp_path.with_extension("dbf"))?;
    join::decode_shapefile(&shp_raw, &dbf_raw)
}

fn load_osm(path: &Path) -> Result<FeatureCollection> {
    let xml = fs::read_to_string(path)?;
    osm::decode(&xml)
}

fn load_geojson(path: &Path) -> Result<(usize, Bytes)> {
    let raw = fs::read(path)?;
    let value: serde_json::Value = serde_json::from_slice(&raw)?;
    let feature_count = value
        .get("features")
        .and_then(|f| f.as_array())
        .map(|f| f.len())
        .ok_or_else(|| {
            Error::Json(<serde_json::Error as serde::de::Error>::custom(
                "expected an object with a \"features\" array",
            ))
        })?;
    Ok((feature_count, Bytes::from(serde_json::to_vec(&value)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Feature, Geometry, Point};
    use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
    use tempfile::TempDir;

    // One polyline record with two points.
    fn shp_bytes() -> Vec<u8> {
        let mut content = Vec::new();
        content.write_i32::<LittleEndian>(3).unwrap();
        content.extend_from_slice(&[0u8; 32]);
        content.write_i32::<LittleEndian>(1).unwrap();
        content.write_i32::<LittleEndian>(2).unwrap();
        content.write_i32::<LittleEndian>(0).unwrap();
        for v in [0.0, 0.0, 1.0, 1.0] {
            content.write_f64::<LittleEndian>(v).unwrap();
        }
        let mut w = Vec::new();
        w.write_i32::<BigEndian>(9994).unwrap();
        w.extend_from_slice(&[0u8; 20]);
        w.write_i32::<BigEndian>(((100 + 8 + content.len()) / 2) as i32).unwrap();
        w.write_i32::<LittleEndian>(1000).unwrap();
        w.write_i32::<LittleEndian>(3).unwrap();
        w.extend_from_slice(&[0u8; 64]);
        w.write_i32::<BigEndian>(1).unwrap();
        w.write_i32::<BigEndian>((content.len() / 2) as i32).unwrap();
        w.extend_from_slice(&content);
        w
    }

    // One record, one field NAME (C,8).
    fn dbf_bytes() -> Vec<u8> {
        let mut w = vec![0x03u8, 124, 1, 1];
        w.write_u32::<LittleEndian>(1).unwrap();
        w.write_u16::<LittleEndian>(65).unwrap();
        w.write_u16::<LittleEndian>(9).unwrap();
        w.resize(32, 0);
        let mut desc = [0u8; 32];
        desc[..4].copy_from_slice(b"NAME");
        desc[11] = b'C';
        desc[16] = 8;
        w.extend_from_slice(&desc);
        w.push(0x0D);
        w.extend_from_slice(b" Main St ");
        w
    }

    fn write(dir: &Path, name: &str, contents: &[u8]) {
        fs::write(dir.join(name), contents).unwrap();
    }

    fn body_json(layer: &Layer) -> serde_json::Value {
        serde_json::from_slice(layer.body()).unwrap()
    }

    #[test]
    fn test_load_shapefile_layer() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "roads.shp", &shp_bytes());
        write(tmp.path(), "roads.dbf", &dbf_bytes());
        write(tmp.path(), "readme.txt", b"not a layer");

        let registry = LayerRegistry::load(&RegistryConfig {
            shapes_dir: Some(tmp.path().to_path_buf()),
            ..Default::default()
        });
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["roads"]);
        let layer = registry.get("roads").unwrap();
        assert_eq!(layer.source(), LayerSource::Shapefile);
        assert_eq!(layer.feature_count(), 1);
        assert_eq!(
            body_json(layer),
            serde_json::json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "geometry": { "type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]] },
                    "properties": { "NAME": "Main St" }
                }]
            })
        );
    }

    #[test]
    fn test_failed_layers_are_skipped() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "broken.shp", &[0u8; 40]);
        write(tmp.path(), "broken.dbf", &dbf_bytes());
        write(tmp.path(), "lonely.shp", &shp_bytes());
        write(tmp.path(), "roads.shp", &shp_bytes());
        write(tmp.path(), "roads.dbf", &dbf_bytes());
        write(tmp.path(), "bad.geojson", b"{\"type\":\"FeatureCollection\"}");

        let registry = LayerRegistry::load(&RegistryConfig {
            shapes_dir: Some(tmp.path().to_path_buf()),
            geojson_dir: Some(tmp.path().to_path_buf()),
            ..Default::default()
        });
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["roads"]);
        assert!(registry.get("broken").is_none());
        assert!(registry.get("lonely").is_none());
        assert!(registry.get("bad").is_none());
    }

    #[test]
    fn test_load_order_and_override() {
        let shapes = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        write(shapes.path(), "roads.shp", &shp_bytes());
        write(shapes.path(), "roads.dbf", &dbf_bytes());
        write(
            data.path(),
            "city.osm",
            br#"<osm><node id="1" lat="59.9" lon="10.7"/></osm>"#,
        );
        write(data.path(), "roads.geojson", br#"{"type":"FeatureCollection","features":[]}"#);
        write(
            data.path(),
            "extra.geojson",
            br#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{}}]}"#,
        );

        let registry = LayerRegistry::load(&RegistryConfig {
            shapes_dir: Some(shapes.path().to_path_buf()),
            osm_dir: Some(data.path().to_path_buf()),
            geojson_dir: Some(data.path().to_path_buf()),
        });
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["roads", "city", "extra"]);
        assert_eq!(registry.get("roads").unwrap().source(), LayerSource::GeoJson);
        assert_eq!(registry.get("roads").unwrap().feature_count(), 0);
        assert_eq!(registry.get("city").unwrap().source(), LayerSource::Osm);
        assert_eq!(registry.get("extra").unwrap().feature_count(), 1);
    }

    #[test]
    fn test_missing_directory() {
        let registry = LayerRegistry::load(&RegistryConfig {
            shapes_dir: Some(PathBuf::from("/nonexistent/geolayers/shapes")),
            ..Default::default()
        });
        assert!(registry.is_empty());
    }

    #[test]
    fn test_insert() {
        let mut registry = LayerRegistry::new();
        let point = Feature::new(Geometry::Point(Point::new(1.0, 2.0)));
        let collection = FeatureCollection::from(vec![point]);
        registry.insert("points", LayerSource::Osm, &collection).unwrap();
        let layer = registry.get("points").unwrap();
        assert_eq!(layer.name(), "points");
        assert_eq!(layer.feature_count(), 1);
        assert_eq!(
            body_json(layer)["features"][0]["geometry"]["coordinates"],
            serde_json::json!([1.0, 2.0])
        );
        assert!(registry.get("other").is_none());
    }
}

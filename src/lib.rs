//
// Copyright (c) geolayers contributors. All rights reserved.
//

//! Turn geographic source data into GeoJSON layers.
//!
//! - ESRI Shapefile polylines (`.shp`) with their dBASE attribute table (`.dbf`)
//! - Simplified OpenStreetMap XML
//! - A registry of named layers loaded from disk, as served by the `geolayers` binary
//!
//! ```rust,no_run
//! use geolayers::{geojson, join};
//!
//! let shp = std::fs::read("shapes/roads.shp").unwrap();
//! let dbf = std::fs::read("shapes/roads.dbf").unwrap();
//! let roads = join::decode_shapefile(&shp, &dbf).unwrap();
//! println!("{}", geojson::to_string(&roads).unwrap());
//! ```
//!
//! Decoders are pure functions over in-memory buffers: they do no I/O and
//! share no state, so separate files can be decoded concurrently.

pub mod error;
mod types;
pub use error::{Error, Result};
pub use types::{
    AttributeRecord, AttributeValue, Feature, FeatureCollection, Geometry, LineString,
    MultiLineString, Point, Polygon,
};
pub mod dbf;
pub mod geojson;
pub mod join;
pub mod osm;
pub mod registry;
pub mod shp;

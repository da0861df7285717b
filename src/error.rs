//
// Copyright (c) geolayers contributors. All rights reserved.
//

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Header or record extents of a `.shp` buffer are out of bounds.
    #[error("malformed shapefile: {0}")]
    MalformedShapefile(String),
    /// Header, field descriptors or records of a `.dbf` buffer are out of bounds.
    #[error("malformed dbf: {0}")]
    MalformedDbf(String),
    /// Dangling node reference or an element shape the OSM extractor refuses.
    #[error("malformed osm: {0}")]
    MalformedOsm(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

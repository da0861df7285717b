//
// Copyright (c) geolayers contributors. All rights reserved.
//

use crate::error::Result;
use crate::types::{AttributeRecord, Feature, FeatureCollection, Geometry};
use crate::{dbf, shp};

/// Pairs geometry `i` with record `i`. Geometries without a record get empty
/// properties; surplus records are dropped.
pub fn join(geometries: Vec<Geometry>, records: Vec<AttributeRecord>) -> FeatureCollection {
    if geometries.len() != records.len() {
        tracing::debug!(
            geometries = geometries.len(),
            records = records.len(),
            "geometry and attribute counts differ"
        );
    }
    let mut records = records.into_iter();
    geometries
        .into_iter()
        .map(|geometry| Feature {
            geometry,
            properties: records.next().unwrap_or_default(),
        })
        .collect::<Vec<_>>()
        .into()
}

/// Decodes a `.shp`/`.dbf` pair with default options and joins them.
pub fn decode_shapefile(shp_raw: &[u8], dbf_raw: &[u8]) -> Result<FeatureCollection> {
    let geometries = shp::decode(shp_raw)?;
    let records = dbf::decode(dbf_raw)?;
    Ok(join(geometries, records))
}

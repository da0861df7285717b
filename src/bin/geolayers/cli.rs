//
// Copyright (c) geolayers contributors. All rights reserved.
//

use clap::{Args, Parser, Subcommand};
use geolayers::registry::RegistryConfig;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "geolayers",
    version,
    about = "Serve Shapefile, OSM and GeoJSON layers to a canvas map viewer"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load every layer and serve them with the map viewer over HTTP
    Serve(ServeArgs),
    /// Convert an OSM XML file to a GeoJSON file
    Convert {
        /// OSM XML input
        input: PathBuf,
        /// GeoJSON output
        #[arg(default_value = "map.geojson")]
        output: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,
    /// Directory scanned for <name>.shp + <name>.dbf pairs
    #[arg(long, env = "SHAPES_DIR", default_value = "./shapes")]
    pub shapes_dir: PathBuf,
    /// Directory scanned for <name>.geojson files
    #[arg(long, env = "GEOJSON_DIR", default_value = ".")]
    pub geojson_dir: PathBuf,
    /// Directory scanned for <name>.osm files (disabled when unset)
    #[arg(long, env = "OSM_DIR")]
    pub osm_dir: Option<PathBuf>,
}

impl ServeArgs {
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            shapes_dir: Some(self.shapes_dir.clone()),
            osm_dir: self.osm_dir.clone(),
            geojson_dir: Some(self.geojson_dir.clone()),
        }
    }
}

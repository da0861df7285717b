//
// Copyright (c) geolayers contributors. All rights reserved.
//

//! `geolayers` - serve decoded layers to the canvas map viewer, or convert OSM XML to GeoJSON.

use anyhow::Context;
use clap::Parser;
use geolayers::registry::LayerRegistry;
use geolayers::{geojson, osm};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

mod cli;
mod routes;

use cli::{Cli, Command, ServeArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,geolayers=debug".into()),
        )
        .init();

    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Convert { input, output } => convert(&input, &output),
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.registry_config();
    tracing::info!(
        port = args.port,
        shapes_dir = %args.shapes_dir.display(),
        geojson_dir = %args.geojson_dir.display(),
        osm_dir = ?args.osm_dir,
        "Starting geolayers server"
    );

    let registry = tokio::task::spawn_blocking(move || LayerRegistry::load(&config))
        .await
        .context("layer loading task failed")?;
    let app = routes::router(Arc::new(registry));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    tracing::info!("Listening on http://localhost:{}", args.port);
    axum::serve(listener, app).await?;
    Ok(())
}

fn convert(input: &Path, output: &Path) -> anyhow::Result<()> {
    let xml = std::fs::read_to_string(input)
        .with_context(|| format!("cannot read {}", input.display()))?;
    let collection =
        osm::decode(&xml).with_context(|| format!("cannot convert {}", input.display()))?;
    std::fs::write(output, geojson::to_string_pretty(&collection)?)
        .with_context(|| format!("cannot write {}", output.display()))?;
    tracing::info!(
        features = collection.len(),
        "Converted {} to {}",
        input.display(),
        output.display()
    );
    Ok(())
}

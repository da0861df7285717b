//
// Copyright (c) geolayers contributors. All rights reserved.
//

//! HTTP endpoints.
//!
//! - `GET /` - map viewer page
//! - `GET /layers.json` - layer names in load order
//! - `GET /data?layer=<name>` - one layer as a GeoJSON FeatureCollection

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use geolayers::registry::LayerRegistry;
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

const INDEX_HTML: &str = include_str!("../../../static/index.html");

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<LayerRegistry>,
}

#[derive(Debug)]
pub enum ApiError {
    LayerNotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::LayerNotFound => (StatusCode::NOT_FOUND, "Layer not found").into_response(),
        }
    }
}

/// Query string as ordered pairs, so a repeated key is not a rejection.
pub type QueryPairs = Vec<(String, String)>;

/// First `layer` value of the query string.
fn layer_param(pairs: QueryPairs) -> Option<String> {
    pairs.into_iter().find(|(k, _)| k == "layer").map(|(_, v)| v)
}

pub fn router(registry: Arc<LayerRegistry>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/layers.json", get(layers))
        .route("/data", get(data))
        .fallback(not_found)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { registry })
}

/// GET /
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /layers.json
async fn layers(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.names().map(str::to_string).collect())
}

/// GET /data?layer=<name>
async fn data(
    State(state): State<AppState>,
    Query(pairs): Query<QueryPairs>,
) -> Result<Response, ApiError> {
    let name = layer_param(pairs).ok_or(ApiError::LayerNotFound)?;
    match state.registry.get(&name) {
        Some(layer) => {
            tracing::debug!(layer = %name, features = layer.feature_count(), "serving layer");
            Ok(([(header::CONTENT_TYPE, "application/json")], layer.body().clone()).into_response())
        }
        None => {
            tracing::debug!(layer = %name, "unknown layer requested");
            Err(ApiError::LayerNotFound)
        }
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

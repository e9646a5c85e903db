use std::fmt::Display;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use service_defaults::{ServiceClient, WebApplication};

/// Resolved through the `Services` section of the configuration.
const CATALOG_ITEMS_URL: &str = "https+http://catalog/items";

pub fn add_routes(app: WebApplication, catalog: ServiceClient) -> WebApplication {
    app.route("/", get(index)).merge(
        Router::new()
            .route("/catalog", get(catalog_items))
            .with_state(catalog),
    )
}

pub async fn index() -> &'static str {
    "sample api"
}

#[tracing::instrument(skip_all)]
async fn catalog_items(
    State(catalog): State<ServiceClient>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let response = catalog.get(CATALOG_ITEMS_URL).await.map_err(bad_gateway)?;

    if !response.status().is_success() {
        return Err(bad_gateway(format!("catalog answered {}", response.status())));
    }

    let items = response.json::<Value>().await.map_err(bad_gateway)?;
    Ok(Json(items))
}

fn bad_gateway(error: impl Display) -> (StatusCode, String) {
    tracing::warn!("catalog request failed: {}", error);
    (StatusCode::BAD_GATEWAY, error.to_string())
}

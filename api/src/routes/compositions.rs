use axum::extract::State;
use axum::{Json, Router, routing::get};
use croprec_core::catalog::CompositionOption;
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/compositions", get(list_compositions))
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CompositionsResponse {
    /// Key used when a submitted key is not in the catalog
    pub default_key: String,
    /// Catalog order
    pub compositions: Vec<CompositionOption>,
}

/// List the NPK compositions a prediction can be requested with
#[utoipa::path(
    get,
    path = "/v1/compositions",
    responses(
        (status = 200, description = "Composition catalog", body = CompositionsResponse)
    ),
    tag = "predictions"
)]
pub async fn list_compositions(State(state): State<AppState>) -> Json<CompositionsResponse> {
    let catalog = state.pipeline.catalog();
    Json(CompositionsResponse {
        default_key: catalog.default_key().to_string(),
        compositions: catalog.options(),
    })
}

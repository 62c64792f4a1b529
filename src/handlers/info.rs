use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::scenes::{demographic_catalog, scene_catalog, CatalogEntry, Demographic, Scene};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ApiIndex {
    pub message: String,
    pub status: &'static str,
    pub model: String,
    pub scenes: Vec<&'static str>,
    pub demographics: Vec<&'static str>,
    pub endpoint: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime: u64,
}

pub async fn api_index(State(state): State<AppState>) -> Json<ApiIndex> {
    let model = state.generator.model().to_string();
    Json(ApiIndex {
        message: format!("AI Photoshoot Generator ({model})"),
        status: "running",
        model,
        scenes: Scene::all().iter().map(|scene| scene.id()).collect(),
        demographics: Demographic::all().iter().map(|variant| variant.id()).collect(),
        endpoint: "POST /api/upload",
    })
}

pub async fn list_scenes() -> Json<Vec<CatalogEntry>> {
    Json(scene_catalog())
}

pub async fn list_demographics() -> Json<Vec<CatalogEntry>> {
    Json(demographic_catalog())
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version,
        uptime: state.started_at.elapsed().as_secs(),
    })
}

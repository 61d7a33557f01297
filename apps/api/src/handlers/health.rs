use axum::Json;
use axum::extract::State;

use crate::dto::HealthResponse;
use crate::state::AppState;

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let keyed_store = if state.keyed_store.is_available() {
        "up"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: "ok",
        keyed_store,
    })
}

use axum::{extract::State, http::StatusCode, Json};

use crate::api::{internal_error, AppState, ErrorResponse};
use crate::prefs::{PrefStore, Preferences};

/// Current rider preferences
#[utoipa::path(
    get,
    path = "/api/preferences",
    responses(
        (status = 200, description = "Current preferences", body = Preferences),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "preferences"
)]
pub async fn get_preferences(
    State(state): State<AppState>,
) -> Result<Json<Preferences>, (StatusCode, Json<ErrorResponse>)> {
    let prefs = PrefStore::new(state.pool.clone())
        .load()
        .await
        .map_err(internal_error)?;
    Ok(Json(prefs))
}

/// Replace the rider preferences
#[utoipa::path(
    put,
    path = "/api/preferences",
    request_body = Preferences,
    responses(
        (status = 200, description = "Saved preferences", body = Preferences),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "preferences"
)]
pub async fn put_preferences(
    State(state): State<AppState>,
    Json(prefs): Json<Preferences>,
) -> Result<Json<Preferences>, (StatusCode, Json<ErrorResponse>)> {
    PrefStore::new(state.pool.clone())
        .save(&prefs)
        .await
        .map_err(internal_error)?;
    Ok(Json(prefs))
}

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::{internal_error, AppState, ErrorResponse};
use crate::prefs::PrefStore;

/// One starred route+headsign combination.
#[derive(Debug, Serialize, Deserialize, ToSchema, IntoParams)]
pub struct Favorite {
    pub route_id: String,
    pub headsign: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FavoriteListResponse {
    pub favorites: Vec<Favorite>,
}

/// List starred route+headsign combinations
#[utoipa::path(
    get,
    path = "/api/favorites",
    responses(
        (status = 200, description = "All favorites", body = FavoriteListResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "preferences"
)]
pub async fn list_favorites(
    State(state): State<AppState>,
) -> Result<Json<FavoriteListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let favorites = PrefStore::new(state.pool.clone())
        .list_favorites()
        .await
        .map_err(internal_error)?
        .into_iter()
        .map(|(route_id, headsign)| Favorite { route_id, headsign })
        .collect();
    Ok(Json(FavoriteListResponse { favorites }))
}

/// Star a route+headsign combination
#[utoipa::path(
    post,
    path = "/api/favorites",
    request_body = Favorite,
    responses(
        (status = 201, description = "Favorite stored"),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "preferences"
)]
pub async fn add_favorite(
    State(state): State<AppState>,
    Json(favorite): Json<Favorite>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    PrefStore::new(state.pool.clone())
        .add_favorite(&favorite.route_id, &favorite.headsign)
        .await
        .map_err(internal_error)?;
    Ok(StatusCode::CREATED)
}

/// Unstar a route+headsign combination
#[utoipa::path(
    delete,
    path = "/api/favorites",
    params(Favorite),
    responses(
        (status = 204, description = "Favorite removed"),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "preferences"
)]
pub async fn remove_favorite(
    State(state): State<AppState>,
    Query(favorite): Query<Favorite>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    PrefStore::new(state.pool.clone())
        .remove_favorite(&favorite.route_id, &favorite.headsign)
        .await
        .map_err(internal_error)?;
    Ok(StatusCode::NO_CONTENT)
}

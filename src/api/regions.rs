use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::{internal_error, AppState, ErrorResponse};
use crate::prefs::PrefStore;
use crate::regions::{closest_region, LatLon, Region, METERS_PER_MILE};

#[derive(Debug, Serialize, ToSchema)]
pub struct RegionListResponse {
    pub regions: Vec<Region>,
}

/// List all known regions from the current snapshot
#[utoipa::path(
    get,
    path = "/api/regions",
    responses(
        (status = 200, description = "Current region snapshot", body = RegionListResponse)
    ),
    tag = "regions"
)]
pub async fn list_regions(State(state): State<AppState>) -> Json<RegionListResponse> {
    let regions = state.regions.read().await.clone();
    Json(RegionListResponse { regions })
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ClosestRegionQuery {
    /// Device latitude in degrees
    pub lat: f64,
    /// Device longitude in degrees
    pub lon: f64,
    /// Reject regions more than 100 miles away (defaults to true)
    pub enforce_threshold: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClosestRegionResponse {
    /// The closest usable region, or null when none qualifies
    pub region: Option<Region>,
    pub distance_miles: Option<f64>,
    /// Whether the location falls inside the region's coverage span
    pub within_bounds: Option<bool>,
}

/// Find the closest usable region for a device location
#[utoipa::path(
    get,
    path = "/api/regions/closest",
    params(ClosestRegionQuery),
    responses(
        (status = 200, description = "Closest usable region, if any", body = ClosestRegionResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "regions"
)]
pub async fn find_closest_region(
    State(state): State<AppState>,
    Query(query): Query<ClosestRegionQuery>,
) -> Result<Json<ClosestRegionResponse>, (StatusCode, Json<ErrorResponse>)> {
    if !(-90.0..=90.0).contains(&query.lat) || !(-180.0..=180.0).contains(&query.lon) {
        return Err(crate::api::bad_request("lat/lon out of range"));
    }

    let prefs = PrefStore::new(state.pool.clone())
        .load()
        .await
        .map_err(internal_error)?;

    let loc = LatLon {
        lat: query.lat,
        lon: query.lon,
    };
    let regions = state.regions.read().await;

    let found = closest_region(
        &regions,
        Some(loc),
        query.enforce_threshold.unwrap_or(true),
        prefs.experimental_regions,
    );

    let response = match found {
        Some(region) => ClosestRegionResponse {
            distance_miles: region.distance_meters(loc).map(|m| m / METERS_PER_MILE),
            within_bounds: Some(region.contains(loc)),
            region: Some(region.clone()),
        },
        None => ClosestRegionResponse {
            region: None,
            distance_miles: None,
            within_bounds: None,
        },
    };

    Ok(Json(response))
}

use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::api::{internal_error, service_unavailable, upstream_error, AppState, ErrorResponse};
use crate::arrivals::{
    filter_arrivals, preferred_arrival_indexes, rank_arrivals, tag_favorites, Arrival,
    RankedArrival,
};
use crate::prefs::PrefStore;
use crate::regions::Region;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ArrivalsQuery {
    /// Comma-separated route id allow-list; omit for all routes
    pub routes: Option<String>,
    /// Region to query; defaults to the first usable region
    pub region_id: Option<i64>,
    /// Minutes past now to include; defaults from server config
    pub minutes_after: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ArrivalsResponse {
    pub stop_id: String,
    pub region_id: i64,
    /// Arrivals sorted ascending by ETA
    pub arrivals: Vec<RankedArrival>,
    /// Indexes into `arrivals` to feature in the summary header
    pub header_indexes: Vec<usize>,
    pub timestamp: String,
}

/// Ranked, filtered arrival predictions for one stop
#[utoipa::path(
    get,
    path = "/api/stops/{stop_id}/arrivals",
    params(
        ("stop_id" = String, Path, description = "Stop identifier"),
        ArrivalsQuery
    ),
    responses(
        (status = 200, description = "Ranked arrivals with header highlights", body = ArrivalsResponse),
        (status = 502, description = "Upstream transit API error", body = ErrorResponse),
        (status = 503, description = "No usable region", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "arrivals"
)]
pub async fn get_stop_arrivals(
    State(state): State<AppState>,
    Path(stop_id): Path<String>,
    Query(query): Query<ArrivalsQuery>,
) -> Result<Json<ArrivalsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let prefs_store = PrefStore::new(state.pool.clone());
    let prefs = prefs_store.load().await.map_err(internal_error)?;
    let favorites = prefs_store.favorite_set().await.map_err(internal_error)?;

    // Resolve the region explicitly; there is no ambient current region.
    let region = {
        let regions = state.regions.read().await;
        resolve_region(&regions, query.region_id, prefs.experimental_regions)
            .ok_or_else(|| service_unavailable("No usable region"))?
    };

    let minutes_after = query
        .minutes_after
        .unwrap_or(state.config.arrivals_window_minutes);

    let mut arrivals = state
        .client
        .fetch_arrivals(&region.api_base_url, &stop_id, minutes_after)
        .await
        .map_err(upstream_error)?;

    tag_favorites(&mut arrivals, &favorites);

    let mut route_filter: Vec<String> = query
        .routes
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();

    if clear_all_selected_filter(&mut route_filter, &arrivals) {
        debug!(stop_id = %stop_id, "Route filter selects all routes, clearing");
    }

    let now = Utc::now();
    let filtered = filter_arrivals(&arrivals, &route_filter, prefs.show_negative_arrivals, now);
    let ranked = rank_arrivals(filtered, now);
    let header_indexes = preferred_arrival_indexes(&ranked);

    debug!(
        stop_id = %stop_id,
        region = %region.name,
        total = arrivals.len(),
        shown = ranked.len(),
        highlighted = header_indexes.len(),
        "Ranked arrivals for stop"
    );

    Ok(Json(ArrivalsResponse {
        stop_id,
        region_id: region.id,
        arrivals: ranked,
        header_indexes,
        timestamp: now.to_rfc3339(),
    }))
}

/// A filter that selects every route at the stop is the same as no
/// filter; clearing it here keeps the filter component literal. Returns
/// true when the filter was cleared.
fn clear_all_selected_filter(route_filter: &mut Vec<String>, arrivals: &[Arrival]) -> bool {
    if route_filter.is_empty() {
        return false;
    }
    let present: HashSet<&str> = arrivals.iter().map(|a| a.route_id.as_str()).collect();
    if present.iter().all(|r| route_filter.iter().any(|f| f.as_str() == *r)) {
        route_filter.clear();
        return true;
    }
    false
}

/// Picks the requested region by id, or the first usable one.
fn resolve_region(
    regions: &[Region],
    region_id: Option<i64>,
    experimental_opt_in: bool,
) -> Option<Region> {
    match region_id {
        Some(id) => regions
            .iter()
            .find(|r| r.id == id && r.is_usable(experimental_opt_in))
            .cloned(),
        None => regions
            .iter()
            .find(|r| r.is_usable(experimental_opt_in))
            .cloned(),
    }
}

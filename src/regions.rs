//! Transit service regions and closest-region selection.
//!
//! A region is one geographic service area backed by one upstream transit
//! data server. The device location is matched against the centers of a
//! region's declared bounds; auto-selection refuses regions more than
//! `MAX_AUTO_SELECT_MILES` away so the app never silently picks a server
//! the rider is nowhere near.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;

pub const METERS_PER_MILE: f64 = 1609.344;

/// Outer distance threshold for automatic region selection, in miles.
pub const MAX_AUTO_SELECT_MILES: f64 = 100.0;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A geographic point in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// One rectangular piece of a region's coverage area, given as a center
/// point plus a lat/lon span. A region may have several disjoint bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct RegionBounds {
    pub lat: f64,
    pub lon: f64,
    pub lat_span: f64,
    pub lon_span: f64,
}

/// Enclosing box over all of a region's bounds.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct RegionSpan {
    pub lat_span: f64,
    pub lon_span: f64,
    pub center_lat: f64,
    pub center_lon: f64,
}

/// A transit-agency service area served by one data backend.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Region {
    pub id: i64,
    pub name: String,
    /// Base URL of the region's transit data API.
    pub api_base_url: String,
    pub bounds: Vec<RegionBounds>,
    pub active: bool,
    pub supports_discovery: bool,
    pub supports_realtime: bool,
    pub experimental: bool,
}

impl Region {
    /// Checks whether this region can actually be used by the app:
    /// it must be active, support both the discovery and realtime APIs,
    /// and experimental regions require the user opt-in preference.
    pub fn is_usable(&self, experimental_opt_in: bool) -> bool {
        if !self.active {
            debug!(region = %self.name, "Region is not active");
            return false;
        }
        if !self.supports_discovery {
            debug!(region = %self.name, "Region does not support discovery APIs");
            return false;
        }
        if !self.supports_realtime {
            debug!(region = %self.name, "Region does not support realtime APIs");
            return false;
        }
        if self.experimental && !experimental_opt_in {
            debug!(region = %self.name, "Region is experimental and user has not opted in");
            return false;
        }
        true
    }

    /// Distance from `loc` to the center of the closest of this region's
    /// bounds, in meters. `None` when the region declares no bounds.
    pub fn distance_meters(&self, loc: LatLon) -> Option<f64> {
        self.bounds
            .iter()
            .map(|b| haversine_meters(loc, LatLon { lat: b.lat, lon: b.lon }))
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Greater))
    }

    /// Enclosing lat/lon box over all bounds, or `None` when there are none.
    pub fn span(&self) -> Option<RegionSpan> {
        if self.bounds.is_empty() {
            return None;
        }
        let mut lat_min = 90.0_f64;
        let mut lat_max = -90.0_f64;
        let mut lon_min = 180.0_f64;
        let mut lon_max = -180.0_f64;

        for b in &self.bounds {
            let lat_half = b.lat_span / 2.0;
            lat_min = lat_min.min(b.lat - lat_half);
            lat_max = lat_max.max(b.lat + lat_half);

            let lon_half = b.lon_span / 2.0;
            lon_min = lon_min.min(b.lon - lon_half);
            lon_max = lon_max.max(b.lon + lon_half);
        }

        Some(RegionSpan {
            lat_span: lat_max - lat_min,
            lon_span: lon_max - lon_min,
            center_lat: lat_min + (lat_max - lat_min) / 2.0,
            center_lon: lon_min + (lon_max - lon_min) / 2.0,
        })
    }

    /// True when `loc` falls inside the enclosing span of this region.
    ///
    /// Does not handle spans crossing the antimeridian.
    pub fn contains(&self, loc: LatLon) -> bool {
        let Some(span) = self.span() else {
            return false;
        };
        let min_lat = span.center_lat - span.lat_span / 2.0;
        let max_lat = span.center_lat + span.lat_span / 2.0;
        let min_lon = span.center_lon - span.lon_span / 2.0;
        let max_lon = span.center_lon + span.lon_span / 2.0;

        min_lat <= loc.lat && loc.lat <= max_lat && min_lon <= loc.lon && loc.lon <= max_lon
    }
}

/// Great-circle distance between two points using the Haversine formula.
/// Returns distance in meters.
pub fn haversine_meters(a: LatLon, b: LatLon) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Picks the closest usable region for a device location.
///
/// Unusable regions are filtered out first, then the region with the
/// smallest bounds-center distance wins. With `enforce_threshold` the
/// result is `None` when even the closest region is more than
/// `MAX_AUTO_SELECT_MILES` away. A missing location means no distance can
/// be computed, so nothing matches.
pub fn closest_region<'a>(
    regions: &'a [Region],
    location: Option<LatLon>,
    enforce_threshold: bool,
    experimental_opt_in: bool,
) -> Option<&'a Region> {
    let loc = location?;

    let mut min_dist = f64::MAX;
    let mut closest: Option<&Region> = None;

    debug!(lat = loc.lat, lon = loc.lon, "Finding closest region");

    for region in regions {
        if !region.is_usable(experimental_opt_in) {
            debug!(region = %region.name, "Excluding region from closest-region consideration");
            continue;
        }

        let Some(dist) = region.distance_meters(loc) else {
            warn!(region = %region.name, "Region has no bounds, cannot measure distance");
            continue;
        };

        debug!(
            region = %region.name,
            miles = dist / METERS_PER_MILE,
            "Measured distance to region"
        );

        if dist < min_dist {
            min_dist = dist;
            closest = Some(region);
        }
    }

    if enforce_threshold && min_dist / METERS_PER_MILE >= MAX_AUTO_SELECT_MILES {
        return None;
    }
    closest
}

//! Client for the OneBusAway-style transit data REST API.
//!
//! Two endpoints are used:
//!
//! - the regions directory, a standalone document listing every known
//!   service region with its bounds and capability flags;
//! - `arrivals-and-departures-for-stop`, served by the region's own API
//!   base URL, returning predicted and scheduled arrivals for one stop.
//!
//! Responses share an envelope: `{ "code": 200, "text": "OK", "data": ... }`.
//! Times on the wire are epoch milliseconds; they are converted to epoch
//! seconds at the boundary so everything downstream works in seconds.

use serde::Deserialize;
use tracing::{debug, info};

use crate::arrivals::Arrival;
use crate::regions::{Region, RegionBounds};

#[derive(Debug, thiserror::Error)]
pub enum ObaError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("API returned error code {0}")]
    Api(i32),
}

#[derive(Debug, Clone, Deserialize)]
struct ObaEnvelope<T> {
    pub code: i32,
    #[allow(dead_code)]
    pub text: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct ObaRegionsData {
    pub list: Vec<ObaRegionElement>,
}

#[derive(Debug, Clone, Deserialize)]
struct ObaRegionElement {
    pub id: i64,
    #[serde(rename = "regionName")]
    pub region_name: String,
    #[serde(rename = "obaBaseUrl")]
    pub oba_base_url: String,
    #[serde(default)]
    pub bounds: Vec<ObaRegionBounds>,
    pub active: bool,
    #[serde(rename = "supportsObaDiscoveryApis")]
    pub supports_oba_discovery_apis: bool,
    #[serde(rename = "supportsObaRealtimeApis")]
    pub supports_oba_realtime_apis: bool,
    #[serde(default)]
    pub experimental: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ObaRegionBounds {
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "latSpan")]
    pub lat_span: f64,
    #[serde(rename = "lonSpan")]
    pub lon_span: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct ObaArrivalsData {
    pub entry: ObaArrivalsEntry,
}

#[derive(Debug, Clone, Deserialize)]
struct ObaArrivalsEntry {
    #[serde(rename = "stopId")]
    pub stop_id: String,
    #[serde(rename = "arrivalsAndDepartures", default)]
    pub arrivals_and_departures: Vec<ObaArrivalAndDeparture>,
}

#[derive(Debug, Clone, Deserialize)]
struct ObaArrivalAndDeparture {
    #[serde(rename = "routeId")]
    pub route_id: String,
    #[serde(rename = "routeShortName", default)]
    pub route_short_name: String,
    #[serde(rename = "tripHeadsign", default)]
    pub trip_headsign: String,
    #[serde(rename = "tripId")]
    pub trip_id: String,
    /// Scheduled arrival, epoch milliseconds.
    #[serde(rename = "scheduledArrivalTime")]
    pub scheduled_arrival_time: i64,
    /// Predicted arrival, epoch milliseconds. 0 when no realtime data.
    #[serde(rename = "predictedArrivalTime", default)]
    pub predicted_arrival_time: i64,
    #[serde(rename = "vehicleId", default)]
    pub vehicle_id: Option<String>,
}

impl From<ObaRegionElement> for Region {
    fn from(e: ObaRegionElement) -> Self {
        Region {
            id: e.id,
            name: e.region_name,
            api_base_url: e.oba_base_url,
            bounds: e
                .bounds
                .into_iter()
                .map(|b| RegionBounds {
                    lat: b.lat,
                    lon: b.lon,
                    lat_span: b.lat_span,
                    lon_span: b.lon_span,
                })
                .collect(),
            active: e.active,
            supports_discovery: e.supports_oba_discovery_apis,
            supports_realtime: e.supports_oba_realtime_apis,
            experimental: e.experimental,
        }
    }
}

/// Parses a regions directory document (the same format the regions REST
/// API serves, also used for the bundled fallback file).
pub fn parse_regions_document(json: &str) -> Result<Vec<Region>, ObaError> {
    let envelope: ObaEnvelope<ObaRegionsData> =
        serde_json::from_str(json).map_err(|e| ObaError::Decode(e.to_string()))?;
    if envelope.code != 200 {
        return Err(ObaError::Api(envelope.code));
    }
    let data = envelope
        .data
        .ok_or_else(|| ObaError::Decode("regions response has no data".to_string()))?;
    Ok(data.list.into_iter().map(Region::from).collect())
}

pub struct ObaClient {
    http: reqwest::Client,
    api_key: String,
}

impl ObaClient {
    pub fn new(api_key: String) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()?;
        Ok(ObaClient { http, api_key })
    }

    /// Fetch the region directory from the given URL.
    pub async fn fetch_regions(&self, url: &str) -> Result<Vec<Region>, ObaError> {
        debug!(url = %url, "Fetching regions directory");

        let body = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ObaError::Http(e.to_string()))?
            .text()
            .await
            .map_err(|e| ObaError::Http(e.to_string()))?;

        let regions = parse_regions_document(&body)?;
        info!(count = regions.len(), "Fetched regions from server");
        Ok(regions)
    }

    /// Fetch predicted arrivals for one stop from a region's API.
    ///
    /// `minutes_after` widens the search window past "now". Returned
    /// arrivals carry `favorite = false`; the caller tags favorites.
    pub async fn fetch_arrivals(
        &self,
        api_base_url: &str,
        stop_id: &str,
        minutes_after: u32,
    ) -> Result<Vec<Arrival>, ObaError> {
        let url = format!(
            "{}/api/where/arrivals-and-departures-for-stop/{}.json?key={}&minutesAfter={}",
            api_base_url.trim_end_matches('/'),
            urlencoding::encode(stop_id),
            urlencoding::encode(&self.api_key),
            minutes_after
        );

        debug!(url = %url, stop_id = %stop_id, "Fetching arrivals");

        let envelope: ObaEnvelope<ObaArrivalsData> = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ObaError::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| ObaError::Decode(e.to_string()))?;

        if envelope.code != 200 {
            return Err(ObaError::Api(envelope.code));
        }
        let entry = envelope
            .data
            .ok_or_else(|| ObaError::Decode("arrivals response has no data".to_string()))?
            .entry;

        let arrivals: Vec<Arrival> = entry
            .arrivals_and_departures
            .into_iter()
            .map(|a| Arrival {
                route_id: a.route_id,
                route_short_name: a.route_short_name,
                headsign: a.trip_headsign,
                trip_id: a.trip_id,
                stop_id: entry.stop_id.clone(),
                scheduled_time: a.scheduled_arrival_time / 1000,
                predicted_time: a.predicted_arrival_time / 1000,
                vehicle_id: a.vehicle_id,
                favorite: false,
            })
            .collect();

        info!(stop_id = %stop_id, count = arrivals.len(), "Fetched arrivals");
        Ok(arrivals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_regions_document() {
        let json = r#"{
            "code": 200,
            "text": "OK",
            "data": {
                "list": [
                    {
                        "id": 1,
                        "regionName": "Puget Sound",
                        "obaBaseUrl": "https://api.pugetsound.example.org/",
                        "bounds": [
                            {"lat": 47.6, "lon": -122.3, "latSpan": 0.6, "lonSpan": 0.7}
                        ],
                        "active": true,
                        "supportsObaDiscoveryApis": true,
                        "supportsObaRealtimeApis": true,
                        "experimental": false
                    },
                    {
                        "id": 2,
                        "regionName": "Boundless",
                        "obaBaseUrl": "https://api.boundless.example.org/",
                        "active": false,
                        "supportsObaDiscoveryApis": false,
                        "supportsObaRealtimeApis": true
                    }
                ]
            }
        }"#;

        let regions = parse_regions_document(json).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].name, "Puget Sound");
        assert_eq!(regions[0].bounds.len(), 1);
        assert!(regions[0].is_usable(false));
        assert!(regions[1].bounds.is_empty());
        assert!(!regions[1].is_usable(false));
    }

    #[test]
    fn test_parse_regions_document_error_code() {
        let json = r#"{"code": 500, "text": "ERROR", "data": null}"#;
        assert!(matches!(
            parse_regions_document(json),
            Err(ObaError::Api(500))
        ));
    }

    #[test]
    fn test_parse_regions_document_garbage() {
        assert!(matches!(
            parse_regions_document("not json"),
            Err(ObaError::Decode(_))
        ));
    }
}

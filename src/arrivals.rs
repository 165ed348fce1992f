//! Arrival aggregation and ranking.
//!
//! Turns the raw predicted-arrival list for a stop into the model the
//! presentation layer renders: filtered by route and by the negative-ETA
//! preference, sorted ascending by ETA, classified against the schedule,
//! and with up to two entries picked out for the summary header.
//!
//! Everything here is a pure, synchronous function over immutable inputs;
//! callers run it after data retrieval completes.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One predicted arrival at a stop, as reported by the upstream API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Arrival {
    pub route_id: String,
    pub route_short_name: String,
    /// Destination label shown on the vehicle; identifies a trip pattern
    /// together with the route id.
    pub headsign: String,
    pub trip_id: String,
    pub stop_id: String,
    /// Scheduled time, epoch seconds.
    pub scheduled_time: i64,
    /// Predicted time, epoch seconds. 0 when no realtime data exists.
    pub predicted_time: i64,
    pub vehicle_id: Option<String>,
    /// True when the rider has starred this route+headsign combination.
    pub favorite: bool,
}

/// How an arrival is running relative to its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviationStatus {
    Early,
    OnTime,
    Late,
    /// No realtime prediction is available.
    ScheduledOnly,
}

impl DeviationStatus {
    /// Classifies a scheduled/predicted pair. A predicted time of 0 means
    /// no realtime data. Total over the numeric domain.
    pub fn classify(scheduled: i64, predicted: i64) -> Self {
        if predicted == 0 {
            return DeviationStatus::ScheduledOnly;
        }
        let delay = predicted - scheduled;
        if delay > 0 {
            DeviationStatus::Late
        } else if delay < 0 {
            DeviationStatus::Early
        } else {
            DeviationStatus::OnTime
        }
    }

    /// Display color for this status.
    pub fn color(&self) -> &'static str {
        match self {
            DeviationStatus::Early => "#d94a38",
            DeviationStatus::OnTime => "#4caf50",
            DeviationStatus::Late => "#2962ae",
            DeviationStatus::ScheduledOnly => "#777777",
        }
    }

    /// Human status label, e.g. "3 min delay" or "on time".
    pub fn label(&self, scheduled: i64, predicted: i64) -> String {
        match self {
            DeviationStatus::ScheduledOnly => "scheduled".to_string(),
            DeviationStatus::OnTime => "on time".to_string(),
            DeviationStatus::Late => {
                format!("{} min delay", (predicted - scheduled) / 60)
            }
            DeviationStatus::Early => {
                format!("{} min early", (scheduled - predicted) / 60)
            }
        }
    }
}

/// An arrival plus its derived presentation fields. Created by
/// [`rank_arrivals`], never mutated afterwards.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RankedArrival {
    pub arrival: Arrival,
    /// Minutes until arrival relative to "now"; negative means the vehicle
    /// already departed.
    pub eta: i64,
    pub status: DeviationStatus,
    pub status_label: String,
    pub color: String,
}

/// ETA in whole minutes for an arrival. The predicted time wins when
/// realtime data exists; both sides are truncated to minutes first, so an
/// ETA of 0 spans the current minute.
pub fn eta_minutes(arrival: &Arrival, now: DateTime<Utc>) -> i64 {
    let event = if arrival.predicted_time != 0 {
        arrival.predicted_time
    } else {
        arrival.scheduled_time
    };
    event / 60 - now.timestamp() / 60
}

/// Marks every arrival whose route+headsign pair the rider has starred.
pub fn tag_favorites(arrivals: &mut [Arrival], favorites: &HashSet<(String, String)>) {
    for arrival in arrivals.iter_mut() {
        arrival.favorite =
            favorites.contains(&(arrival.route_id.clone(), arrival.headsign.clone()));
    }
}

/// Applies the route allow-list and the negative-ETA preference,
/// preserving the input order.
///
/// An empty `route_filter` means "no filter". A non-empty filter that
/// matches nothing yields an empty list; treating an all-selected filter
/// as no filter is the caller's policy, not this function's.
pub fn filter_arrivals(
    arrivals: &[Arrival],
    route_filter: &[String],
    show_negative: bool,
    now: DateTime<Utc>,
) -> Vec<Arrival> {
    arrivals
        .iter()
        .filter(|a| route_filter.is_empty() || route_filter.iter().any(|r| r == &a.route_id))
        .filter(|a| show_negative || eta_minutes(a, now) >= 0)
        .cloned()
        .collect()
}

/// Derives ETA and deviation for each arrival and sorts ascending by ETA.
/// The sort is stable, so equal ETAs keep their input order. Never drops
/// or adds records.
pub fn rank_arrivals(arrivals: Vec<Arrival>, now: DateTime<Utc>) -> Vec<RankedArrival> {
    let mut ranked: Vec<RankedArrival> = arrivals
        .into_iter()
        .map(|arrival| {
            let eta = eta_minutes(&arrival, now);
            let status =
                DeviationStatus::classify(arrival.scheduled_time, arrival.predicted_time);
            let status_label = status.label(arrival.scheduled_time, arrival.predicted_time);
            let color = status.color().to_string();
            RankedArrival {
                arrival,
                eta,
                status,
                status_label,
                color,
            }
        })
        .collect();
    ranked.sort_by_key(|r| r.eta);
    ranked
}

/// Index of the first arrival that has not yet departed (ETA >= 0), or
/// `None` when every arrival in the list is already in the past.
pub fn first_non_negative_index(ranked: &[RankedArrival]) -> Option<usize> {
    ranked.iter().position(|r| r.eta >= 0)
}

/// Picks the indexes to feature in the summary header.
///
/// Starred route+headsign combinations at or after the first non-negative
/// arrival always win. With fewer than two stars the first non-negative
/// arrival (and its successor) fill the remaining slots, so the header is
/// never empty while any upcoming arrival exists. More than two starred
/// indexes are returned as-is; the caller truncates for display. Indexes
/// are never duplicated.
pub fn preferred_arrival_indexes(ranked: &[RankedArrival]) -> Vec<usize> {
    let Some(first) = first_non_negative_index(ranked) else {
        return Vec::new();
    };

    let mut preferred: Vec<usize> = (first..ranked.len())
        .filter(|&i| ranked[i].arrival.favorite)
        .collect();

    if preferred.len() >= 2 {
        return preferred;
    }

    if preferred.len() == 1 {
        if preferred[0] != first {
            preferred.push(first);
        }
        return preferred;
    }

    preferred.push(first);
    if first + 1 < ranked.len() {
        preferred.push(first + 1);
    }
    preferred
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_040, 0).unwrap()
    }

    /// Arrival with the given ETA in minutes relative to [`now`], built
    /// through the scheduled time so the minute truncation applies.
    fn arrival(route_id: &str, eta: i64) -> Arrival {
        Arrival {
            route_id: route_id.to_string(),
            route_short_name: route_id.to_string(),
            headsign: format!("{} Downtown", route_id),
            trip_id: format!("trip-{}-{}", route_id, eta),
            stop_id: "stop-1".to_string(),
            scheduled_time: (now().timestamp() / 60 + eta) * 60,
            predicted_time: 0,
            vehicle_id: None,
            favorite: false,
        }
    }

    fn starred(route_id: &str, eta: i64) -> Arrival {
        let mut a = arrival(route_id, eta);
        a.favorite = true;
        a
    }

    #[test]
    fn test_classify_late_early_ontime_scheduled() {
        assert_eq!(DeviationStatus::classify(100, 110), DeviationStatus::Late);
        assert_eq!(DeviationStatus::classify(100, 90), DeviationStatus::Early);
        assert_eq!(DeviationStatus::classify(100, 100), DeviationStatus::OnTime);
        assert_eq!(
            DeviationStatus::classify(100, 0),
            DeviationStatus::ScheduledOnly
        );
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(DeviationStatus::Late.label(0, 300), "5 min delay");
        assert_eq!(DeviationStatus::Early.label(300, 180), "2 min early");
        assert_eq!(DeviationStatus::OnTime.label(300, 300), "on time");
        assert_eq!(DeviationStatus::ScheduledOnly.label(300, 0), "scheduled");
    }

    #[test]
    fn test_eta_prefers_predicted_time() {
        let mut a = arrival("A", 10);
        assert_eq!(eta_minutes(&a, now()), 10);
        a.predicted_time = a.scheduled_time + 180;
        assert_eq!(eta_minutes(&a, now()), 13);
    }

    #[test]
    fn test_filter_hides_negative_etas() {
        // The worked example: [{A,-3},{B,0},{A,5}] with no route filter.
        let arrivals = vec![arrival("A", -3), arrival("B", 0), arrival("A", 5)];
        let filtered = filter_arrivals(&arrivals, &[], false, now());
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].route_id, "B");
        assert_eq!(filtered[1].route_id, "A");

        let ranked = rank_arrivals(filtered, now());
        assert_eq!(ranked[0].eta, 0);
        assert_eq!(ranked[1].eta, 5);
        assert_eq!(first_non_negative_index(&ranked), Some(0));
    }

    #[test]
    fn test_filter_route_allow_list() {
        // Same arrivals, allow-list {A}: the negative A is dropped by the
        // preference, B is excluded by the filter.
        let arrivals = vec![arrival("A", -3), arrival("B", 0), arrival("A", 5)];
        let filtered = filter_arrivals(&arrivals, &["A".to_string()], false, now());
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].route_id, "A");
        assert_eq!(eta_minutes(&filtered[0], now()), 5);
    }

    #[test]
    fn test_filter_show_negative_keeps_all() {
        let arrivals = vec![arrival("A", -3), arrival("B", 0)];
        let filtered = filter_arrivals(&arrivals, &[], true, now());
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_filter_matching_nothing_is_empty() {
        let arrivals = vec![arrival("A", 1), arrival("B", 2)];
        let filtered = filter_arrivals(&arrivals, &["C".to_string()], true, now());
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_ranking_preserves_length_and_is_stable() {
        let arrivals = vec![
            arrival("C", 7),
            arrival("A", 3),
            arrival("B", 3),
            arrival("D", -1),
        ];
        let ranked = rank_arrivals(arrivals.clone(), now());
        assert_eq!(ranked.len(), arrivals.len());
        assert_eq!(ranked[0].arrival.route_id, "D");
        // Equal ETAs keep input order.
        assert_eq!(ranked[1].arrival.route_id, "A");
        assert_eq!(ranked[2].arrival.route_id, "B");
        assert_eq!(ranked[3].arrival.route_id, "C");
    }

    #[test]
    fn test_ranking_is_idempotent() {
        let arrivals = vec![arrival("C", 7), arrival("A", 3), arrival("B", 3)];
        let once = rank_arrivals(arrivals, now());
        let again = rank_arrivals(once.iter().map(|r| r.arrival.clone()).collect(), now());
        let order_once: Vec<_> = once.iter().map(|r| r.arrival.trip_id.clone()).collect();
        let order_again: Vec<_> = again.iter().map(|r| r.arrival.trip_id.clone()).collect();
        assert_eq!(order_once, order_again);
    }

    #[test]
    fn test_first_non_negative_none_when_all_departed() {
        let ranked = rank_arrivals(vec![arrival("A", -5), arrival("B", -1)], now());
        assert_eq!(first_non_negative_index(&ranked), None);
        assert!(preferred_arrival_indexes(&ranked).is_empty());
    }

    #[test]
    fn test_preferred_no_favorites_takes_first_two() {
        let ranked = rank_arrivals(
            vec![arrival("A", -2), arrival("B", 1), arrival("C", 4)],
            now(),
        );
        assert_eq!(preferred_arrival_indexes(&ranked), vec![1, 2]);
    }

    #[test]
    fn test_preferred_no_favorites_single_upcoming() {
        let ranked = rank_arrivals(vec![arrival("A", -2), arrival("B", 1)], now());
        assert_eq!(preferred_arrival_indexes(&ranked), vec![1]);
    }

    #[test]
    fn test_preferred_one_favorite_pairs_with_first() {
        let ranked = rank_arrivals(
            vec![arrival("A", 1), starred("B", 5), arrival("C", 9)],
            now(),
        );
        // Favorite first, then the first non-negative arrival.
        assert_eq!(preferred_arrival_indexes(&ranked), vec![1, 0]);
    }

    #[test]
    fn test_preferred_favorite_is_first() {
        let ranked = rank_arrivals(vec![starred("A", 1), arrival("B", 5)], now());
        assert_eq!(preferred_arrival_indexes(&ranked), vec![0]);
    }

    #[test]
    fn test_preferred_many_favorites_returned_unmodified() {
        let ranked = rank_arrivals(
            vec![
                starred("A", 1),
                starred("B", 3),
                starred("C", 5),
                arrival("D", 7),
            ],
            now(),
        );
        assert_eq!(preferred_arrival_indexes(&ranked), vec![0, 1, 2]);
    }

    #[test]
    fn test_preferred_ignores_departed_favorites() {
        let ranked = rank_arrivals(
            vec![starred("A", -3), arrival("B", 2), arrival("C", 6)],
            now(),
        );
        // The starred arrival already departed; fall back to first two.
        assert_eq!(preferred_arrival_indexes(&ranked), vec![1, 2]);
    }

    #[test]
    fn test_preferred_never_duplicates() {
        for etas in [vec![1, 2, 3], vec![-1, 0, 4], vec![0], vec![-2, 5]] {
            let arrivals: Vec<Arrival> = etas
                .iter()
                .enumerate()
                .map(|(i, &eta)| {
                    if i % 2 == 0 {
                        starred(&format!("R{}", i), eta)
                    } else {
                        arrival(&format!("R{}", i), eta)
                    }
                })
                .collect();
            let ranked = rank_arrivals(arrivals, now());
            let indexes = preferred_arrival_indexes(&ranked);
            let mut deduped = indexes.clone();
            deduped.sort_unstable();
            deduped.dedup();
            assert_eq!(indexes.len(), deduped.len(), "etas: {:?}", etas);
        }
    }

    #[test]
    fn test_tag_favorites() {
        let mut arrivals = vec![arrival("A", 1), arrival("B", 2)];
        let favorites: HashSet<(String, String)> =
            [("A".to_string(), "A Downtown".to_string())].into();
        tag_favorites(&mut arrivals, &favorites);
        assert!(arrivals[0].favorite);
        assert!(!arrivals[1].favorite);
    }
}

//! One-way data flow for the arrivals screen.
//!
//! Each refresh is a pure step: (previous state, fetch outcome) ->
//! (next state, UI commands). The state owns the last good ranked list,
//! so a failed refresh keeps stale data on screen instead of blanking it.

use chrono::{DateTime, Utc};

use crate::arrivals::{
    filter_arrivals, preferred_arrival_indexes, rank_arrivals, Arrival, RankedArrival,
};

/// Result of one data refresh for a stop.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Arrivals(Vec<Arrival>),
    Failed(String),
}

/// Instructions for the rendering layer, emitted by [`ArrivalsScreenState::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    /// Re-render the arrivals list from the state's ranked list.
    RefreshList,
    /// Update the summary header with these indexes into the ranked list.
    SetHeader(Vec<usize>),
    /// Surface a fetch error; stale data stays visible.
    ShowError(String),
}

/// Accumulated state for one stop's arrivals screen.
#[derive(Debug, Clone, Default)]
pub struct ArrivalsScreenState {
    pub stop_id: String,
    pub ranked: Vec<RankedArrival>,
    pub header_indexes: Vec<usize>,
    /// Successful responses so far; lets the renderer distinguish "never
    /// loaded" from "refresh failed after data was shown".
    pub responses: u32,
    pub last_error: Option<String>,
}

impl ArrivalsScreenState {
    pub fn new(stop_id: impl Into<String>) -> Self {
        ArrivalsScreenState {
            stop_id: stop_id.into(),
            ..Default::default()
        }
    }

    /// Folds one refresh outcome into the state.
    ///
    /// On success the raw arrivals run through filter, rank and header
    /// selection; on failure the previous ranked list is kept untouched.
    pub fn update(
        mut self,
        outcome: RefreshOutcome,
        route_filter: &[String],
        show_negative: bool,
        now: DateTime<Utc>,
    ) -> (Self, Vec<UiCommand>) {
        match outcome {
            RefreshOutcome::Arrivals(arrivals) => {
                let filtered = filter_arrivals(&arrivals, route_filter, show_negative, now);
                self.ranked = rank_arrivals(filtered, now);
                self.header_indexes = preferred_arrival_indexes(&self.ranked);
                self.responses += 1;
                self.last_error = None;
                let commands = vec![
                    UiCommand::RefreshList,
                    UiCommand::SetHeader(self.header_indexes.clone()),
                ];
                (self, commands)
            }
            RefreshOutcome::Failed(message) => {
                self.last_error = Some(message.clone());
                (self, vec![UiCommand::ShowError(message)])
            }
        }
    }
}

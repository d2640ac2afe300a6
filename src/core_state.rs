//! Shared application state read by the dashboard.
//!
//! One `CoreState` is built at startup and handed to the coordinator by
//! `Arc`. The coordinator is its only writer; views read through the
//! accessors.

use std::sync::{PoisonError, RwLock};

use crate::aggregate::AggregateView;
use crate::history::HospitalHistory;

pub struct CoreState {
    aggregates: AggregateView,
    history: HospitalHistory,
    /// Hospital signed in on this device. `None` for public sessions.
    active_hospital: RwLock<Option<String>>,
}

impl Default for CoreState {
    fn default() -> Self {
        Self::new(AggregateView::with_known_locations(), HospitalHistory::default())
    }
}

impl CoreState {
    pub fn new(aggregates: AggregateView, history: HospitalHistory) -> Self {
        Self {
            aggregates,
            history,
            active_hospital: RwLock::new(None),
        }
    }

    pub fn aggregates(&self) -> &AggregateView {
        &self.aggregates
    }

    pub fn history(&self) -> &HospitalHistory {
        &self.history
    }

    pub fn active_hospital(&self) -> Option<String> {
        self.active_hospital
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_active_hospital(&self, hospital_id: Option<String>) {
        *self
            .active_hospital
            .write()
            .unwrap_or_else(PoisonError::into_inner) = hospital_id;
    }
}

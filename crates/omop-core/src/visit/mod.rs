//! Visit reconciliation.
//!
//! Two post-processing stages over the per-document tables: nested visits
//! are reclassified into a detail table under their enclosing inpatient
//! stay, and clinical events without a resolved visit key are linked to
//! visits (and details) by temporal containment.

mod hierarchy;
mod linker;

pub use hierarchy::reclassify_nested_visits;
pub use linker::{link_events_to_visit_details, link_events_to_visits};

use chrono::{NaiveDate, NaiveDateTime};
use omop_model::OutputRecord;

pub(crate) const VISIT_TABLE: &str = "Visit";
pub(crate) const ENCOMPASSING_TABLE: &str = "Visit_encompassingEncounter";
pub(crate) const VISIT_DETAIL_TABLE: &str = "VisitDetail";

/// A visit's temporal extent at both precisions, read from `{prefix}_start_*`
/// and `{prefix}_end_*` fields.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Window {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub start_datetime: Option<NaiveDateTime>,
    pub end_datetime: Option<NaiveDateTime>,
}

impl Window {
    pub fn of(record: &OutputRecord, prefix: &str) -> Self {
        let date = |suffix: &str| {
            record
                .get(&format!("{prefix}_{suffix}_date"))
                .and_then(omop_model::Value::as_date)
        };
        let datetime = |suffix: &str| {
            record
                .get(&format!("{prefix}_{suffix}_datetime"))
                .and_then(omop_model::Value::as_datetime)
        };
        Self {
            start_date: date("start"),
            end_date: date("end"),
            start_datetime: datetime("start"),
            end_datetime: datetime("end"),
        }
    }

    /// Length in days at the finest available precision. `None` when the
    /// window has no complete start/end pair.
    pub fn duration_days(&self) -> Option<f64> {
        if let (Some(start), Some(end)) = (self.start_datetime, self.end_datetime) {
            return Some((end - start).num_seconds() as f64 / 86_400.0);
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            return Some((end - start).num_days() as f64);
        }
        None
    }

    /// Inclusive interval containment, compared at the child's precision.
    /// False when either side lacks the pair the comparison needs.
    pub fn contains(&self, child: &Self) -> bool {
        if let (Some(child_start), Some(child_end)) = (child.start_datetime, child.end_datetime) {
            let (Some(start), Some(end)) = (self.start_datetime, self.end_datetime) else {
                return false;
            };
            return start <= child_start && child_end <= end;
        }
        if let (Some(child_start), Some(child_end)) = (child.start_date, child.end_date) {
            let (Some(start), Some(end)) = (self.start_date, self.end_date) else {
                return false;
            };
            return start <= child_start && child_end <= end;
        }
        false
    }
}

//! Temporal linking of clinical events to visits.
//!
//! Events whose foreign-key phase could not settle on a visit (no carried
//! key, or several) are matched to the one visit whose window contains the
//! event's timestamp. A second pass narrows events to a visit detail within
//! their already-assigned visit.

use chrono::{NaiveDate, NaiveDateTime};
use omop_model::{Metadata, OutputRecord, Value};
use tracing::{debug, info};

use super::{VISIT_DETAIL_TABLE, VISIT_TABLE, Window};
use crate::datetime::end_of_day;
use crate::pipeline::DocumentOutput;

/// Transient diagnostic written when several visits match one event.
/// Removed again before the output leaves the linker.
const CANDIDATES_FIELD: &str = "__visit_candidates";

/// Where a clinical domain keeps its event timestamp(s) and its own id.
struct DomainDates {
    id: &'static str,
    start_date: &'static str,
    start_datetime: &'static str,
    /// Interval domains carry an end; point domains have a single date.
    end_date: Option<&'static str>,
    end_datetime: Option<&'static str>,
}

fn domain_dates(domain_id: &str) -> Option<DomainDates> {
    let point = |id, date, datetime| DomainDates {
        id,
        start_date: date,
        start_datetime: datetime,
        end_date: None,
        end_datetime: None,
    };
    match domain_id {
        "Measurement" => Some(point("measurement_id", "measurement_date", "measurement_datetime")),
        "Observation" => Some(point("observation_id", "observation_date", "observation_datetime")),
        "Procedure" => Some(point(
            "procedure_occurrence_id",
            "procedure_date",
            "procedure_datetime",
        )),
        "Condition" => Some(DomainDates {
            id: "condition_occurrence_id",
            start_date: "condition_start_date",
            start_datetime: "condition_start_datetime",
            end_date: Some("condition_end_date"),
            end_datetime: Some("condition_end_datetime"),
        }),
        "Drug" => Some(DomainDates {
            id: "drug_exposure_id",
            start_date: "drug_exposure_start_date",
            start_datetime: "drug_exposure_start_datetime",
            end_date: Some("drug_exposure_end_date"),
            end_datetime: Some("drug_exposure_end_datetime"),
        }),
        "Device" => Some(DomainDates {
            id: "device_exposure_id",
            start_date: "device_exposure_start_date",
            start_datetime: "device_exposure_start_datetime",
            end_date: Some("device_exposure_end_date"),
            end_datetime: Some("device_exposure_end_datetime"),
        }),
        _ => None,
    }
}

/// Event timestamp at its finest available precision.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Stamp {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

fn stamp(record: &OutputRecord, date_field: &str, datetime_field: &str) -> Option<Stamp> {
    if let Some(dt) = record.get(datetime_field).and_then(Value::as_datetime) {
        return Some(Stamp::DateTime(dt));
    }
    record.get(date_field).and_then(Value::as_date).map(Stamp::Date)
}

/// The event's start stamp and, for interval domains, its end stamp. An
/// interval without a resolvable end falls back to a point at its start.
fn event_stamps(record: &OutputRecord, dates: &DomainDates) -> Option<(Stamp, Stamp)> {
    let start = stamp(record, dates.start_date, dates.start_datetime)?;
    let end = match (dates.end_date, dates.end_datetime) {
        (Some(date), Some(datetime)) => stamp(record, date, datetime).unwrap_or(start),
        _ => start,
    };
    Some((start, end))
}

/// Whether a visit-like window contains one stamp, compared at the stamp's
/// precision. A zero-width datetime window is widened to the end of its day,
/// since an admission recorded as a single instant still spans the day.
fn window_contains_stamp(window: &Window, at: Stamp) -> bool {
    match at {
        Stamp::DateTime(t) => {
            let (Some(start), Some(end)) = (window.start_datetime, window.end_datetime) else {
                return false;
            };
            let end = if start == end { end_of_day(end.date()) } else { end };
            start <= t && t <= end
        }
        Stamp::Date(d) => {
            let (Some(start), Some(end)) = (window.start_date, window.end_date) else {
                return false;
            };
            start <= d && d <= end
        }
    }
}

fn window_contains_event(window: &Window, (start, end): (Stamp, Stamp)) -> bool {
    window_contains_stamp(window, start) && (start == end || window_contains_stamp(window, end))
}

/// The configs carrying linkable clinical events, with their date fields.
fn event_configs(metadata: &Metadata) -> Vec<(String, DomainDates)> {
    metadata
        .iter()
        .filter_map(|(name, config)| {
            config
                .expected_domain_id()
                .and_then(domain_dates)
                .map(|dates| (name.to_string(), dates))
        })
        .collect()
}

#[derive(Debug, Default)]
struct LinkCounts {
    linked: usize,
    ambiguous: usize,
    unmatched: usize,
    undated: usize,
    preassigned: usize,
}

/// First pass: assign `visit_occurrence_id` by containment against the
/// reconciled visit table. Exactly one matching visit links the event;
/// zero or several leave it null, several leaving a candidates diagnostic
/// that is stripped again before returning.
pub fn link_events_to_visits(output: &mut DocumentOutput, metadata: &Metadata) {
    let visits: Vec<OutputRecord> = output.table(VISIT_TABLE).to_vec();
    let configs = event_configs(metadata);
    for (config_name, dates) in &configs {
        let Some(rows) = output.table_mut(config_name) else {
            continue;
        };
        let mut counts = LinkCounts::default();
        for record in rows.iter_mut() {
            if record
                .get("visit_occurrence_id")
                .is_some_and(Value::is_usable)
            {
                counts.preassigned += 1;
                continue;
            }
            let Some(stamps) = event_stamps(record, dates) else {
                let event_id = record.get(dates.id).cloned().unwrap_or(Value::Null);
                debug!(
                    config = config_name,
                    event = %event_id,
                    "event has no resolvable date, cannot link"
                );
                record.set("visit_occurrence_id", Value::Null);
                counts.undated += 1;
                continue;
            };
            let matches: Vec<&Value> = visits
                .iter()
                .filter(|visit| window_contains_event(&Window::of(visit, "visit"), stamps))
                .filter_map(|visit| visit.get("visit_occurrence_id"))
                .filter(|id| id.is_usable())
                .collect();
            match matches.as_slice() {
                [only] => {
                    record.set("visit_occurrence_id", (*only).clone());
                    counts.linked += 1;
                }
                [] => {
                    record.set("visit_occurrence_id", Value::Null);
                    counts.unmatched += 1;
                }
                several => {
                    let listed = several
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("|");
                    record.set("visit_occurrence_id", Value::Null);
                    record.set(CANDIDATES_FIELD, Value::Text(listed));
                    counts.ambiguous += 1;
                }
            }
        }
        info!(
            config = config_name,
            linked = counts.linked,
            preassigned = counts.preassigned,
            unmatched = counts.unmatched,
            ambiguous = counts.ambiguous,
            undated = counts.undated,
            "visit linking finished"
        );
    }
    strip_candidates_field(output, &configs);
}

fn strip_candidates_field(output: &mut DocumentOutput, configs: &[(String, DomainDates)]) {
    for (config_name, _) in configs {
        if let Some(rows) = output.table_mut(config_name) {
            for record in rows.iter_mut() {
                if let Some(candidates) = record.remove(CANDIDATES_FIELD) {
                    debug!(
                        config = config_name,
                        candidates = %candidates,
                        "ambiguous visit match left unassigned"
                    );
                }
            }
        }
    }
}

/// Second pass: within an event's assigned visit, pick the containing
/// visit detail, narrowest window winning a tie.
pub fn link_events_to_visit_details(output: &mut DocumentOutput, metadata: &Metadata) {
    let details: Vec<OutputRecord> = output.table(VISIT_DETAIL_TABLE).to_vec();
    if details.is_empty() {
        return;
    }
    for (config_name, dates) in event_configs(metadata) {
        let Some(rows) = output.table_mut(&config_name) else {
            continue;
        };
        let mut linked = 0_usize;
        for record in rows.iter_mut() {
            let Some(visit_id) = record
                .get("visit_occurrence_id")
                .filter(|id| id.is_usable())
                .cloned()
            else {
                continue;
            };
            let Some(stamps) = event_stamps(record, &dates) else {
                continue;
            };
            let chosen = details
                .iter()
                .filter(|detail| detail.get("visit_occurrence_id") == Some(&visit_id))
                .filter(|detail| {
                    window_contains_event(&Window::of(detail, "visit_detail"), stamps)
                })
                .min_by(|a, b| {
                    let da = Window::of(a, "visit_detail").duration_days().unwrap_or(f64::MAX);
                    let db = Window::of(b, "visit_detail").duration_days().unwrap_or(f64::MAX);
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                })
                .and_then(|detail| detail.get("visit_detail_id"))
                .filter(|id| id.is_usable())
                .cloned();
            if let Some(detail_id) = chosen {
                record.set("visit_detail_id", detail_id);
                linked += 1;
            }
        }
        if linked > 0 {
            info!(config = %config_name, linked, "visit detail linking finished");
        }
    }
}

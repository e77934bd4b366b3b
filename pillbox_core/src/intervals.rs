//! Day detail: per-medication dose times and the gaps between them.

use crate::{DayClock, Medication, MedicationLog};
use chrono::{Duration, NaiveDate, TimeZone};
use serde::Serialize;

/// Gaps between consecutive doses of one medication on one day
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DoseIntervals {
    pub intervals: Vec<Duration>,
    /// Arithmetic mean, `None` with fewer than two doses
    pub average: Option<Duration>,
}

/// Compute pairwise gaps over `logs`, sorted ascending by timestamp first
pub fn dose_intervals(logs: &[MedicationLog]) -> DoseIntervals {
    let mut times: Vec<_> = logs.iter().map(|l| l.timestamp).collect();
    times.sort();

    let intervals: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();

    let average = if intervals.is_empty() {
        None
    } else {
        let total_ms: i64 = intervals.iter().map(|d| d.num_milliseconds()).sum();
        Some(Duration::milliseconds(total_ms / intervals.len() as i64))
    };

    DoseIntervals { intervals, average }
}

/// Render a gap as hours and minutes, dropping seconds
///
/// `"45m"`, `"3h"`, `"2h 30m"`.
pub fn format_interval(interval: Duration) -> String {
    let hours = interval.num_hours();
    let minutes = interval.num_minutes() % 60;

    if hours == 0 {
        format!("{}m", minutes)
    } else if minutes == 0 {
        format!("{}h", hours)
    } else {
        format!("{}h {}m", hours, minutes)
    }
}

/// One medication's doses on a given day
#[derive(Clone, Debug, Serialize)]
pub struct MedicationDayDetail {
    pub medication: Medication,
    /// Ascending by timestamp
    pub logs: Vec<MedicationLog>,
    #[serde(skip)]
    pub intervals: DoseIntervals,
}

impl MedicationDayDetail {
    pub fn is_over_target(&self) -> bool {
        self.logs.len() > self.medication.times_per_day as usize
    }
}

/// Group the day's logs by medication.
///
/// Medications without a dose that day are left out; groups are ordered by
/// their first dose of the day.
pub fn day_detail<Tz: TimeZone>(
    clock: &DayClock<Tz>,
    medications: &[Medication],
    logs: &[MedicationLog],
    date: NaiveDate,
) -> Vec<MedicationDayDetail> {
    let mut groups: Vec<MedicationDayDetail> = medications
        .iter()
        .filter_map(|med| {
            let mut med_logs: Vec<MedicationLog> = logs
                .iter()
                .filter(|l| l.medication_id == med.id && clock.contains(date, &l.timestamp))
                .cloned()
                .collect();
            if med_logs.is_empty() {
                return None;
            }
            med_logs.sort_by_key(|l| l.timestamp);
            let intervals = dose_intervals(&med_logs);
            Some(MedicationDayDetail {
                medication: med.clone(),
                logs: med_logs,
                intervals,
            })
        })
        .collect();

    groups.sort_by_key(|g| g.logs.first().map(|l| l.timestamp));
    groups
}

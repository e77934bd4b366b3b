//! Calendar month view.
//!
//! Classifies each day of a month for a caller-selected subset of
//! medications. Days after `today` are disabled and never evaluated.

use crate::engine::{day_stats_indexed, DayStats, LogIndex};
use crate::{DayClock, Error, Medication, MedicationColor, MedicationLog, Result};
use chrono::{Datelike, NaiveDate, TimeZone};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

/// How a calendar cell is drawn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    /// After today: disabled, not clickable
    Future,
    NoLogs,
    /// Some logs, but at least one due medication is short of its target
    Partial,
    AllCompleted,
}

#[derive(Clone, Debug, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub status: DayStatus,
    pub is_today: bool,
    /// Logs of the selected medications on this day
    pub log_count: u32,
    /// Colors of selected medications with at least one log, in list order
    pub colors: Vec<MedicationColor>,
    /// `None` for future days
    pub stats: Option<DayStats>,
}

impl CalendarDay {
    /// Whether the day can be opened for detail
    pub fn is_selectable(&self) -> bool {
        self.status != DayStatus::Future
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    /// Empty cells before the 1st in a Sunday-first grid
    pub leading_blanks: u32,
    pub days: Vec<CalendarDay>,
}

/// Build the month grid for `year`/`month` restricted to `selected` medications
pub fn month_view<Tz: TimeZone>(
    clock: &DayClock<Tz>,
    medications: &[Medication],
    logs: &[MedicationLog],
    selected: &[Uuid],
    year: i32,
    month: u32,
    today: NaiveDate,
) -> Result<MonthView> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::Validation(format!("invalid month: {}-{:02}", year, month)))?;

    let selected: HashSet<Uuid> = selected.iter().copied().collect();
    let filtered_meds: Vec<Medication> = medications
        .iter()
        .filter(|m| selected.contains(&m.id))
        .cloned()
        .collect();
    let filtered_logs: Vec<MedicationLog> = logs
        .iter()
        .filter(|l| selected.contains(&l.medication_id))
        .cloned()
        .collect();
    let index = LogIndex::build(clock, &filtered_logs);

    let mut days = Vec::with_capacity(31);
    let mut date = first;
    while date.month() == month {
        days.push(classify_day(clock, &filtered_meds, &index, date, today));
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    Ok(MonthView {
        year,
        month,
        leading_blanks: first.weekday().num_days_from_sunday(),
        days,
    })
}

fn classify_day<Tz: TimeZone>(
    clock: &DayClock<Tz>,
    medications: &[Medication],
    index: &LogIndex,
    date: NaiveDate,
    today: NaiveDate,
) -> CalendarDay {
    if date > today {
        return CalendarDay {
            date,
            status: DayStatus::Future,
            is_today: false,
            log_count: 0,
            colors: Vec::new(),
            stats: None,
        };
    }

    let mut log_count = 0;
    let mut colors = Vec::new();
    for med in medications {
        let count = index.count(med.id, date);
        if count > 0 {
            log_count += count;
            colors.push(med.color);
        }
    }

    let stats = day_stats_indexed(clock, medications, index, date);
    let status = if log_count == 0 {
        DayStatus::NoLogs
    } else if stats.is_fully_completed {
        DayStatus::AllCompleted
    } else {
        DayStatus::Partial
    };

    CalendarDay {
        date,
        status,
        is_today: date == today,
        log_count,
        colors,
        stats: Some(stats),
    }
}

/// Move a `(year, month)` pair by `delta` months
pub fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + (month as i32 - 1) + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

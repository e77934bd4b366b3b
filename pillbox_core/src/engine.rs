//! Adherence engine: daily completion, streaks and weekly aggregation.
//!
//! Everything here is a pure function of a medication slice, a log slice, a
//! `DayClock` and a reference day. Callers pass a consistent snapshot (see
//! `store::Snapshot`); nothing is mutated.
//!
//! Two notions of "adherent" coexist on purpose:
//! - `day_stats` counts a day as complete only when every active
//!   medication reached `times_per_day` (extra doses are capped).
//! - `streak_days` extends a streak on any day with at least one log.

use crate::{DayClock, Medication, MedicationLog};
use chrono::{Days, NaiveDate, TimeZone};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Number of days in the weekly chart
pub const WEEK_LEN: u64 = 7;

/// Per-medication outcome for one day
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MedicationDayStatus {
    pub medication_id: Uuid,
    pub target: u32,
    /// Raw number of logs that day, may exceed the target
    pub taken: u32,
    /// `min(taken, target)`, the amount credited toward completion
    pub counted: u32,
}

impl MedicationDayStatus {
    pub fn is_complete(&self) -> bool {
        self.taken >= self.target
    }

    pub fn is_over_target(&self) -> bool {
        self.taken > self.target
    }
}

/// Completion figures for one day over a set of medications
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DayStats {
    pub date: NaiveDate,
    pub total_target: u32,
    pub total_completed: u32,
    /// Whole percent, 0 when nothing was due
    pub completion_rate: u32,
    pub is_fully_completed: bool,
    /// Active medications only, in input order
    pub medications: Vec<MedicationDayStatus>,
}

/// Seven consecutive days of stats, oldest first
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WeeklySummary {
    pub days: Vec<DayStats>,
    pub average_completion_rate: u32,
    pub perfect_day_count: usize,
}

/// Log counts bucketed by medication and local day
#[derive(Debug, Default)]
pub(crate) struct LogIndex {
    counts: HashMap<(Uuid, NaiveDate), u32>,
}

impl LogIndex {
    pub(crate) fn build<Tz: TimeZone>(clock: &DayClock<Tz>, logs: &[MedicationLog]) -> Self {
        let mut counts = HashMap::new();
        for log in logs {
            *counts
                .entry((log.medication_id, clock.day_of(&log.timestamp)))
                .or_insert(0) += 1;
        }
        Self { counts }
    }

    pub(crate) fn count(&self, medication_id: Uuid, date: NaiveDate) -> u32 {
        self.counts.get(&(medication_id, date)).copied().unwrap_or(0)
    }
}

/// Compute completion for `date` over the given medications.
///
/// Only medications that are due that day contribute. Pass a subset of the
/// user's medications to evaluate just that subset.
pub fn day_stats<Tz: TimeZone>(
    clock: &DayClock<Tz>,
    medications: &[Medication],
    logs: &[MedicationLog],
    date: NaiveDate,
) -> DayStats {
    let day_logs: Vec<MedicationLog> = logs
        .iter()
        .filter(|log| clock.contains(date, &log.timestamp))
        .cloned()
        .collect();
    let index = LogIndex::build(clock, &day_logs);
    day_stats_indexed(clock, medications, &index, date)
}

pub(crate) fn day_stats_indexed<Tz: TimeZone>(
    clock: &DayClock<Tz>,
    medications: &[Medication],
    index: &LogIndex,
    date: NaiveDate,
) -> DayStats {
    let statuses: Vec<MedicationDayStatus> = medications
        .iter()
        .filter(|m| clock.is_active_on(m, date))
        .map(|m| {
            let taken = index.count(m.id, date);
            MedicationDayStatus {
                medication_id: m.id,
                target: m.times_per_day,
                taken,
                counted: taken.min(m.times_per_day),
            }
        })
        .collect();

    let total_target = statuses
        .iter()
        .fold(0u32, |acc, s| acc.saturating_add(s.target));
    let total_completed = statuses
        .iter()
        .fold(0u32, |acc, s| acc.saturating_add(s.counted));

    DayStats {
        date,
        total_target,
        total_completed,
        completion_rate: percent(total_completed, total_target),
        is_fully_completed: total_target > 0 && total_completed >= total_target,
        medications: statuses,
    }
}

fn percent(completed: u32, target: u32) -> u32 {
    if target == 0 {
        return 0;
    }
    (100.0 * f64::from(completed) / f64::from(target)).round() as u32
}

fn logged_days<Tz: TimeZone>(
    clock: &DayClock<Tz>,
    medication_id: Uuid,
    logs: &[MedicationLog],
) -> HashSet<NaiveDate> {
    logs.iter()
        .filter(|log| log.medication_id == medication_id)
        .map(|log| clock.day_of(&log.timestamp))
        .collect()
}

/// Current streak for one medication, counted back from `today`.
///
/// Days on which the medication is not due are skipped. The walk stops at
/// the first due day without any log, or at the creation day. A single log
/// keeps the streak alive even when the day's target was not reached.
pub fn streak_days<Tz: TimeZone>(
    clock: &DayClock<Tz>,
    medication: &Medication,
    logs: &[MedicationLog],
    today: NaiveDate,
) -> u32 {
    let logged = logged_days(clock, medication.id, logs);
    let created = clock.day_of(&medication.created_at);

    let mut streak = 0;
    let mut day = today;
    while day >= created {
        if clock.is_active_on(medication, day) {
            if !logged.contains(&day) {
                break;
            }
            streak += 1;
        }
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }

    tracing::trace!("Streak for {}: {} days", medication.id, streak);
    streak
}

/// Best historical streak between the creation day and `today`
pub fn longest_streak<Tz: TimeZone>(
    clock: &DayClock<Tz>,
    medication: &Medication,
    logs: &[MedicationLog],
    today: NaiveDate,
) -> u32 {
    let logged = logged_days(clock, medication.id, logs);

    let mut best = 0;
    let mut run = 0;
    let mut day = clock.day_of(&medication.created_at);
    while day <= today {
        if clock.is_active_on(medication, day) {
            if logged.contains(&day) {
                run += 1;
                best = best.max(run);
            } else {
                run = 0;
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    best
}

/// Highest current streak across all medications (0 when there are none)
pub fn best_current_streak<Tz: TimeZone>(
    clock: &DayClock<Tz>,
    medications: &[Medication],
    logs: &[MedicationLog],
    today: NaiveDate,
) -> u32 {
    medications
        .iter()
        .map(|m| streak_days(clock, m, logs, today))
        .max()
        .unwrap_or(0)
}

/// Stats for the seven days ending at `end_date` (inclusive), oldest first
pub fn weekly_completion<Tz: TimeZone>(
    clock: &DayClock<Tz>,
    medications: &[Medication],
    logs: &[MedicationLog],
    end_date: NaiveDate,
) -> WeeklySummary {
    let index = LogIndex::build(clock, logs);

    let days: Vec<DayStats> = (0..WEEK_LEN)
        .rev()
        .filter_map(|back| end_date.checked_sub_days(Days::new(back)))
        .map(|date| day_stats_indexed(clock, medications, &index, date))
        .collect();

    let average_completion_rate = if days.is_empty() {
        0
    } else {
        let sum: u32 = days.iter().map(|d| d.completion_rate).sum();
        (f64::from(sum) / days.len() as f64).round() as u32
    };
    let perfect_day_count = days.iter().filter(|d| d.is_fully_completed).count();

    tracing::debug!(
        "Weekly completion ending {}: avg {}%, {} perfect days",
        end_date,
        average_completion_rate,
        perfect_day_count
    );

    WeeklySummary {
        days,
        average_completion_rate,
        perfect_day_count,
    }
}

//! Calendar-day bucketing and the due-today predicate.
//!
//! Timestamps are stored in UTC but every day-based question is answered in
//! local time: a day runs from `00:00:00.000` to `23:59:59.999` on the local
//! wall clock. `DayClock` carries the time zone so tests can pin it.

use crate::Medication;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Maps instants onto local calendar days
#[derive(Clone, Debug)]
pub struct DayClock<Tz: TimeZone> {
    tz: Tz,
}

impl DayClock<Local> {
    /// Clock using the machine's local time zone
    pub fn local() -> Self {
        Self { tz: Local }
    }
}

impl<Tz: TimeZone> DayClock<Tz> {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> &Tz {
        &self.tz
    }

    /// Local calendar day an instant falls on
    pub fn day_of(&self, ts: &DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.tz).date_naive()
    }

    /// True iff `day_start(date) <= ts <= day_end(date)`
    pub fn contains(&self, date: NaiveDate, ts: &DateTime<Utc>) -> bool {
        self.day_of(ts) == date
    }

    /// Instant of a local wall-clock time on a date.
    ///
    /// Ambiguous times resolve to the earlier instant; times skipped by a
    /// DST jump resolve to the first instant after the gap.
    pub fn instant_at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let naive = date.and_time(time);
        resolve_local(&self.tz, naive)
    }

    /// First instant of the local day
    pub fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        self.instant_at(date, NaiveTime::MIN)
    }

    /// Last millisecond of the local day
    pub fn day_end(&self, date: NaiveDate) -> DateTime<Utc> {
        let next_start = match date.succ_opt() {
            Some(next) => self.day_start(next),
            None => self.day_start(date) + Duration::days(1),
        };
        next_start - Duration::milliseconds(1)
    }

    /// Inclusive `(start, end)` bounds of a local day, for range queries
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.day_start(date), self.day_end(date))
    }

    /// Whole calendar days between the medication's creation day and `date`.
    /// Negative when `date` precedes creation.
    pub fn days_since_created(&self, medication: &Medication, date: NaiveDate) -> i64 {
        (date - self.day_of(&medication.created_at)).num_days()
    }

    /// Whether the medication is due on `date` under its dosing interval
    pub fn is_active_on(&self, medication: &Medication, date: NaiveDate) -> bool {
        let days = self.days_since_created(medication, date);
        days >= 0 && days % i64::from(medication.effective_interval()) == 0
    }
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }
    // Inside a DST gap: walk forward until the wall clock exists again.
    let mut probe = naive;
    for _ in 0..(24 * 4) {
        probe += Duration::minutes(15);
        if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
            return dt.with_timezone(&Utc);
        }
    }
    Utc.from_utc_datetime(&naive)
}

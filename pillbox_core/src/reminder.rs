//! Reminder scheduling.
//!
//! The scheduler keeps an explicit table keyed by
//! `(medication, period, local date)`. Each key moves from `Scheduled` to
//! `Fired` at most once, so a reminder fires at most once per medication per
//! period per day. When the local date changes the table is reset.

use crate::config::ReminderConfig;
use crate::{DayClock, Medication, ReminderPeriod};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReminderKey {
    pub medication_id: Uuid,
    pub period: ReminderPeriod,
    pub date: NaiveDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReminderState {
    Scheduled { fire_at: DateTime<Utc> },
    Fired,
}

/// A reminder that is due to be shown
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReminderNotice {
    pub key: ReminderKey,
    pub title: String,
    pub body: String,
}

#[derive(Clone, Debug)]
struct Label {
    name: String,
    dosage: String,
}

pub struct ReminderScheduler<Tz: TimeZone> {
    clock: DayClock<Tz>,
    config: ReminderConfig,
    entries: HashMap<ReminderKey, ReminderState>,
    labels: HashMap<Uuid, Label>,
    day: Option<NaiveDate>,
}

impl<Tz: TimeZone> ReminderScheduler<Tz> {
    pub fn new(clock: DayClock<Tz>, config: ReminderConfig) -> Self {
        Self {
            clock,
            config,
            entries: HashMap::new(),
            labels: HashMap::new(),
            day: None,
        }
    }

    /// Recompute pending reminders for today.
    ///
    /// Pending entries are rebuilt from `medications`, so edits and deletions
    /// take effect; fired entries are kept. An entry that is already pending
    /// stays pending even once its time has passed, so a later `due` still
    /// delivers it. A period with no entry yet is only scheduled while its time
    /// is still ahead. Returns the keys now pending.
    pub fn plan(&mut self, medications: &[Medication], now: DateTime<Utc>) -> Vec<ReminderKey> {
        let today = self.clock.day_of(&now);
        if self.day != Some(today) {
            if self.day.is_some() {
                tracing::info!("New day {}, resetting reminder table", today);
            }
            self.entries.clear();
            self.day = Some(today);
        }

        let previous = std::mem::take(&mut self.entries);
        self.labels.clear();

        let mut scheduled = Vec::new();
        for med in medications {
            for &period in med.active_reminders() {
                let key = ReminderKey {
                    medication_id: med.id,
                    period,
                    date: today,
                };
                let fire_at = self.clock.instant_at(today, self.config.time_for(period));

                match previous.get(&key) {
                    Some(ReminderState::Fired) => {
                        self.entries.insert(key, ReminderState::Fired);
                        continue;
                    }
                    Some(ReminderState::Scheduled { .. }) => {}
                    None if fire_at <= now => continue,
                    None => {}
                }

                self.entries.insert(key, ReminderState::Scheduled { fire_at });
                self.labels.insert(
                    med.id,
                    Label {
                        name: med.name.clone(),
                        dosage: med.dosage.clone(),
                    },
                );
                scheduled.push(key);
            }
        }

        // Fired entries of medications no longer listed still block refiring
        for (key, state) in previous {
            if state == ReminderState::Fired {
                self.entries.entry(key).or_insert(ReminderState::Fired);
            }
        }

        tracing::debug!("Scheduled {} reminders for {}", scheduled.len(), today);
        scheduled
    }

    /// Take every pending reminder whose time has come, marking it fired
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<ReminderNotice> {
        let mut ready: Vec<(DateTime<Utc>, ReminderKey)> = self
            .entries
            .iter()
            .filter_map(|(key, state)| match state {
                ReminderState::Scheduled { fire_at } if *fire_at <= now => Some((*fire_at, *key)),
                _ => None,
            })
            .collect();
        ready.sort_by_key(|(fire_at, key)| (*fire_at, key.period));

        ready
            .into_iter()
            .map(|(_, key)| {
                self.entries.insert(key, ReminderState::Fired);
                let notice = self.notice(key);
                tracing::info!("Reminder fired: {}", notice.body);
                notice
            })
            .collect()
    }

    /// Drop all pending reminders; fired ones stay recorded
    pub fn cancel(&mut self) {
        self.entries
            .retain(|_, state| matches!(state, ReminderState::Fired));
    }

    /// Earliest pending fire time, if any
    pub fn next_fire_at(&self) -> Option<DateTime<Utc>> {
        self.entries
            .values()
            .filter_map(|state| match state {
                ReminderState::Scheduled { fire_at } => Some(*fire_at),
                ReminderState::Fired => None,
            })
            .min()
    }

    pub fn state(&self, key: &ReminderKey) -> Option<ReminderState> {
        self.entries.get(key).copied()
    }

    fn notice(&self, key: ReminderKey) -> ReminderNotice {
        let period = match key.period {
            ReminderPeriod::Morning => "Morning",
            ReminderPeriod::Noon => "Noon",
            ReminderPeriod::Evening => "Evening",
        };
        let body = match self.labels.get(&key.medication_id) {
            Some(label) => format!("Time to take {} ({})", label.name, label.dosage),
            None => "Time to take your medication".to_string(),
        };
        ReminderNotice {
            key,
            title: format!("{} medication reminder", period),
            body,
        }
    }
}

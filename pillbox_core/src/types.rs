//! Core domain types for Pillbox.
//!
//! This module defines the fundamental types used throughout the system:
//! - Medications and their display properties
//! - Intake logs
//! - Reminder periods
//! - Insert and patch shapes used by the store

use crate::{Error, Result};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Display enumerations
// ============================================================================

/// Accent color used when rendering a medication
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MedicationColor {
    #[default]
    Cyan,
    Magenta,
    Green,
    Orange,
    Purple,
    Blue,
}

impl MedicationColor {
    pub const ALL: [MedicationColor; 6] = [
        MedicationColor::Cyan,
        MedicationColor::Magenta,
        MedicationColor::Green,
        MedicationColor::Orange,
        MedicationColor::Purple,
        MedicationColor::Blue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cyan => "cyan",
            Self::Magenta => "magenta",
            Self::Green => "green",
            Self::Orange => "orange",
            Self::Purple => "purple",
            Self::Blue => "blue",
        }
    }
}

impl FromStr for MedicationColor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| Error::Validation(format!("unknown color: {}", s)))
    }
}

impl fmt::Display for MedicationColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Icon shown next to a medication
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MedicationIcon {
    #[default]
    Pill,
    Capsule,
    Syringe,
    Droplet,
    Heart,
    Sun,
    Moon,
    Leaf,
    Zap,
    Shield,
    Activity,
    Thermometer,
}

impl MedicationIcon {
    pub const ALL: [MedicationIcon; 12] = [
        MedicationIcon::Pill,
        MedicationIcon::Capsule,
        MedicationIcon::Syringe,
        MedicationIcon::Droplet,
        MedicationIcon::Heart,
        MedicationIcon::Sun,
        MedicationIcon::Moon,
        MedicationIcon::Leaf,
        MedicationIcon::Zap,
        MedicationIcon::Shield,
        MedicationIcon::Activity,
        MedicationIcon::Thermometer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pill => "pill",
            Self::Capsule => "capsule",
            Self::Syringe => "syringe",
            Self::Droplet => "droplet",
            Self::Heart => "heart",
            Self::Sun => "sun",
            Self::Moon => "moon",
            Self::Leaf => "leaf",
            Self::Zap => "zap",
            Self::Shield => "shield",
            Self::Activity => "activity",
            Self::Thermometer => "thermometer",
        }
    }
}

impl FromStr for MedicationIcon {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| Error::Validation(format!("unknown icon: {}", s)))
    }
}

impl fmt::Display for MedicationIcon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Reminder periods
// ============================================================================

/// Named time-of-day slot a reminder can be attached to
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ReminderPeriod {
    Morning,
    Noon,
    Evening,
}

impl ReminderPeriod {
    pub const ALL: [ReminderPeriod; 3] = [
        ReminderPeriod::Morning,
        ReminderPeriod::Noon,
        ReminderPeriod::Evening,
    ];

    /// Local wall-clock time the period fires at unless configured otherwise
    pub fn default_time(&self) -> NaiveTime {
        let hour = match self {
            Self::Morning => 8,
            Self::Noon => 12,
            Self::Evening => 20,
        };
        NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Noon => "noon",
            Self::Evening => "evening",
        }
    }
}

impl FromStr for ReminderPeriod {
    type Err = Error;

    /// Accepts the period name or its default clock time ("08:00")
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "morning" | "08:00" => Ok(Self::Morning),
            "noon" | "12:00" => Ok(Self::Noon),
            "evening" | "20:00" => Ok(Self::Evening),
            other => Err(Error::Validation(format!("unknown reminder period: {}", other))),
        }
    }
}

impl fmt::Display for ReminderPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Medication
// ============================================================================

/// A medication the user tracks
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    pub id: Uuid,
    pub name: String,
    pub dosage: String,
    pub times_per_day: u32,
    #[serde(default = "default_days_interval")]
    pub days_interval: u32,
    #[serde(default)]
    pub color: MedicationColor,
    #[serde(default)]
    pub icon: MedicationIcon,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub reminder_enabled: bool,
    #[serde(default)]
    pub reminder_times: Vec<ReminderPeriod>,
    pub created_at: DateTime<Utc>,
}

fn default_days_interval() -> u32 {
    1
}

impl Medication {
    /// Build a stored medication from its insert shape
    pub fn from_new(new: NewMedication, order: i32, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: new.name,
            dosage: new.dosage,
            times_per_day: new.times_per_day,
            days_interval: new.days_interval,
            color: new.color,
            icon: new.icon,
            order: new.order.unwrap_or(order),
            reminder_enabled: new.reminder_enabled,
            reminder_times: new.reminder_times,
            created_at,
        }
    }

    /// Interval used for scheduling; a zero interval is read as daily
    pub fn effective_interval(&self) -> u32 {
        self.days_interval.max(1)
    }

    /// Reminder periods that should actually fire
    pub fn active_reminders(&self) -> &[ReminderPeriod] {
        if self.reminder_enabled {
            &self.reminder_times
        } else {
            &[]
        }
    }

    /// Apply a partial update in place. `id` and `created_at` never change.
    pub fn apply(&mut self, patch: MedicationPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(dosage) = patch.dosage {
            self.dosage = dosage;
        }
        if let Some(times) = patch.times_per_day {
            self.times_per_day = times;
        }
        if let Some(interval) = patch.days_interval {
            self.days_interval = interval;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(icon) = patch.icon {
            self.icon = icon;
        }
        if let Some(order) = patch.order {
            self.order = order;
        }
        if let Some(enabled) = patch.reminder_enabled {
            self.reminder_enabled = enabled;
        }
        if let Some(times) = patch.reminder_times {
            self.reminder_times = times;
        }
    }

    /// Reject records the adherence engine cannot schedule
    pub fn validate(&self) -> Result<()> {
        validate_counts(self.times_per_day, self.days_interval)?;
        if self.name.trim().is_empty() {
            return Err(Error::Validation("medication name must not be empty".into()));
        }
        Ok(())
    }
}

/// Upper bound on doses per day
pub const MAX_TIMES_PER_DAY: u32 = 24;

/// Upper bound on the days between active days
pub const MAX_DAYS_INTERVAL: u32 = 365;

/// Check the two scheduling counts are within range
pub fn validate_counts(times_per_day: u32, days_interval: u32) -> Result<()> {
    if times_per_day == 0 {
        return Err(Error::Validation("times_per_day must be at least 1".into()));
    }
    if times_per_day > MAX_TIMES_PER_DAY {
        return Err(Error::Validation(format!(
            "times_per_day must be at most {}",
            MAX_TIMES_PER_DAY
        )));
    }
    if days_interval > MAX_DAYS_INTERVAL {
        return Err(Error::Validation(format!(
            "days_interval must be at most {}",
            MAX_DAYS_INTERVAL
        )));
    }
    if days_interval == 0 {
        return Err(Error::Validation("days_interval must be at least 1".into()));
    }
    Ok(())
}

/// Insert shape for a medication (id, creation time and order are assigned by the store)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewMedication {
    pub name: String,
    pub dosage: String,
    pub times_per_day: u32,
    pub days_interval: u32,
    pub color: MedicationColor,
    pub icon: MedicationIcon,
    pub order: Option<i32>,
    pub reminder_enabled: bool,
    pub reminder_times: Vec<ReminderPeriod>,
}

impl NewMedication {
    /// Daily, once-a-day medication with default display settings
    pub fn new(name: impl Into<String>, dosage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dosage: dosage.into(),
            times_per_day: 1,
            days_interval: 1,
            color: MedicationColor::default(),
            icon: MedicationIcon::default(),
            order: None,
            reminder_enabled: false,
            reminder_times: Vec::new(),
        }
    }

    pub fn times_per_day(mut self, times: u32) -> Self {
        self.times_per_day = times;
        self
    }

    pub fn every_days(mut self, interval: u32) -> Self {
        self.days_interval = interval;
        self
    }
}

/// Partial update of a medication
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MedicationPatch {
    pub name: Option<String>,
    pub dosage: Option<String>,
    pub times_per_day: Option<u32>,
    pub days_interval: Option<u32>,
    pub color: Option<MedicationColor>,
    pub icon: Option<MedicationIcon>,
    pub order: Option<i32>,
    pub reminder_enabled: Option<bool>,
    pub reminder_times: Option<Vec<ReminderPeriod>>,
}

impl MedicationPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.dosage.is_none()
            && self.times_per_day.is_none()
            && self.days_interval.is_none()
            && self.color.is_none()
            && self.icon.is_none()
            && self.order.is_none()
            && self.reminder_enabled.is_none()
            && self.reminder_times.is_none()
    }
}

// ============================================================================
// Intake logs
// ============================================================================

/// A recorded intake of one dose
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MedicationLog {
    pub id: Uuid,
    pub medication_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_manual: bool,
}

impl MedicationLog {
    /// A dose taken right now
    pub fn quick(medication_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            medication_id,
            timestamp: now,
            is_manual: false,
        }
    }

    /// A dose logged with an explicit, possibly backdated, timestamp
    pub fn manual(medication_id: Uuid, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            medication_id,
            timestamp,
            is_manual: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_keeps_identity() {
        let created = Utc::now();
        let mut med = Medication::from_new(NewMedication::new("Vitamin D", "1000IU"), 0, created);
        let id = med.id;

        med.apply(MedicationPatch {
            name: Some("Vitamin D3".into()),
            days_interval: Some(2),
            ..Default::default()
        });

        assert_eq!(med.id, id);
        assert_eq!(med.created_at, created);
        assert_eq!(med.name, "Vitamin D3");
        assert_eq!(med.days_interval, 2);
        assert_eq!(med.times_per_day, 1);
    }

    #[test]
    fn test_validate_rejects_zero_counts() {
        assert!(matches!(validate_counts(0, 1), Err(Error::Validation(_))));
        assert!(matches!(validate_counts(1, 0), Err(Error::Validation(_))));
        assert!(validate_counts(3, 2).is_ok());
    }

    #[test]
    fn test_validate_rejects_huge_counts() {
        assert!(validate_counts(MAX_TIMES_PER_DAY, MAX_DAYS_INTERVAL).is_ok());
        assert!(matches!(
            validate_counts(MAX_TIMES_PER_DAY + 1, 1),
            Err(Error::Validation(_))
        ));
        assert!(matches!(validate_counts(u32::MAX, 1), Err(Error::Validation(_))));
        assert!(matches!(validate_counts(1, u32::MAX), Err(Error::Validation(_))));
    }

    #[test]
    fn test_reminder_period_parsing() {
        assert_eq!("08:00".parse::<ReminderPeriod>().unwrap(), ReminderPeriod::Morning);
        assert_eq!("Evening".parse::<ReminderPeriod>().unwrap(), ReminderPeriod::Evening);
        assert!("midnight".parse::<ReminderPeriod>().is_err());
    }

    #[test]
    fn test_disabled_reminders_are_inactive() {
        let mut new = NewMedication::new("Omega-3", "1000mg");
        new.reminder_times = vec![ReminderPeriod::Morning];
        let med = Medication::from_new(new, 0, Utc::now());
        assert!(med.active_reminders().is_empty());
    }

    #[test]
    fn test_legacy_record_defaults_interval() {
        let json = r#"{
            "id": "00000000-0000-0000-0000-000000000001",
            "name": "Aspirin",
            "dosage": "100mg",
            "times_per_day": 1,
            "created_at": "2024-01-01T08:00:00Z"
        }"#;
        let med: Medication = serde_json::from_str(json).unwrap();
        assert_eq!(med.days_interval, 1);
        assert_eq!(med.color, MedicationColor::Cyan);
        assert!(med.reminder_times.is_empty());
    }
}

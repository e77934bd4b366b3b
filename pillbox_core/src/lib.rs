#![forbid(unsafe_code)]

//! Core domain model and adherence logic for Pillbox.
//!
//! This crate provides:
//! - Domain types (medications, intake logs, reminder periods)
//! - Adherence engine (due-today schedule, day stats, streaks, weekly view)
//! - Calendar month view and day-detail interval statistics
//! - Persistence (medication file, log journal, CSV export)
//! - Reminder scheduling

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod schedule;
pub mod engine;
pub mod calendar;
pub mod intervals;
pub mod journal;
pub mod store;
pub mod export;
pub mod reminder;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use schedule::DayClock;
pub use engine::{DayStats, MedicationDayStatus, WeeklySummary};
pub use calendar::{CalendarDay, DayStatus, MonthView};
pub use intervals::{format_interval, DoseIntervals, MedicationDayDetail};
pub use store::{reorder_optimistic, FileStore, MedicationStore, Snapshot};
pub use reminder::{ReminderKey, ReminderNotice, ReminderScheduler, ReminderState};

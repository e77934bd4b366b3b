//! Medication and log persistence.
//!
//! `FileStore` keeps medications in `medications.json` (replaced atomically
//! on every write) and logs in the `logs.jsonl` journal. Every mutation runs
//! under an exclusive lock on `store.lock`, so a cascade delete or a reorder
//! is seen by other processes either entirely or not at all.

use crate::journal::LogJournal;
use crate::{
    Error, Medication, MedicationLog, MedicationPatch, NewMedication, Result,
};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// CRUD contract over medications and their intake logs
pub trait MedicationStore {
    /// All medications, sorted by `order`
    fn list_medications(&self) -> Result<Vec<Medication>>;
    fn get_medication(&self, id: Uuid) -> Result<Medication>;
    fn create_medication(&mut self, new: NewMedication) -> Result<Medication>;
    fn update_medication(&mut self, id: Uuid, patch: MedicationPatch) -> Result<Medication>;
    /// Delete a medication and all of its logs; returns the number of logs removed
    fn delete_medication(&mut self, id: Uuid) -> Result<usize>;
    /// Assign `order = index` following `ordered_ids`. All or nothing.
    fn reorder_medications(&mut self, ordered_ids: &[Uuid]) -> Result<()>;

    /// All logs, newest first
    fn list_logs(&self) -> Result<Vec<MedicationLog>>;
    fn get_log(&self, id: Uuid) -> Result<MedicationLog>;
    fn create_log(&mut self, log: MedicationLog) -> Result<MedicationLog>;
    fn delete_log(&mut self, id: Uuid) -> Result<()>;

    /// Logs with `start <= timestamp <= end`, newest first
    fn logs_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<MedicationLog>> {
        Ok(self
            .list_logs()?
            .into_iter()
            .filter(|l| l.timestamp >= start && l.timestamp <= end)
            .collect())
    }

    /// Logs of one medication, newest first
    fn logs_for_medication(&self, medication_id: Uuid) -> Result<Vec<MedicationLog>> {
        Ok(self
            .list_logs()?
            .into_iter()
            .filter(|l| l.medication_id == medication_id)
            .collect())
    }

    /// Owned copy of both collections for one engine computation
    fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot::new(self.list_medications()?, self.list_logs()?))
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// A consistent, owned view of medications and logs
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub medications: Vec<Medication>,
    pub logs: Vec<MedicationLog>,
}

impl Snapshot {
    pub fn new(mut medications: Vec<Medication>, mut logs: Vec<MedicationLog>) -> Self {
        sort_by_order(&mut medications);
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Self { medications, logs }
    }

    pub fn medication(&self, id: Uuid) -> Option<&Medication> {
        self.medications.iter().find(|m| m.id == id)
    }

    /// Find a medication by full id, unique id prefix, or case-insensitive name
    pub fn resolve(&self, query: &str) -> Result<&Medication> {
        let query = query.trim();
        if let Ok(id) = Uuid::parse_str(query) {
            return self
                .medication(id)
                .ok_or_else(|| Error::NotFound(format!("medication {}", id)));
        }

        let lowered = query.to_lowercase();
        if let Some(med) = self
            .medications
            .iter()
            .find(|m| m.name.to_lowercase() == lowered)
        {
            return Ok(med);
        }

        let matches: Vec<&Medication> = self
            .medications
            .iter()
            .filter(|m| !query.is_empty() && m.id.to_string().starts_with(&lowered))
            .collect();
        match matches.as_slice() {
            [single] => Ok(*single),
            [] => Err(Error::NotFound(format!("medication {:?}", query))),
            _ => Err(Error::Validation(format!(
                "{:?} matches {} medications, use a longer id",
                query,
                matches.len()
            ))),
        }
    }

    /// Medications with the given ids, in list order
    pub fn subset(&self, ids: &[Uuid]) -> Vec<Medication> {
        self.medications
            .iter()
            .filter(|m| ids.contains(&m.id))
            .cloned()
            .collect()
    }
}

fn sort_by_order(medications: &mut [Medication]) {
    medications.sort_by(|a, b| a.order.cmp(&b.order).then(a.created_at.cmp(&b.created_at)));
}

/// Reassign `order` so `ordered_ids` come first at their index; medications
/// not listed keep their relative order after them. Leaves `medications`
/// untouched on error.
pub(crate) fn apply_order(medications: &mut Vec<Medication>, ordered_ids: &[Uuid]) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ordered_ids {
        if !seen.insert(*id) {
            return Err(Error::Validation(format!("duplicate id {} in reorder", id)));
        }
        if !medications.iter().any(|m| m.id == *id) {
            return Err(Error::NotFound(format!("medication {}", id)));
        }
    }

    sort_by_order(medications);
    let mut reordered: Vec<Medication> = Vec::with_capacity(medications.len());
    for id in ordered_ids {
        if let Some(med) = medications.iter().find(|m| m.id == *id) {
            reordered.push(med.clone());
        }
    }
    reordered.extend(medications.iter().filter(|m| !seen.contains(&m.id)).cloned());

    for (index, med) in reordered.iter_mut().enumerate() {
        med.order = index as i32;
    }
    *medications = reordered;
    Ok(())
}

/// Reorder a local list first, then persist; restore the previous order if
/// persisting fails.
pub fn reorder_optimistic<F>(
    local: &mut Vec<Medication>,
    ordered_ids: &[Uuid],
    persist: F,
) -> Result<()>
where
    F: FnOnce(&[Uuid]) -> Result<()>,
{
    let last_good = local.clone();
    apply_order(local, ordered_ids)?;

    if let Err(e) = persist(ordered_ids) {
        tracing::warn!("Reorder failed to persist, restoring previous order: {}", e);
        *local = last_good;
        return Err(e);
    }
    Ok(())
}

// ============================================================================
// File-backed store
// ============================================================================

/// Store rooted at a data directory
pub struct FileStore {
    medications_path: PathBuf,
    lock_path: PathBuf,
    journal: LogJournal,
}

impl FileStore {
    /// Open (lazily create) a store under `data_dir`
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        tracing::debug!("Opened store at {:?}", data_dir);
        Ok(Self {
            medications_path: data_dir.join("medications.json"),
            lock_path: data_dir.join("store.lock"),
            journal: LogJournal::new(data_dir.join("logs.jsonl")),
        })
    }

    pub fn journal(&self) -> &LogJournal {
        &self.journal
    }

    fn lock_file(&self) -> Result<File> {
        Ok(OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?)
    }

    /// Run `f` holding the store-wide exclusive lock
    fn write_locked<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let lock = self.lock_file()?;
        lock.lock_exclusive()?;
        let result = f();
        lock.unlock()?;
        result
    }

    /// Run `f` holding the store-wide shared lock
    fn read_locked<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let lock = self.lock_file()?;
        lock.lock_shared()?;
        let result = f();
        lock.unlock()?;
        result
    }

    fn load_medications(&self) -> Result<Vec<Medication>> {
        let path = &self.medications_path;
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;

        let mut medications: Vec<Medication> = serde_json::from_str(&contents).map_err(|e| {
            Error::State(format!("failed to parse {:?}: {}", path, e))
        })?;
        sort_by_order(&mut medications);
        tracing::debug!("Loaded {} medications", medications.len());
        Ok(medications)
    }

    /// Atomically replace the medications file (temp file, fsync, rename)
    fn save_medications(&self, medications: &[Medication]) -> Result<()> {
        let parent = self.medications_path.parent().ok_or_else(|| {
            Error::Other(format!("{:?} has no parent", self.medications_path))
        })?;
        let temp = NamedTempFile::new_in(parent)?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, medications)?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.persist(&self.medications_path)
            .map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved {} medications", medications.len());
        Ok(())
    }

    fn find_log(&self, id: Uuid) -> Result<MedicationLog> {
        self.journal
            .read_all()?
            .into_iter()
            .find(|l| l.id == id)
            .ok_or_else(|| Error::NotFound(format!("log {}", id)))
    }
}

fn newest_first(mut logs: Vec<MedicationLog>) -> Vec<MedicationLog> {
    logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    logs
}

impl MedicationStore for FileStore {
    fn list_medications(&self) -> Result<Vec<Medication>> {
        self.read_locked(|| self.load_medications())
    }

    fn get_medication(&self, id: Uuid) -> Result<Medication> {
        self.list_medications()?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::NotFound(format!("medication {}", id)))
    }

    fn create_medication(&mut self, new: NewMedication) -> Result<Medication> {
        self.write_locked(|| {
            let mut medications = self.load_medications()?;
            let next_order = medications
                .iter()
                .map(|m| m.order.saturating_add(1))
                .max()
                .unwrap_or(0);
            let medication = Medication::from_new(new, next_order, Utc::now());
            medication.validate()?;

            medications.push(medication.clone());
            self.save_medications(&medications)?;
            tracing::info!("Created medication {} ({})", medication.name, medication.id);
            Ok(medication)
        })
    }

    fn update_medication(&mut self, id: Uuid, patch: MedicationPatch) -> Result<Medication> {
        self.write_locked(|| {
            let mut medications = self.load_medications()?;
            let medication = medications
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| Error::NotFound(format!("medication {}", id)))?;

            let mut updated = medication.clone();
            updated.apply(patch);
            updated.validate()?;
            *medication = updated.clone();

            self.save_medications(&medications)?;
            tracing::info!("Updated medication {}", id);
            Ok(updated)
        })
    }

    fn delete_medication(&mut self, id: Uuid) -> Result<usize> {
        self.write_locked(|| {
            let mut medications = self.load_medications()?;
            let before = medications.len();
            medications.retain(|m| m.id != id);
            if medications.len() == before {
                return Err(Error::NotFound(format!("medication {}", id)));
            }

            // Logs first: a crash in between leaves the medication, never orphans.
            let removed = self.journal.remove_where(|l| l.medication_id == id)?;
            self.save_medications(&medications)?;

            tracing::info!("Deleted medication {} and {} logs", id, removed);
            Ok(removed)
        })
    }

    fn reorder_medications(&mut self, ordered_ids: &[Uuid]) -> Result<()> {
        self.write_locked(|| {
            let mut medications = self.load_medications()?;
            apply_order(&mut medications, ordered_ids)?;
            self.save_medications(&medications)?;
            tracing::info!("Reordered {} medications", medications.len());
            Ok(())
        })
    }

    fn list_logs(&self) -> Result<Vec<MedicationLog>> {
        self.read_locked(|| Ok(newest_first(self.journal.read_all()?)))
    }

    fn get_log(&self, id: Uuid) -> Result<MedicationLog> {
        self.read_locked(|| self.find_log(id))
    }

    fn create_log(&mut self, log: MedicationLog) -> Result<MedicationLog> {
        self.write_locked(|| {
            let medications = self.load_medications()?;
            if !medications.iter().any(|m| m.id == log.medication_id) {
                return Err(Error::NotFound(format!("medication {}", log.medication_id)));
            }
            if self.journal.read_all()?.iter().any(|l| l.id == log.id) {
                return Err(Error::Validation(format!("log {} already exists", log.id)));
            }

            self.journal.append(&log)?;
            tracing::info!("Logged dose of {} at {}", log.medication_id, log.timestamp);
            Ok(log)
        })
    }

    fn delete_log(&mut self, id: Uuid) -> Result<()> {
        self.write_locked(|| {
            if self.journal.remove_where(|l| l.id == id)? == 0 {
                return Err(Error::NotFound(format!("log {}", id)));
            }
            tracing::info!("Deleted log {}", id);
            Ok(())
        })
    }

    fn snapshot(&self) -> Result<Snapshot> {
        self.read_locked(|| {
            Ok(Snapshot::new(
                self.load_medications()?,
                self.journal.read_all()?,
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> (tempfile::TempDir, FileStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_create_assigns_increasing_order() {
        let (_dir, mut store) = store();
        let a = store.create_medication(NewMedication::new("A", "1")).unwrap();
        let b = store.create_medication(NewMedication::new("B", "1")).unwrap();

        assert_eq!(a.order, 0);
        assert_eq!(b.order, 1);

        let listed = store.list_medications().unwrap();
        assert_eq!(listed.iter().map(|m| m.id).collect::<Vec<_>>(), vec![a.id, b.id]);
    }

    #[test]
    fn test_create_after_max_order_does_not_overflow() {
        let (_dir, mut store) = store();
        let a = store.create_medication(NewMedication::new("A", "1")).unwrap();
        store
            .update_medication(
                a.id,
                MedicationPatch {
                    order: Some(i32::MAX),
                    ..Default::default()
                },
            )
            .unwrap();

        let b = store.create_medication(NewMedication::new("B", "1")).unwrap();
        assert_eq!(b.order, i32::MAX);
        assert_eq!(store.list_medications().unwrap().len(), 2);
    }

    #[test]
    fn test_create_rejects_huge_times_per_day() {
        let (_dir, mut store) = store();

        let result = store.create_medication(NewMedication::new("A", "1").times_per_day(u32::MAX));
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(store.list_medications().unwrap().is_empty());
    }

    #[test]
    fn test_create_rejects_zero_counts() {
        let (_dir, mut store) = store();

        let result = store.create_medication(NewMedication::new("A", "1").times_per_day(0));
        assert!(matches!(result, Err(Error::Validation(_))));

        let result = store.create_medication(NewMedication::new("A", "1").every_days(0));
        assert!(matches!(result, Err(Error::Validation(_))));

        assert!(store.list_medications().unwrap().is_empty());
    }

    #[test]
    fn test_update_and_not_found() {
        let (_dir, mut store) = store();
        let med = store.create_medication(NewMedication::new("A", "1")).unwrap();

        let updated = store
            .update_medication(
                med.id,
                MedicationPatch {
                    times_per_day: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.times_per_day, 3);
        assert_eq!(updated.created_at, med.created_at);

        let bad = store.update_medication(
            med.id,
            MedicationPatch {
                days_interval: Some(0),
                ..Default::default()
            },
        );
        assert!(matches!(bad, Err(Error::Validation(_))));
        assert_eq!(store.get_medication(med.id).unwrap().days_interval, 1);

        let missing = store.update_medication(Uuid::new_v4(), MedicationPatch::default());
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete_cascades_to_logs() {
        let (_dir, mut store) = store();
        let a = store.create_medication(NewMedication::new("A", "1")).unwrap();
        let b = store.create_medication(NewMedication::new("B", "1")).unwrap();

        for _ in 0..3 {
            store.create_log(MedicationLog::quick(a.id, Utc::now())).unwrap();
        }
        store.create_log(MedicationLog::quick(b.id, Utc::now())).unwrap();

        assert_eq!(store.delete_medication(a.id).unwrap(), 3);

        let logs = store.list_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].medication_id, b.id);
        assert!(matches!(store.get_medication(a.id), Err(Error::NotFound(_))));
        assert!(matches!(store.delete_medication(a.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_log_requires_existing_medication() {
        let (_dir, mut store) = store();
        let result = store.create_log(MedicationLog::quick(Uuid::new_v4(), Utc::now()));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_duplicate_log_id_rejected() {
        let (_dir, mut store) = store();
        let med = store.create_medication(NewMedication::new("A", "1")).unwrap();
        let log = store.create_log(MedicationLog::quick(med.id, Utc::now())).unwrap();

        let result = store.create_log(log.clone());
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(store.list_logs().unwrap().len(), 1);
    }

    #[test]
    fn test_logs_newest_first_and_range() {
        let (_dir, mut store) = store();
        let med = store.create_medication(NewMedication::new("A", "1")).unwrap();
        let now = Utc::now();

        let old = store
            .create_log(MedicationLog::manual(med.id, now - Duration::days(3)))
            .unwrap();
        let recent = store.create_log(MedicationLog::quick(med.id, now)).unwrap();

        let logs = store.list_logs().unwrap();
        assert_eq!(logs[0].id, recent.id);
        assert_eq!(logs[1].id, old.id);
        assert!(logs[1].is_manual);

        let ranged = store
            .logs_in_range(now - Duration::days(1), now + Duration::days(1))
            .unwrap();
        assert_eq!(ranged.len(), 1);
        assert_eq!(store.logs_for_medication(med.id).unwrap().len(), 2);
        assert_eq!(store.get_log(old.id).unwrap(), old);
    }

    #[test]
    fn test_delete_log() {
        let (_dir, mut store) = store();
        let med = store.create_medication(NewMedication::new("A", "1")).unwrap();
        let log = store.create_log(MedicationLog::quick(med.id, Utc::now())).unwrap();

        store.delete_log(log.id).unwrap();
        assert!(store.list_logs().unwrap().is_empty());
        assert!(matches!(store.delete_log(log.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_reorder_assigns_indices() {
        let (_dir, mut store) = store();
        let a = store.create_medication(NewMedication::new("A", "1")).unwrap();
        let b = store.create_medication(NewMedication::new("B", "1")).unwrap();
        let c = store.create_medication(NewMedication::new("C", "1")).unwrap();

        store.reorder_medications(&[c.id, a.id, b.id]).unwrap();

        let listed = store.list_medications().unwrap();
        assert_eq!(listed.iter().map(|m| m.id).collect::<Vec<_>>(), vec![c.id, a.id, b.id]);
        assert_eq!(listed.iter().map(|m| m.order).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_reorder_with_unknown_id_changes_nothing() {
        let (_dir, mut store) = store();
        let a = store.create_medication(NewMedication::new("A", "1")).unwrap();
        let b = store.create_medication(NewMedication::new("B", "1")).unwrap();

        let result = store.reorder_medications(&[b.id, Uuid::new_v4(), a.id]);
        assert!(matches!(result, Err(Error::NotFound(_))));

        let listed = store.list_medications().unwrap();
        assert_eq!(listed.iter().map(|m| m.id).collect::<Vec<_>>(), vec![a.id, b.id]);
    }

    #[test]
    fn test_partial_reorder_keeps_rest_after() {
        let (_dir, mut store) = store();
        let a = store.create_medication(NewMedication::new("A", "1")).unwrap();
        let b = store.create_medication(NewMedication::new("B", "1")).unwrap();
        let c = store.create_medication(NewMedication::new("C", "1")).unwrap();

        store.reorder_medications(&[c.id]).unwrap();

        let ids: Vec<_> = store.list_medications().unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![c.id, a.id, b.id]);
    }

    #[test]
    fn test_optimistic_reorder_rolls_back() {
        let (_dir, mut store) = store();
        let a = store.create_medication(NewMedication::new("A", "1")).unwrap();
        let b = store.create_medication(NewMedication::new("B", "1")).unwrap();
        let mut local = store.list_medications().unwrap();
        let before = local.clone();

        let result = reorder_optimistic(&mut local, &[b.id, a.id], |_| {
            Err(Error::Other("disk full".into()))
        });

        assert!(result.is_err());
        assert_eq!(local, before);
    }

    #[test]
    fn test_optimistic_reorder_persists() {
        let (_dir, mut store) = store();
        let a = store.create_medication(NewMedication::new("A", "1")).unwrap();
        let b = store.create_medication(NewMedication::new("B", "1")).unwrap();
        let mut local = store.list_medications().unwrap();

        reorder_optimistic(&mut local, &[b.id, a.id], |ids| store.reorder_medications(ids))
            .unwrap();

        assert_eq!(local[0].id, b.id);
        assert_eq!(store.list_medications().unwrap()[0].id, b.id);
    }

    #[test]
    fn test_corrupted_medications_file_is_an_error() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("medications.json"), "{ invalid json }").unwrap();

        assert!(matches!(store.list_medications(), Err(Error::State(_))));
    }

    #[test]
    fn test_snapshot_and_resolve() {
        let (_dir, mut store) = store();
        let a = store.create_medication(NewMedication::new("Vitamin D", "1000IU")).unwrap();
        store.create_medication(NewMedication::new("Omega-3", "1000mg")).unwrap();
        store.create_log(MedicationLog::quick(a.id, Utc::now())).unwrap();

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.medications.len(), 2);
        assert_eq!(snapshot.logs.len(), 1);

        assert_eq!(snapshot.resolve("vitamin d").unwrap().id, a.id);
        assert_eq!(snapshot.resolve(&a.id.to_string()).unwrap().id, a.id);
        assert_eq!(snapshot.resolve(&a.id.to_string()[..8]).unwrap().id, a.id);
        assert!(matches!(snapshot.resolve("aspirin"), Err(Error::NotFound(_))));
        assert_eq!(snapshot.subset(&[a.id]).len(), 1);
    }
}

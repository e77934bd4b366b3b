//! CSV export of the intake history.

use crate::{DayClock, Result, Snapshot};
use chrono::TimeZone;
use std::io::Write;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    id: String,
    medication_id: String,
    medication: &'a str,
    dosage: &'a str,
    timestamp: String,
    local_date: String,
    is_manual: bool,
}

/// Write every log of the snapshot as CSV, oldest first.
///
/// Logs whose medication no longer exists are skipped. Returns the number of
/// rows written.
pub fn write_logs_csv<Tz: TimeZone, W: Write>(
    clock: &DayClock<Tz>,
    snapshot: &Snapshot,
    writer: W,
) -> Result<usize> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(writer);

    let mut rows = 0;
    for log in snapshot.logs.iter().rev() {
        let Some(med) = snapshot.medication(log.medication_id) else {
            tracing::warn!("Skipping log {} for unknown medication {}", log.id, log.medication_id);
            continue;
        };

        writer.serialize(CsvRow {
            id: log.id.to_string(),
            medication_id: med.id.to_string(),
            medication: &med.name,
            dosage: &med.dosage,
            timestamp: log.timestamp.to_rfc3339(),
            local_date: clock.day_of(&log.timestamp).to_string(),
            is_manual: log.is_manual,
        })?;
        rows += 1;
    }

    writer.flush()?;
    Ok(rows)
}

/// Export to a file, replacing it if present
pub fn export_to_path<Tz: TimeZone>(
    clock: &DayClock<Tz>,
    snapshot: &Snapshot,
    path: &Path,
) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = std::fs::File::create(path)?;
    let rows = write_logs_csv(clock, snapshot, &file)?;
    file.sync_all()?;

    tracing::info!("Exported {} logs to {:?}", rows, path);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Medication, MedicationLog, NewMedication};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn snapshot() -> (Snapshot, Medication) {
        let med = Medication::from_new(NewMedication::new("Aspirin", "100mg"), 0, Utc::now());
        let now = Utc::now();
        let logs = vec![
            MedicationLog::quick(med.id, now),
            MedicationLog::manual(med.id, now - Duration::days(1)),
            MedicationLog::quick(Uuid::new_v4(), now),
        ];
        (Snapshot::new(vec![med.clone()], logs), med)
    }

    #[test]
    fn test_export_writes_header_and_rows() {
        let (snapshot, _) = snapshot();
        let mut out = Vec::new();

        let rows = write_logs_csv(&DayClock::new(Utc), &snapshot, &mut out).unwrap();
        assert_eq!(rows, 2);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,medication_id,medication,dosage,timestamp,local_date,is_manual"
        );
        // Oldest first: the manual, backdated log leads
        assert!(lines.next().unwrap().ends_with(",true"));
        assert!(lines.next().unwrap().contains("Aspirin,100mg"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_export_to_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("out/history.csv");
        let (snapshot, _) = snapshot();

        let rows = export_to_path(&DayClock::new(Utc), &snapshot, &path).unwrap();
        assert_eq!(rows, 2);

        let reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.into_records().count(), 2);
    }
}

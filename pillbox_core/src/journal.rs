//! Append-only journal of intake logs.
//!
//! Logs are appended to a JSONL (JSON Lines) file with file locking to
//! ensure safe concurrent access. Deletions rewrite the file atomically.

use crate::{Error, MedicationLog, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// JSONL-backed log journal
pub struct LogJournal {
    path: PathBuf,
}

impl LogJournal {
    /// Create a journal for the given path (the file is created lazily)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Append one log as a JSON line
    pub fn append(&self, log: &MedicationLog) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(log)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        tracing::debug!("Appended log {} to journal", log.id);
        Ok(())
    }

    /// Read every log in file order.
    ///
    /// Lines that fail to parse (for example a partial write after a crash)
    /// are skipped with a warning.
    pub fn read_all(&self) -> Result<Vec<MedicationLog>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        file.lock_shared()?;

        let reader = BufReader::new(&file);
        let mut logs = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<MedicationLog>(&line) {
                Ok(log) => logs.push(log),
                Err(e) => {
                    tracing::warn!("Failed to parse log at line {}: {}", line_num + 1, e);
                }
            }
        }

        file.unlock()?;
        tracing::debug!("Read {} logs from journal", logs.len());
        Ok(logs)
    }

    /// Replace the journal with `logs`.
    ///
    /// Writes to a temp file in the same directory, syncs it, and renames it
    /// over the journal so readers see either the old or the new contents.
    pub fn rewrite(&self, logs: &[MedicationLog]) -> Result<()> {
        self.ensure_parent_dir()?;

        let parent = self.path.parent().ok_or_else(|| {
            Error::Other(format!("journal path {:?} has no parent", self.path))
        })?;
        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            for log in logs {
                serde_json::to_writer(&mut writer, log)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Rewrote journal with {} logs", logs.len());
        Ok(())
    }

    /// Drop every log matching `predicate`; returns how many were removed
    pub fn remove_where<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&MedicationLog) -> bool,
    {
        let logs = self.read_all()?;
        let before = logs.len();
        let kept: Vec<MedicationLog> = logs.into_iter().filter(|l| !predicate(l)).collect();
        let removed = before - kept.len();

        if removed > 0 {
            self.rewrite(&kept)?;
        }
        Ok(removed)
    }
}

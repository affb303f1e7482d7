//! # Telemetry Module
//!
//! Command-stream logging to JSONL files with rotation.
//!
//! This module handles:
//! - Formatting published [`CommandEnvelope`]s as JSONL (JSON Lines)
//! - Writing to rotating log files (max N records per file)
//! - Retaining only the last M files
//!
//! Log failures degrade to a warning at the call site; they never feed back
//! into the control path.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::link::CommandEnvelope;

/// Prefix of every log file the logger manages.
const LOG_FILE_PREFIX: &str = "commands-";

/// Extension of every log file the logger manages.
const LOG_FILE_SUFFIX: &str = ".jsonl";

/// JSONL writer for published command envelopes.
///
/// Files are named `commands-NNNNNN.jsonl` with a zero-padded sequence
/// number, so lexicographic order is creation order. Numbering resumes
/// after the highest existing file, so a restart never overwrites history.
#[derive(Debug)]
pub struct CommandLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<File>,
    records_in_file: usize,
    sequence: u64,
}

impl CommandLogger {
    /// Creates a logger writing under `dir` (created if absent).
    ///
    /// # Arguments
    ///
    /// * `dir` - Log directory
    /// * `max_records_per_file` - Records before rolling to a new file
    /// * `max_files_to_keep` - Retention cap; older files are deleted
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be created or scanned.
    pub fn new<P: AsRef<Path>>(
        dir: P,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let sequence = next_sequence(&dir)?;

        Ok(Self {
            dir,
            max_records_per_file,
            max_files_to_keep,
            writer: None,
            records_in_file: 0,
            sequence,
        })
    }

    /// Appends one envelope as a JSON line, rotating first if the current
    /// file is full.
    ///
    /// # Errors
    ///
    /// Returns `Io` on write failure or `Json` on (defensive)
    /// serialization failure.
    pub fn log(&mut self, envelope: &CommandEnvelope) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let line = serde_json::to_string(envelope)?;
        // rotate() above guarantees a writer
        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            self.records_in_file += 1;
        }

        Ok(())
    }

    /// Opens the next log file and prunes beyond the retention cap.
    fn rotate(&mut self) -> Result<()> {
        let path = self.dir.join(format!(
            "{}{:06}{}",
            LOG_FILE_PREFIX, self.sequence, LOG_FILE_SUFFIX
        ));
        debug!("rotating command log to {}", path.display());

        self.writer = Some(File::create(&path)?);
        self.records_in_file = 0;
        self.sequence += 1;

        self.prune()?;
        Ok(())
    }

    /// Deletes the oldest log files beyond `max_files_to_keep`.
    fn prune(&self) -> Result<()> {
        let mut files = managed_files(&self.dir)?;
        files.sort();

        while files.len() > self.max_files_to_keep {
            let oldest = files.remove(0);
            debug!("pruning old command log {}", oldest.display());
            fs::remove_file(oldest)?;
        }

        Ok(())
    }
}

/// Lists the log files this logger owns inside `dir`.
fn managed_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with(LOG_FILE_PREFIX) && name.ends_with(LOG_FILE_SUFFIX) {
                files.push(path);
            }
        }
    }
    Ok(files)
}

/// First unused sequence number in `dir`.
fn next_sequence(dir: &Path) -> Result<u64> {
    let mut highest = None;
    for path in managed_files(dir)? {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            let digits = &name[LOG_FILE_PREFIX.len()..name.len() - LOG_FILE_SUFFIX.len()];
            if let Ok(number) = digits.parse::<u64>() {
                highest = Some(highest.map_or(number, |h: u64| h.max(number)));
            }
        }
    }
    Ok(highest.map_or(0, |h| h + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::cache::{OutputValue, Snapshot};
    use chrono::{TimeZone, Utc};

    fn envelope(value: f64) -> CommandEnvelope {
        let mut commands = Snapshot::new();
        commands.insert("servo".to_string(), OutputValue::Scalar(value));
        CommandEnvelope::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            commands,
        )
    }

    fn log_files(dir: &Path) -> Vec<PathBuf> {
        let mut files = managed_files(dir).unwrap();
        files.sort();
        files
    }

    // ==================== Writing Tests ====================

    #[test]
    fn test_log_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = CommandLogger::new(dir.path(), 100, 5).unwrap();

        logger.log(&envelope(0.25)).unwrap();
        logger.log(&envelope(0.5)).unwrap();

        let files = log_files(dir.path());
        assert_eq!(files.len(), 1);

        let contents = fs::read_to_string(&files[0]).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""servo":0.25"#));
        assert!(lines[0].contains("CTime_ID"));

        // Every line is standalone JSON
        for line in lines {
            let decoded: CommandEnvelope = serde_json::from_str(line).unwrap();
            assert_eq!(decoded.commands.len(), 1);
        }
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs").join("commands");

        let mut logger = CommandLogger::new(&nested, 10, 2).unwrap();
        logger.log(&envelope(1.0)).unwrap();

        assert_eq!(log_files(&nested).len(), 1);
    }

    // ==================== Rotation Tests ====================

    #[test]
    fn test_rotates_after_max_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = CommandLogger::new(dir.path(), 3, 10).unwrap();

        for i in 0..7 {
            logger.log(&envelope(i as f64)).unwrap();
        }

        // 7 records at 3 per file: two full files plus one in progress
        let files = log_files(dir.path());
        assert_eq!(files.len(), 3);

        let first = fs::read_to_string(&files[0]).unwrap();
        assert_eq!(first.lines().count(), 3);
        let last = fs::read_to_string(&files[2]).unwrap();
        assert_eq!(last.lines().count(), 1);
    }

    #[test]
    fn test_retention_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = CommandLogger::new(dir.path(), 1, 2).unwrap();

        for i in 0..5 {
            logger.log(&envelope(i as f64)).unwrap();
        }

        // One record per file, keep two: only the newest two survive
        let files = log_files(dir.path());
        assert_eq!(files.len(), 2);

        let newest = fs::read_to_string(files.last().unwrap()).unwrap();
        assert!(newest.contains(r#""servo":4.0"#));
    }

    #[test]
    fn test_sequence_resumes_after_restart() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut logger = CommandLogger::new(dir.path(), 1, 10).unwrap();
            logger.log(&envelope(1.0)).unwrap();
            logger.log(&envelope(2.0)).unwrap();
        }

        // A fresh logger must not overwrite existing files
        let mut logger = CommandLogger::new(dir.path(), 1, 10).unwrap();
        logger.log(&envelope(3.0)).unwrap();

        let files = log_files(dir.path());
        assert_eq!(files.len(), 3);
        assert!(files[2]
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .contains("000002"));
    }

    #[test]
    fn test_foreign_files_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let foreign = dir.path().join("notes.txt");
        fs::write(&foreign, "keep me").unwrap();

        let mut logger = CommandLogger::new(dir.path(), 1, 1).unwrap();
        for i in 0..3 {
            logger.log(&envelope(i as f64)).unwrap();
        }

        assert!(foreign.exists());
        assert_eq!(log_files(dir.path()).len(), 1);
    }
}

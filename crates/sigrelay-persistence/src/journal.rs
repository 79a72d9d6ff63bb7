//! JSON Lines journal for append-only record tables.
//!
//! Uses JSON Lines format (.jsonl) for robustness:
//! - Each line is a complete JSON object
//! - Partial file corruption only affects individual lines
//! - Can be read even if write was interrupted
//!
//! Files are named `{table}_{YYYY-MM-DD}.jsonl` and rotate daily. Records are
//! flushed on every append: the idempotency ledger reads these back after a
//! restart, so nothing may sit in a buffer.

use crate::error::PersistenceResult;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Active writer state for the current day's file.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// Append-only JSON Lines writer for one table.
pub struct JsonLinesJournal {
    base_dir: PathBuf,
    table: &'static str,
    active_writer: Option<ActiveWriter>,
}

impl JsonLinesJournal {
    /// Create a journal for `table` under `base_dir`, creating the directory.
    pub fn new(base_dir: impl AsRef<Path>, table: &'static str) -> PersistenceResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;

        Ok(Self {
            base_dir,
            table,
            active_writer: None,
        })
    }

    fn file_path(&self, date: &str) -> PathBuf {
        self.base_dir.join(format!("{}_{}.jsonl", self.table, date))
    }

    fn close_active_writer(&mut self) {
        if let Some(mut active) = self.active_writer.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, table = self.table, "Failed to flush journal on close");
            }
            info!(
                table = self.table,
                date = %active.date,
                records = active.records_written,
                "Closed journal file"
            );
        }
    }

    fn ensure_writer(&mut self, date: &str) -> PersistenceResult<()> {
        let needs_rotation = self
            .active_writer
            .as_ref()
            .map(|w| w.date != date)
            .unwrap_or(false);
        if needs_rotation {
            self.close_active_writer();
        }

        if self.active_writer.is_none() {
            let path = self.file_path(date);
            debug!(path = %path.display(), "Opening journal file (append mode)");
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.active_writer = Some(ActiveWriter {
                writer: BufWriter::new(file),
                date: date.to_string(),
                records_written: 0,
            });
        }

        Ok(())
    }

    /// Encode one record as a journal line. Done before taking any lock.
    pub fn encode<T: Serialize>(record: &T) -> PersistenceResult<String> {
        Ok(serde_json::to_string(record)?)
    }

    /// Append one encoded line and flush it to disk.
    pub fn append_line(&mut self, line: &str) -> PersistenceResult<()> {
        let today = Utc::now().format("%Y-%m-%d").to_string();

        self.ensure_writer(&today)?;
        let active = self
            .active_writer
            .as_mut()
            .expect("active_writer should exist");
        writeln!(active.writer, "{line}")?;
        active.writer.flush()?;
        active.records_written += 1;
        Ok(())
    }

    /// Read every record of `table` under `base_dir`, oldest file first.
    ///
    /// Lines that fail to parse are skipped with a warning; a torn final line
    /// from an interrupted write must not block startup.
    pub fn replay<T: DeserializeOwned>(
        base_dir: impl AsRef<Path>,
        table: &str,
    ) -> PersistenceResult<Vec<T>> {
        let base_dir = base_dir.as_ref();
        if !base_dir.exists() {
            return Ok(Vec::new());
        }

        let prefix = format!("{table}_");
        let mut files: Vec<PathBuf> = std::fs::read_dir(base_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().is_some_and(|ext| ext == "jsonl")
                    && p.file_stem()
                        .and_then(|n| n.to_str())
                        .and_then(|n| n.strip_prefix(&prefix))
                        .is_some_and(|date| {
                            chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok()
                        })
            })
            .collect();
        // Date suffix sorts lexicographically.
        files.sort();

        let mut records = Vec::new();
        for path in files {
            let reader = BufReader::new(File::open(&path)?);
            for (line_no, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str(&line) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        error = %e,
                        "Skipping unreadable journal line"
                    ),
                }
            }
        }

        info!(table, records = records.len(), "Replayed journal");
        Ok(records)
    }
}

impl Drop for JsonLinesJournal {
    fn drop(&mut self) {
        self.close_active_writer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: u32,
        symbol: String,
    }

    fn append(journal: &mut JsonLinesJournal, row: &Row) {
        let line = JsonLinesJournal::encode(row).unwrap();
        journal.append_line(&line).unwrap();
    }

    fn row(id: u32) -> Row {
        Row {
            id,
            symbol: "BTCUSDT".to_string(),
        }
    }

    #[test]
    fn test_append_and_replay() {
        let temp_dir = TempDir::new().unwrap();
        let mut journal = JsonLinesJournal::new(temp_dir.path(), "signal_logs").unwrap();
        for i in 0..5 {
            append(&mut journal, &row(i));
        }

        let replayed: Vec<Row> = JsonLinesJournal::replay(temp_dir.path(), "signal_logs").unwrap();
        assert_eq!(replayed.len(), 5);
        assert_eq!(replayed[0], row(0));
        assert_eq!(replayed[4], row(4));
    }

    #[test]
    fn test_append_mode_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut journal = JsonLinesJournal::new(temp_dir.path(), "t").unwrap();
            for i in 0..3 {
                append(&mut journal, &row(i));
            }
        }
        {
            let mut journal = JsonLinesJournal::new(temp_dir.path(), "t").unwrap();
            for i in 3..6 {
                append(&mut journal, &row(i));
            }
        }

        let replayed: Vec<Row> = JsonLinesJournal::replay(temp_dir.path(), "t").unwrap();
        assert_eq!(replayed.len(), 6, "Should have 6 records total from 2 writers");
    }

    #[test]
    fn test_replay_only_reads_own_table() {
        let temp_dir = TempDir::new().unwrap();
        let mut a = JsonLinesJournal::new(temp_dir.path(), "trades").unwrap();
        let mut b = JsonLinesJournal::new(temp_dir.path(), "trades_archive").unwrap();
        append(&mut a, &row(1));
        append(&mut b, &row(2));

        let replayed: Vec<Row> = JsonLinesJournal::replay(temp_dir.path(), "trades").unwrap();
        assert_eq!(replayed, vec![row(1)]);
    }

    #[test]
    fn test_replay_skips_torn_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("t_2024-01-01.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, r#"{{"id":1,"symbol":"BTCUSDT"}}"#).unwrap();
        write!(file, r#"{{"id":2,"sym"#).unwrap();

        let replayed: Vec<Row> = JsonLinesJournal::replay(temp_dir.path(), "t").unwrap();
        assert_eq!(replayed, vec![row(1)]);
    }

    #[test]
    fn test_replay_missing_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        let replayed: Vec<Row> = JsonLinesJournal::replay(&missing, "t").unwrap();
        assert!(replayed.is_empty());
    }
}

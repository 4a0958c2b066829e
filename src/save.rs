//! Persisted time-series of a simulation, one JSON object per line.
//!
//! The logical schema lives in [`SavedRow`]; the physical format is plain
//! JSON Lines so downstream analysis can stream it row by row.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One saved sample of the reactor state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedRow {
    /// s
    pub time: f64,
    /// K
    pub temperature: f64,
    /// Pa
    pub pressure: f64,
    /// m³
    pub volume: f64,
    /// indexed like the engine's species list
    pub mass_fractions: Vec<f64>,
    /// (n_vars x n_params), present only when sensitivity analysis is on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<Vec<Vec<f64>>>,
}

pub struct SaveFile {
    writer: BufWriter<File>,
}

impl SaveFile {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(SaveFile {
            writer: BufWriter::new(File::create(path)?),
        })
    }

    pub fn write_row(&mut self, row: &SavedRow) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, row)?;
        self.writer.write_all(b"\n")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Read a whole save file back; mainly for tests and small analyses.
pub fn read_rows(path: &Path) -> io::Result<Vec<SavedRow>> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(serde_json::from_str(&line)?);
    }
    Ok(rows)
}

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{Datelike, Local, NaiveDate};
use log::info;
use thiserror::Error;

use crate::attendance::classifier::FailureClassifier;
use crate::attendance::loader::{AttendanceLoader, LoadSummary};
use crate::attendance::record::{parse_records, AttendanceRecord};
use crate::attendance::{Connector, ParseError, StoreFailure};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("input file {} not found", .0.display())]
    InputNotFound(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("{0}")]
    Parse(#[from] ParseError),
}

/// Terminals drop one log per day, named `REC<MM><DD>.txt`.
pub fn input_file_name(date: NaiveDate) -> String {
    format!("REC{:02}{:02}.txt", date.month(), date.day())
}

pub fn todays_input_file() -> String {
    input_file_name(Local::now().date_naive())
}

/// Reads and parses the whole file before anything touches the database.
pub fn read_attendance_file<P: AsRef<Path>>(path: P) -> Result<Vec<AttendanceRecord>, IngestError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => IngestError::InputNotFound(path.to_path_buf()),
        _ => IngestError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let records = parse_records(file)?;
    info!("parsed {} attendance records from {}", records.len(), path.display());

    Ok(records)
}

/// One full run: the file is read and parsed completely before the loader
/// opens a connection.
pub fn ingest_file<C, K>(loader: &AttendanceLoader<C, K>, path: &str) -> Result<LoadSummary>
where
    C: Connector,
    K: FailureClassifier<StoreFailure<C>>,
{
    let records = read_attendance_file(path)?;
    let summary = loader.run(&records, path)?;

    Ok(summary)
}

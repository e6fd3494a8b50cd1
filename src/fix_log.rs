//! Recorded fix logs.
//!
//! A fix log is a CSV file with a header row:
//!
//! ```text
//! offset_secs,latitude,longitude,accuracy,age_secs,kind
//! 0.0,37.33182,-122.03118,65.0,,
//! 1.0,37.33180,-122.03120,30.0,,
//! 1.5,,,,,unknown
//! 2.0,37.33181,-122.03119,5.0,0.5,
//! ```
//!
//! Rows with a `kind` are failures (`unknown`, `denied`, or anything else for a
//! generic error); all other rows are readings. `age_secs` backdates a reading,
//! which is how cached fixes from an earlier run are recorded.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::fix::Coordinate;
use crate::position::SourceFailure;

/// Replayed fixes may be backdated by at most this much
pub const MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum FixLogError {
    #[error("cannot read fix log: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed fix log: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FixLogEntry {
    Reading {
        offset: Duration,
        coordinate: Coordinate,
        accuracy: f64,
        age: Duration,
    },
    Failure {
        offset: Duration,
        failure: SourceFailure,
    },
}

impl FixLogEntry {
    pub fn offset(&self) -> Duration {
        match self {
            FixLogEntry::Reading { offset, .. } | FixLogEntry::Failure { offset, .. } => *offset,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Row {
    offset_secs: f64,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    accuracy: Option<f64>,
    #[serde(default)]
    age_secs: Option<f64>,
    #[serde(default)]
    kind: Option<String>,
}

pub fn read_path<P: AsRef<Path>>(path: P) -> Result<Vec<FixLogEntry>, FixLogError> {
    read(File::open(path)?)
}

/// Parses a fix log, returning entries ordered by offset
pub fn read<R: Read>(reader: R) -> Result<Vec<FixLogEntry>, FixLogError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut entries = Vec::new();
    for (idx, row) in rdr.deserialize::<Row>().enumerate() {
        entries.push(parse_row(idx + 1, row?)?);
    }
    entries.sort_by(|a, b| a.offset().cmp(&b.offset()));
    Ok(entries)
}

fn parse_row(row_no: usize, row: Row) -> Result<FixLogEntry, FixLogError> {
    let invalid = |reason: &str| FixLogError::InvalidRow {
        row: row_no,
        reason: reason.to_string(),
    };

    let offset = seconds(row.offset_secs)
        .ok_or_else(|| invalid("offset_secs must be a non-negative duration"))?;

    if let Some(kind) = row.kind.filter(|k| !k.is_empty()) {
        let failure = match kind.to_lowercase().as_str() {
            "unknown" => SourceFailure::LocationUnknown,
            "denied" => SourceFailure::Denied,
            _ => SourceFailure::Other(kind),
        };
        return Ok(FixLogEntry::Failure { offset, failure });
    }

    let (latitude, longitude, accuracy) = match (row.latitude, row.longitude, row.accuracy) {
        (Some(lat), Some(lon), Some(acc)) => (lat, lon, acc),
        _ => return Err(invalid("readings need latitude, longitude and accuracy")),
    };
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(invalid("coordinate out of range"));
    }
    let age = match row.age_secs {
        Some(secs) => seconds(secs)
            .filter(|age| *age <= MAX_AGE)
            .ok_or_else(|| invalid("age_secs must be between 0 and one week"))?,
        None => Duration::ZERO,
    };

    Ok(FixLogEntry::Reading {
        offset,
        coordinate: Coordinate::new(latitude, longitude),
        accuracy,
        age,
    })
}

fn seconds(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

use std::io;

use chrono::NaiveDateTime;
use getset::Getters;
use log::{debug, warn};
use serde::Deserialize;

use super::ParseError;

/// Storage width of the employee id column.
pub const MAX_EMPLOYEE_ID_LEN: usize = 10;

const FIELD_COUNT: usize = 5;
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
/// Two-digit years from here up are 19xx, below it 20xx.
const CENTURY_PIVOT: u32 = 69;

#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct AttendanceRecord {
    machine_id: String,
    employee_id: String,
    timestamp: NaiveDateTime,
}

impl AttendanceRecord {
    /// Employee ids longer than `MAX_EMPLOYEE_ID_LEN` are cut down here, so no
    /// record ever carries an id the store cannot hold.
    pub fn new(machine_id: &str, employee_id: &str, timestamp: NaiveDateTime) -> AttendanceRecord {
        let employee_id = if employee_id.chars().count() > MAX_EMPLOYEE_ID_LEN {
            warn!("truncating oversized employee id: {}", employee_id);
            employee_id.chars().take(MAX_EMPLOYEE_ID_LEN).collect()
        } else {
            employee_id.to_string()
        };

        AttendanceRecord {
            machine_id: machine_id.to_string(),
            employee_id,
            timestamp,
        }
    }
}

/// `MACHINE_ID:EMPLOYEE_ID:YYMMDD:HHMMSS:` as written by the terminals.
#[derive(Debug, Deserialize)]
struct SwipeLine {
    machine_id: String,
    employee_id: String,
    card_date: String,
    card_time: String,
    _trailer: String,
}

impl SwipeLine {
    fn into_record(self, line: u64) -> Result<AttendanceRecord, ParseError> {
        let stamp = format!("{}{}", self.card_date, self.card_time);
        let timestamp = expand_year(&stamp)
            .and_then(|full| NaiveDateTime::parse_from_str(&full, TIMESTAMP_FORMAT).ok())
            .ok_or(ParseError::Timestamp { line, value: stamp.clone() })?;

        // Only the line ends are trimmed; inner fields keep their spacing.
        Ok(AttendanceRecord::new(
            self.machine_id.trim_start(),
            &self.employee_id,
            timestamp,
        ))
    }
}

fn expand_year(stamp: &str) -> Option<String> {
    let year: u32 = stamp.get(..2)?.parse().ok()?;
    let century = if year >= CENTURY_PIVOT { "19" } else { "20" };
    Some(format!("{}{}", century, stamp))
}

/// Parses the whole log. Lines that do not split into exactly five fields are
/// dropped without complaint; a bad timestamp anywhere fails the whole parse.
pub fn parse_records<R: io::Read>(input: R) -> Result<Vec<AttendanceRecord>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b':')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(input);

    let mut records = Vec::new();
    for raw in reader.records() {
        let raw = raw?;
        let line = raw.position().map_or(0, |pos| pos.line());

        if raw.len() != FIELD_COUNT {
            debug!("dropping line {}: expected {} fields, got {}", line, FIELD_COUNT, raw.len());
            continue;
        }

        let swipe: SwipeLine = raw.deserialize(None)?;
        records.push(swipe.into_record(line)?);
    }

    Ok(records)
}

//! SQLite storage backend: connection, schema bootstrap, id sequences and the
//! mapping of SQLite result codes onto write decisions.

use std::ops::Range;
use std::path::Path;

use chrono::Local;
use log::info;
use rusqlite::{ffi, params, Connection, ErrorCode};

use crate::attendance::classifier::{FailureClassifier, WriteDecision};
use crate::attendance::ledger::{DetailRow, TransactionHeader};
use crate::attendance::{AttendanceStore, Connector, SequenceSource};
use crate::config::Config;

const TXN_SEQUENCE: &str = "txn_id";
const DETAIL_SEQUENCE: &str = "detail_id";

/// Suffix shared by the CHECK constraints that bound column widths.
pub const CAPACITY_SUFFIX: &str = "_capacity";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS attendance_header (
    txn_id      INTEGER PRIMARY KEY,
    txn_date    TEXT NOT NULL,
    txn_source  TEXT NOT NULL,
    txn_info    TEXT,
    txn_status  TEXT,
    txn_level   TEXT
);

CREATE TABLE IF NOT EXISTS attendance_detail (
    detail_id   TEXT PRIMARY KEY,
    employee_id TEXT NOT NULL CONSTRAINT employee_id_capacity CHECK (length(employee_id) <= 10),
    reg_date    TEXT NOT NULL,
    card_time   TEXT NOT NULL,
    status      TEXT NOT NULL,
    machine_id  TEXT NOT NULL CONSTRAINT machine_id_capacity CHECK (length(machine_id) <= 16),
    txn_ref     INTEGER NOT NULL REFERENCES attendance_header (txn_id),
    UNIQUE (employee_id, machine_id, card_time)
);

CREATE TABLE IF NOT EXISTS id_sequence (
    name  TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

INSERT OR IGNORE INTO id_sequence (name, value) VALUES ('txn_id', 0), ('detail_id', 0);
";

pub struct SqliteConnector {
    config: Config,
}

impl SqliteConnector {
    pub fn new(config: Config) -> SqliteConnector {
        SqliteConnector { config }
    }
}

impl Connector for SqliteConnector {
    type Store = SqliteStore;

    fn connect(&self) -> rusqlite::Result<SqliteStore> {
        info!("connecting to {} as {}", self.config.target, self.config.user);
        SqliteStore::open(&self.config.target)
    }
}

/// Ids come from the `id_sequence` table. `reserve_ids` claims a run's ids
/// in autocommit mode before `BEGIN`, so a rolled back run never hands its ids
/// to the next one.
pub struct SqliteStore {
    conn: Connection,
    reserved_txn: Option<i64>,
    reserved_details: Range<i64>,
}

impl SqliteStore {
    /// Opens the database file and makes sure the attendance tables exist.
    pub fn open<P: AsRef<Path>>(path: P) -> rusqlite::Result<SqliteStore> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(SqliteStore {
            conn,
            reserved_txn: None,
            reserved_details: 0..0,
        })
    }

    /// Advances `sequence` by `step` and returns its new value.
    fn advance(&self, sequence: &str, step: i64) -> rusqlite::Result<i64> {
        self.conn.query_row(
            "UPDATE id_sequence SET value = value + ?2 WHERE name = ?1 RETURNING value",
            params![sequence, step],
            |row| row.get(0),
        )
    }
}

impl SequenceSource for SqliteStore {
    type Failure = rusqlite::Error;

    fn reserve_ids(&mut self, detail_count: usize) -> rusqlite::Result<()> {
        let count = i64::try_from(detail_count).map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
        let txn_id = self.advance(TXN_SEQUENCE, 1)?;
        let last_detail = self.advance(DETAIL_SEQUENCE, count)?;

        self.reserved_txn = Some(txn_id);
        self.reserved_details = (last_detail - count + 1)..(last_detail + 1);
        Ok(())
    }

    fn next_txn_id(&mut self) -> rusqlite::Result<i64> {
        match self.reserved_txn.take() {
            Some(txn_id) => Ok(txn_id),
            None => self.advance(TXN_SEQUENCE, 1),
        }
    }

    fn next_detail_id(&mut self) -> rusqlite::Result<i64> {
        match self.reserved_details.next() {
            Some(detail_seq) => Ok(detail_seq),
            None => self.advance(DETAIL_SEQUENCE, 1),
        }
    }
}

impl AttendanceStore for SqliteStore {
    fn begin(&mut self) -> rusqlite::Result<()> {
        self.conn.execute_batch("BEGIN")
    }

    fn insert_header(&mut self, header: &TransactionHeader) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO attendance_header (txn_id, txn_date, txn_source, txn_info, txn_status, txn_level)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                header.txn_id(),
                Local::now().naive_local(),
                header.source_file(),
                header.info(),
                header.status(),
                header.level()
            ],
        )?;
        Ok(())
    }

    fn insert_detail(&mut self, row: &DetailRow) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO attendance_detail (detail_id, employee_id, reg_date, card_time, status, machine_id, txn_ref)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.detail_id(),
                row.employee_id(),
                Local::now().naive_local(),
                row.timestamp(),
                row.status(),
                row.machine_id(),
                row.txn_id()
            ],
        )?;
        Ok(())
    }

    fn commit(&mut self) -> rusqlite::Result<()> {
        self.conn.execute_batch("COMMIT")
    }

    fn rollback(&mut self) -> rusqlite::Result<()> {
        self.conn.execute_batch("ROLLBACK")
    }

    fn close(self) -> rusqlite::Result<()> {
        self.conn.close().map_err(|(_, err)| err)
    }
}

/// Uniqueness violations are duplicates; width overflows are oversized
/// values. Every other SQLite failure aborts the run.
pub struct SqliteClassifier;

impl FailureClassifier<rusqlite::Error> for SqliteClassifier {
    fn classify(&self, failure: &rusqlite::Error) -> WriteDecision {
        let rusqlite::Error::SqliteFailure(err, message) = failure else {
            return WriteDecision::Abort;
        };

        match err.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => WriteDecision::SkipDuplicate,
            ffi::SQLITE_CONSTRAINT_CHECK if names_capacity_check(message.as_deref()) => WriteDecision::SkipOversized,
            _ if err.code == ErrorCode::TooBig => WriteDecision::SkipOversized,
            _ => WriteDecision::Abort,
        }
    }
}

fn names_capacity_check(message: Option<&str>) -> bool {
    message.is_some_and(|m| m.contains(CAPACITY_SUFFIX))
}

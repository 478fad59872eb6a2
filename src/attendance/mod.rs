use std::error::Error as StdError;

use thiserror::Error;

pub mod classifier;
pub mod ledger;
pub mod loader;
pub mod record;

#[cfg(test)]
mod loader_tests;

use ledger::{DetailRow, TransactionHeader};

/// Backend failures cross the loader boundary boxed, so `LoadError` stays
/// independent of the storage driver.
pub type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, PartialEq, Error)]
pub enum ParseError {
    #[error("line {line}: invalid card timestamp {value:?}")]
    Timestamp { line: u64, value: String },
    /// I/O failure or invalid UTF-8 while reading the log.
    #[error("failed to read attendance data: {0}")]
    Read(String),
}

impl From<csv::Error> for ParseError {
    fn from(err: csv::Error) -> Self {
        ParseError::Read(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("database connection failed: {0}")]
    Connection(#[source] BoxError),
    #[error("failed to reserve identifiers: {0}")]
    Reserve(#[source] BoxError),
    #[error("failed to write transaction header: {0}")]
    Header(#[source] BoxError),
    #[error("failed to allocate detail id for record {index}: {source}")]
    Sequence { index: usize, source: BoxError },
    #[error("fatal write failure on record {index} (employee {employee_id}): {source}")]
    FatalWrite {
        index: usize,
        employee_id: String,
        source: BoxError,
    },
    #[error("failed to commit transaction: {0}")]
    Commit(#[source] BoxError),
}

/// Identifier allocation. Values handed out are never given back, even when
/// the write they were allocated for is skipped or its run is rolled back.
pub trait SequenceSource {
    type Failure: StdError + Send + Sync + 'static;

    /// Claims one txn id and `detail_count` detail ids ahead of a run. Called
    /// before the run's transaction begins, so the claim outlives a rollback.
    /// Stores whose counters are not transactional can keep the default.
    fn reserve_ids(&mut self, _detail_count: usize) -> Result<(), Self::Failure> {
        Ok(())
    }

    fn next_txn_id(&mut self) -> Result<i64, Self::Failure>;
    fn next_detail_id(&mut self) -> Result<i64, Self::Failure>;
}

/// One open connection to the store, owned by a single run.
pub trait AttendanceStore: SequenceSource {
    fn begin(&mut self) -> Result<(), Self::Failure>;
    fn insert_header(&mut self, header: &TransactionHeader) -> Result<(), Self::Failure>;
    fn insert_detail(&mut self, row: &DetailRow) -> Result<(), Self::Failure>;
    fn commit(&mut self) -> Result<(), Self::Failure>;
    fn rollback(&mut self) -> Result<(), Self::Failure>;
    fn close(self) -> Result<(), Self::Failure>;
}

pub trait Connector {
    type Store: AttendanceStore;

    fn connect(&self) -> Result<Self::Store, <Self::Store as SequenceSource>::Failure>;
}

pub type StoreFailure<C> = <<C as Connector>::Store as SequenceSource>::Failure;

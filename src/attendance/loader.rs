use getset::CopyGetters;
use log::{error, info, warn};

use super::classifier::{FailureClassifier, WriteDecision};
use super::ledger::TransactionLedger;
use super::record::AttendanceRecord;
use super::{AttendanceStore, Connector, LoadError, SequenceSource, StoreFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct LoadSummary {
    txn_id: i64,
    committed: usize,
    skipped_oversized: usize,
    skipped_duplicate: usize,
}

impl LoadSummary {
    fn new(txn_id: i64) -> LoadSummary {
        LoadSummary {
            txn_id,
            committed: 0,
            skipped_oversized: 0,
            skipped_duplicate: 0,
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped_oversized + self.skipped_duplicate
    }
}

pub struct AttendanceLoader<C, K> {
    connector: C,
    classifier: K,
}

impl<C, K> AttendanceLoader<C, K>
where
    C: Connector,
    K: FailureClassifier<StoreFailure<C>>,
{
    pub fn new(connector: C, classifier: K) -> AttendanceLoader<C, K> {
        AttendanceLoader { connector, classifier }
    }

    /// Loads every record under one transaction. Either the header and all
    /// stored details are committed together, or nothing from this run is.
    /// The connection is released on every path once it has been opened.
    pub fn run(&self, records: &[AttendanceRecord], source_file: &str) -> Result<LoadSummary, LoadError> {
        let mut store = self
            .connector
            .connect()
            .map_err(|err| LoadError::Connection(err.into()))?;

        let result = self.load(&mut store, records, source_file);

        if let Err(err) = store.close() {
            warn!("failed to release database connection: {}", err);
        }

        result
    }

    fn load(&self, store: &mut C::Store, records: &[AttendanceRecord], source_file: &str) -> Result<LoadSummary, LoadError> {
        store
            .reserve_ids(records.len())
            .map_err(|err| LoadError::Reserve(err.into()))?;
        store.begin().map_err(|err| LoadError::Connection(err.into()))?;

        let summary = match self.process(store, records, source_file) {
            Ok(summary) => summary,
            Err(err) => {
                error!("{}", err);
                rollback(store);
                return Err(err);
            },
        };

        if let Err(err) = store.commit() {
            error!("commit failed: {}", err);
            rollback(store);
            return Err(LoadError::Commit(err.into()));
        }

        info!(
            "data successfully inserted into the database: transaction {}, {} stored, {} skipped",
            summary.txn_id(),
            summary.committed(),
            summary.skipped()
        );

        Ok(summary)
    }

    fn process(&self, store: &mut C::Store, records: &[AttendanceRecord], source_file: &str) -> Result<LoadSummary, LoadError> {
        let ledger = TransactionLedger::begin_run(store, source_file).map_err(|err| LoadError::Header(err.into()))?;
        let mut summary = LoadSummary::new(ledger.txn_id());

        for (index, record) in records.iter().enumerate() {
            let row = ledger
                .allocate_detail(store, record)
                .map_err(|err| LoadError::Sequence { index, source: err.into() })?;

            let failure = match store.insert_detail(&row) {
                Ok(()) => {
                    summary.committed += 1;
                    continue;
                },
                Err(failure) => failure,
            };

            match self.classifier.classify(&failure) {
                WriteDecision::SkipOversized => {
                    warn!(
                        "skipping record with oversized value: employee {}, machine {} ({})",
                        record.employee_id(),
                        record.machine_id(),
                        failure
                    );
                    summary.skipped_oversized += 1;
                },
                WriteDecision::SkipDuplicate => {
                    warn!(
                        "skipping duplicate entry for employee {}, machine {}, card time {}",
                        record.employee_id(),
                        record.machine_id(),
                        record.timestamp()
                    );
                    summary.skipped_duplicate += 1;
                },
                WriteDecision::Abort => {
                    return Err(LoadError::FatalWrite {
                        index,
                        employee_id: record.employee_id().clone(),
                        source: failure.into(),
                    });
                },
            }
        }

        Ok(summary)
    }
}

fn rollback<S: AttendanceStore>(store: &mut S) {
    match store.rollback() {
        Ok(()) => warn!("transaction rolled back"),
        Err(err) => error!("rollback failed: {}", err),
    }
}

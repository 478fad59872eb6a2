use std::path::Path;

use chrono::NaiveDateTime;
use getset::{CopyGetters, Getters};
use log::info;

use super::record::AttendanceRecord;
use super::{AttendanceStore, SequenceSource};

pub const HEADER_INFO: &str = "Started Updating Database";
pub const HEADER_STATUS: &str = "true";
pub const HEADER_LEVEL: &str = "1";
pub const DETAIL_STATUS: &str = "0";

const DETAIL_ID_PREFIX: &str = "AL";

#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct TransactionHeader {
    #[getset(get_copy = "pub")]
    txn_id: i64,
    #[getset(get = "pub")]
    source_file: String,
}

impl TransactionHeader {
    pub fn new(txn_id: i64, source_file: &str) -> TransactionHeader {
        TransactionHeader {
            txn_id,
            source_file: source_name(source_file),
        }
    }

    pub fn info(&self) -> &'static str {
        HEADER_INFO
    }

    pub fn status(&self) -> &'static str {
        HEADER_STATUS
    }

    pub fn level(&self) -> &'static str {
        HEADER_LEVEL
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct DetailRow {
    #[getset(get = "pub")]
    detail_id: String,
    #[getset(get = "pub")]
    employee_id: String,
    #[getset(get_copy = "pub")]
    timestamp: NaiveDateTime,
    #[getset(get = "pub")]
    machine_id: String,
    #[getset(get_copy = "pub")]
    txn_id: i64,
}

impl DetailRow {
    pub fn new(detail_seq: i64, record: &AttendanceRecord, txn_id: i64) -> DetailRow {
        DetailRow {
            detail_id: format_detail_id(detail_seq),
            employee_id: record.employee_id().clone(),
            timestamp: *record.timestamp(),
            machine_id: record.machine_id().clone(),
            txn_id,
        }
    }

    pub fn status(&self) -> &'static str {
        DETAIL_STATUS
    }
}

pub fn format_detail_id(detail_seq: i64) -> String {
    format!("{}{:08}", DETAIL_ID_PREFIX, detail_seq)
}

/// Upper-cased base name of the input file, as recorded on the header.
pub fn source_name(source_file: &str) -> String {
    Path::new(source_file)
        .file_name()
        .map(|name| name.to_string_lossy().to_uppercase())
        .unwrap_or_else(|| source_file.to_uppercase())
}

/// Bookkeeping for one run: the header written at the start and the detail
/// ids handed out after it.
pub struct TransactionLedger {
    header: TransactionHeader,
}

impl TransactionLedger {
    /// The header goes into the store's open transaction. It is not committed
    /// on its own, so a rolled back run leaves no header behind.
    pub fn begin_run<S: AttendanceStore>(store: &mut S, source_file: &str) -> Result<TransactionLedger, S::Failure> {
        let txn_id = store.next_txn_id()?;
        let header = TransactionHeader::new(txn_id, source_file);
        store.insert_header(&header)?;

        info!("started transaction {} for {}", txn_id, header.source_file());

        Ok(TransactionLedger { header })
    }

    pub fn header(&self) -> &TransactionHeader {
        &self.header
    }

    pub fn txn_id(&self) -> i64 {
        self.header.txn_id()
    }

    /// Every call consumes a detail id, whether or not the row it is used for
    /// ends up stored.
    pub fn allocate_detail<S: SequenceSource>(
        &self,
        store: &mut S,
        record: &AttendanceRecord,
    ) -> Result<DetailRow, S::Failure> {
        let detail_seq = store.next_detail_id()?;
        Ok(DetailRow::new(detail_seq, record, self.txn_id()))
    }
}

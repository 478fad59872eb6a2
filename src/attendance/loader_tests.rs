use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveDateTime};
use pretty_assertions::assert_eq;
use thiserror::Error;

use super::classifier::{FailureClassifier, WriteDecision};
use super::ledger::{DetailRow, TransactionHeader};
use super::loader::AttendanceLoader;
use super::record::AttendanceRecord;
use super::*;

#[derive(Debug, Clone, PartialEq, Error)]
enum MemoryFailure {
    #[error("value too large for column")]
    TooLarge,
    #[error("unique constraint violated")]
    Duplicate,
    #[error("backend unavailable")]
    Broken,
}

struct MemoryClassifier;

impl FailureClassifier<MemoryFailure> for MemoryClassifier {
    fn classify(&self, failure: &MemoryFailure) -> WriteDecision {
        match failure {
            MemoryFailure::TooLarge => WriteDecision::SkipOversized,
            MemoryFailure::Duplicate => WriteDecision::SkipDuplicate,
            MemoryFailure::Broken => WriteDecision::Abort,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    txn_seq: i64,
    detail_seq: i64,
    headers: Vec<TransactionHeader>,
    details: Vec<DetailRow>,
    pending_headers: Vec<TransactionHeader>,
    pending_details: Vec<DetailRow>,
    /// Scripted insert failures, keyed by employee id.
    failures: HashMap<String, MemoryFailure>,
    refuse_connection: bool,
    in_transaction: bool,
    /// `(detail_count, in_transaction)` for every reservation.
    reservations: Vec<(usize, bool)>,
    connects: usize,
    closes: usize,
    commits: usize,
    rollbacks: usize,
}

#[derive(Clone, Default)]
struct MemoryConnector {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryConnector {
    fn fail_on(&self, employee_id: &str, failure: MemoryFailure) {
        self.state.borrow_mut().failures.insert(employee_id.to_string(), failure);
    }
}

struct MemoryStore {
    state: Rc<RefCell<MemoryState>>,
}

impl Connector for MemoryConnector {
    type Store = MemoryStore;

    fn connect(&self) -> Result<MemoryStore, MemoryFailure> {
        let mut state = self.state.borrow_mut();
        if state.refuse_connection {
            return Err(MemoryFailure::Broken);
        }
        state.connects += 1;

        Ok(MemoryStore {
            state: Rc::clone(&self.state),
        })
    }
}

impl SequenceSource for MemoryStore {
    type Failure = MemoryFailure;

    fn reserve_ids(&mut self, detail_count: usize) -> Result<(), MemoryFailure> {
        let mut state = self.state.borrow_mut();
        let in_transaction = state.in_transaction;
        state.reservations.push((detail_count, in_transaction));
        Ok(())
    }

    fn next_txn_id(&mut self) -> Result<i64, MemoryFailure> {
        let mut state = self.state.borrow_mut();
        state.txn_seq += 1;
        Ok(state.txn_seq)
    }

    fn next_detail_id(&mut self) -> Result<i64, MemoryFailure> {
        let mut state = self.state.borrow_mut();
        state.detail_seq += 1;
        Ok(state.detail_seq)
    }
}

impl AttendanceStore for MemoryStore {
    fn begin(&mut self) -> Result<(), MemoryFailure> {
        self.state.borrow_mut().in_transaction = true;
        Ok(())
    }

    fn insert_header(&mut self, header: &TransactionHeader) -> Result<(), MemoryFailure> {
        self.state.borrow_mut().pending_headers.push(header.clone());
        Ok(())
    }

    fn insert_detail(&mut self, row: &DetailRow) -> Result<(), MemoryFailure> {
        let mut state = self.state.borrow_mut();
        if let Some(failure) = state.failures.get(row.employee_id()) {
            return Err(failure.clone());
        }

        let same_swipe = |other: &DetailRow| {
            other.employee_id() == row.employee_id()
                && other.machine_id() == row.machine_id()
                && other.timestamp() == row.timestamp()
        };
        if state.details.iter().any(same_swipe) || state.pending_details.iter().any(same_swipe) {
            return Err(MemoryFailure::Duplicate);
        }

        state.pending_details.push(row.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), MemoryFailure> {
        let mut state = self.state.borrow_mut();
        let headers: Vec<_> = state.pending_headers.drain(..).collect();
        let details: Vec<_> = state.pending_details.drain(..).collect();
        state.headers.extend(headers);
        state.details.extend(details);
        state.in_transaction = false;
        state.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), MemoryFailure> {
        let mut state = self.state.borrow_mut();
        state.pending_headers.clear();
        state.pending_details.clear();
        state.in_transaction = false;
        state.rollbacks += 1;
        Ok(())
    }

    fn close(self) -> Result<(), MemoryFailure> {
        self.state.borrow_mut().closes += 1;
        Ok(())
    }
}

fn at(minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 11, 5).unwrap().and_hms_opt(8, minute, 0).unwrap()
}

fn swipes(count: usize) -> Vec<AttendanceRecord> {
    (0..count)
        .map(|i| AttendanceRecord::new("101", &format!("E{}", i), at(i as u32)))
        .collect()
}

fn loader(connector: &MemoryConnector) -> AttendanceLoader<MemoryConnector, MemoryClassifier> {
    AttendanceLoader::new(connector.clone(), MemoryClassifier)
}

#[test]
fn test_run_commits_header_and_details() -> Result<()> {
    let connector = MemoryConnector::default();
    let summary = loader(&connector).run(&swipes(3), "rec1105.txt")?;

    assert_eq!(summary.txn_id(), 1);
    assert_eq!(summary.committed(), 3);
    assert_eq!(summary.skipped(), 0);

    let state = connector.state.borrow();
    assert_eq!(state.headers, vec![TransactionHeader::new(1, "REC1105.TXT")]);
    let ids: Vec<&str> = state.details.iter().map(|d| d.detail_id().as_str()).collect();
    assert_eq!(ids, vec!["AL00000001", "AL00000002", "AL00000003"]);
    assert!(state.details.iter().all(|d| d.txn_id() == 1 && d.status() == "0"));
    assert_eq!((state.commits, state.rollbacks, state.closes), (1, 0, 1));
    assert!(!state.in_transaction);
    assert_eq!(state.reservations, vec![(3, false)]);

    Ok(())
}

#[test]
fn test_empty_file_still_records_header() -> Result<()> {
    let connector = MemoryConnector::default();
    let summary = loader(&connector).run(&[], "REC0101.txt")?;

    assert_eq!(summary.committed(), 0);
    let state = connector.state.borrow();
    assert_eq!(state.headers.len(), 1);
    assert!(state.details.is_empty());

    Ok(())
}

#[test]
fn test_skipped_records_leave_gaps_in_detail_ids() -> Result<()> {
    let connector = MemoryConnector::default();
    connector.fail_on("E1", MemoryFailure::TooLarge);
    connector.fail_on("E3", MemoryFailure::Duplicate);

    let summary = loader(&connector).run(&swipes(5), "REC1105.txt")?;

    assert_eq!(summary.committed(), 3);
    assert_eq!(summary.skipped_oversized(), 1);
    assert_eq!(summary.skipped_duplicate(), 1);

    let state = connector.state.borrow();
    let ids: Vec<&str> = state.details.iter().map(|d| d.detail_id().as_str()).collect();
    assert_eq!(ids, vec!["AL00000001", "AL00000003", "AL00000005"]);
    assert_eq!(state.detail_seq, 5);

    Ok(())
}

#[test]
fn test_rerun_skips_every_duplicate_but_adds_header() -> Result<()> {
    let connector = MemoryConnector::default();
    let records = swipes(4);

    loader(&connector).run(&records, "REC1105.txt")?;
    let summary = loader(&connector).run(&records, "REC1105.txt")?;

    assert_eq!(summary.txn_id(), 2);
    assert_eq!(summary.committed(), 0);
    assert_eq!(summary.skipped_duplicate(), 4);

    let state = connector.state.borrow();
    assert_eq!(state.headers.len(), 2);
    assert_eq!(state.details.len(), 4);

    Ok(())
}

#[test]
fn test_fatal_failure_rolls_back_whole_run() -> Result<()> {
    let connector = MemoryConnector::default();
    connector.fail_on("E3", MemoryFailure::Broken);

    match loader(&connector).run(&swipes(6), "REC1105.txt") {
        Err(LoadError::FatalWrite { index, employee_id, .. }) => {
            assert_eq!(index, 3);
            assert_eq!(employee_id, "E3");
        },
        Err(err) => bail!("unexpected error: {}", err),
        Ok(_) => bail!("a fatal write failure should abort the run"),
    }

    let state = connector.state.borrow();
    assert!(state.headers.is_empty());
    assert!(state.details.is_empty());
    // Records after the failing one are never attempted.
    assert_eq!(state.detail_seq, 4);
    assert_eq!((state.commits, state.rollbacks, state.closes), (0, 1, 1));

    Ok(())
}

#[test]
fn test_fatal_failure_keeps_earlier_runs() -> Result<()> {
    let connector = MemoryConnector::default();
    loader(&connector).run(&swipes(2), "REC1104.txt")?;

    connector.fail_on("E0", MemoryFailure::Broken);
    let records = vec![AttendanceRecord::new("102", "E0", at(30))];
    assert!(loader(&connector).run(&records, "REC1105.txt").is_err());

    let state = connector.state.borrow();
    assert_eq!(state.headers, vec![TransactionHeader::new(1, "REC1104.TXT")]);
    assert_eq!(state.details.len(), 2);

    Ok(())
}

#[test]
fn test_refused_connection_releases_nothing() -> Result<()> {
    let connector = MemoryConnector::default();
    connector.state.borrow_mut().refuse_connection = true;

    match loader(&connector).run(&swipes(2), "REC1105.txt") {
        Err(LoadError::Connection(_)) => {},
        Err(err) => bail!("unexpected error: {}", err),
        Ok(_) => bail!("run should fail without a connection"),
    }

    let state = connector.state.borrow();
    assert_eq!((state.connects, state.closes, state.rollbacks), (0, 0, 0));
    assert_eq!(state.txn_seq, 0);

    Ok(())
}

#[test]
fn test_closure_can_stand_in_for_classifier() -> Result<()> {
    let connector = MemoryConnector::default();
    connector.fail_on("E0", MemoryFailure::Broken);

    let lenient = |_: &MemoryFailure| WriteDecision::SkipDuplicate;
    let summary = AttendanceLoader::new(connector.clone(), lenient).run(&swipes(2), "REC1105.txt")?;

    assert_eq!(summary.committed(), 1);
    assert_eq!(summary.skipped_duplicate(), 1);

    Ok(())
}

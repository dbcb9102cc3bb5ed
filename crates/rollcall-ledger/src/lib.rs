//! rollcall-ledger — Per-date attendance records.
//!
//! One CSV file per date (`attendance_<YYYY-MM-DD>.csv`, columns
//! `Name,Domain,Date,Time`). Merges are idempotent: a name is recorded at
//! most once per date and existing rows are never rewritten.

pub mod entry;
pub mod store;

pub use entry::{ledger_file_name, AttendanceEntry, BatchStamp, HEADER};
pub use store::{Ledger, LedgerError, LedgerStore, MergeSummary};

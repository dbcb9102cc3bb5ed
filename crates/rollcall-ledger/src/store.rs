//! Per-date ledger files and the merge protocol.

use crate::entry::{ledger_file_name, AttendanceEntry, BatchStamp, HEADER};
use chrono::NaiveDate;
use rollcall_core::Recognized;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("malformed ledger {path}: {reason}")]
    Format { path: PathBuf, reason: String },
    #[error("ledger lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ledger write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("ledger I/O: {0}")]
    Io(#[from] io::Error),
}

/// All attendance rows for one date, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    date: NaiveDate,
    entries: Vec<AttendanceEntry>,
}

impl Ledger {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn entries(&self) -> &[AttendanceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }
}

/// What a merge did.
#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub path: PathBuf,
    /// Names newly recorded by this merge.
    pub added: Vec<String>,
    /// Recognised names that were already in the ledger.
    pub already_present: Vec<String>,
    /// Row count of the ledger after the merge.
    pub total: usize,
    /// Whether the ledger file was (re)written.
    pub written: bool,
}

/// Directory holding one `attendance_<date>.csv` file per date.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    dir: PathBuf,
}

impl LedgerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(ledger_file_name(date))
    }

    /// Load the ledger for `date`, or `None` if no file exists yet.
    pub fn load(&self, date: NaiveDate) -> Result<Option<Ledger>, LedgerError> {
        read_ledger(&self.path_for(date), date)
    }

    /// Record `recognized` for the stamp's date.
    ///
    /// Each distinct name is added once (first occurrence wins) with the
    /// batch time. Names already present keep their existing row untouched.
    /// An existing file that fails validation aborts the merge before
    /// anything is written.
    pub fn merge(
        &self,
        recognized: &[Recognized],
        stamp: BatchStamp,
    ) -> Result<MergeSummary, LedgerError> {
        let mut candidates: Vec<AttendanceEntry> = Vec::new();
        for r in recognized {
            if !candidates.iter().any(|c| c.name == r.name) {
                candidates.push(AttendanceEntry {
                    name: r.name.clone(),
                    group: r.group.clone(),
                    date: stamp.date,
                    time: stamp.time,
                });
            }
        }

        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(stamp.date);
        let _lock = LedgerLock::acquire(&lock_path(&path))?;

        let (ledger, added, already_present) = match read_ledger(&path, stamp.date)? {
            Some(mut ledger) => {
                let (present, fresh): (Vec<_>, Vec<_>) =
                    candidates.into_iter().partition(|c| ledger.contains(&c.name));
                let added: Vec<String> = fresh.iter().map(|c| c.name.clone()).collect();
                let already: Vec<String> = present.into_iter().map(|c| c.name).collect();

                if fresh.is_empty() {
                    tracing::info!(path = %path.display(), rows = ledger.len(), "ledger already up to date");
                    return Ok(MergeSummary {
                        path,
                        added,
                        already_present: already,
                        total: ledger.len(),
                        written: false,
                    });
                }
                ledger.entries.extend(fresh);
                (ledger, added, already)
            }
            None => {
                let added = candidates.iter().map(|c| c.name.clone()).collect();
                let ledger = Ledger {
                    date: stamp.date,
                    entries: candidates,
                };
                (ledger, added, Vec::new())
            }
        };

        write_ledger(&path, &ledger)?;
        tracing::info!(
            path = %path.display(),
            added = added.len(),
            total = ledger.len(),
            "ledger written"
        );

        Ok(MergeSummary {
            path,
            added,
            already_present,
            total: ledger.len(),
            written: true,
        })
    }
}

fn lock_path(ledger_path: &Path) -> PathBuf {
    let mut name = ledger_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Exclusive advisory lock on a sidecar file, released on drop.
struct LedgerLock {
    _file: File,
}

impl LedgerLock {
    fn acquire(path: &Path) -> Result<Self, LedgerError> {
        let lock_err = |source| LedgerError::Lock {
            path: path.to_path_buf(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(lock_err)?;
        // Blocks until any other writer for this date has finished.
        fs2::FileExt::lock_exclusive(&file).map_err(lock_err)?;
        tracing::debug!(path = %path.display(), "ledger lock acquired");
        Ok(Self { _file: file })
    }
}

fn read_ledger(path: &Path, date: NaiveDate) -> Result<Option<Ledger>, LedgerError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let malformed = |reason: String| LedgerError::Format {
        path: path.to_path_buf(),
        reason,
    };
    let classify = |e: csv::Error, context: &str| {
        if e.is_io_error() {
            LedgerError::Csv(e)
        } else {
            malformed(format!("{context}: {e}"))
        }
    };

    let mut reader = csv::Reader::from_reader(file);
    let headers = reader.headers().map_err(|e| classify(e, "header"))?;
    if headers.iter().ne(HEADER.iter().copied()) {
        return Err(malformed(format!(
            "expected columns {}, found {}",
            HEADER.join(","),
            headers.iter().collect::<Vec<_>>().join(",")
        )));
    }

    let mut entries: Vec<AttendanceEntry> = Vec::new();
    let mut names: HashSet<String> = HashSet::new();
    for (i, row) in reader.deserialize::<AttendanceEntry>().enumerate() {
        let row_no = i + 1;
        let entry = row.map_err(|e| classify(e, &format!("row {row_no}")))?;
        if entry.date != date {
            return Err(malformed(format!(
                "row {row_no} is dated {}, file is for {date}",
                entry.date
            )));
        }
        if !names.insert(entry.name.clone()) {
            return Err(malformed(format!(
                "row {row_no} repeats name '{}'",
                entry.name
            )));
        }
        entries.push(entry);
    }

    tracing::debug!(path = %path.display(), rows = entries.len(), "ledger loaded");
    Ok(Some(Ledger { date, entries }))
}

/// Replace `path` with `ledger` via a synced temp file and rename.
fn write_ledger(path: &Path, ledger: &Ledger) -> Result<(), LedgerError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;

    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(tmp.as_file_mut());
        writer.write_record(HEADER)?;
        for entry in ledger.entries() {
            writer.serialize(entry)?;
        }
        writer.flush()?;
    }
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;

    tmp.persist(path).map_err(|e| LedgerError::Io(e.error))?;
    Ok(())
}

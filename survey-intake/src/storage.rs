//! Append-only JSON-lines store
//!
//! Each accepted record becomes exactly one newline-terminated JSON object at the end of the
//! store file. Appends are serialized by a process-wide lock, run on the blocking pool, and are
//! synced to disk before the caller is told they succeeded.
//!
//! The record is stamped while the lock is held, so stamps in the file never go backwards.
//! A write that fails part way, or whose caller has already given up, is rolled back to the
//! previous file length: an append either lands and is acknowledged, or leaves nothing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use survey_common::time;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Chunk size used when scanning backwards for the last complete line
const TAIL_SCAN_CHUNK: u64 = 4096;

/// Storage failures surfaced to the request that attempted the append
#[derive(Debug, Error)]
pub enum StorageError {
    /// Record could not be encoded as JSON (nothing was written)
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Filesystem error while opening, writing or syncing the store
    #[error("I/O error on store {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The append did not finish within the configured bound
    #[error("Append did not complete within {0:?}")]
    Timeout(Duration),

    /// A previous writer panicked while holding the store lock
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// The blocking append task was cancelled or panicked
    #[error("Append task failed: {0}")]
    Task(String),
}

/// Handle to the append-only submission store
///
/// Cheap to clone; all clones share one lock.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    path: PathBuf,
    append_timeout: Duration,
    writer: Mutex<WriterState>,
}

/// State owned by whoever holds the store lock
#[derive(Debug, Default)]
struct WriterState {
    /// Stamp of the last committed append
    last_stamp: Option<DateTime<Utc>>,
}

impl WriterState {
    /// Current time, never earlier than the last committed stamp
    fn next_stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.last_stamp {
            Some(last) if last > now => last,
            _ => now,
        }
    }
}

const PENDING: u8 = 0;
const COMMITTED: u8 = 1;
const ABANDONED: u8 = 2;

/// Outcome of one append, settled exactly once by either the writer or the waiting caller
#[derive(Debug)]
struct AppendTicket {
    state: AtomicU8,
}

impl AppendTicket {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
        }
    }

    /// Caller gives up; false if the writer already committed
    fn abandon(&self) -> bool {
        self.settle(ABANDONED)
    }

    /// Writer keeps its line; false if the caller already gave up
    fn commit(&self) -> bool {
        self.settle(COMMITTED)
    }

    fn is_abandoned(&self) -> bool {
        self.state.load(Ordering::SeqCst) == ABANDONED
    }

    fn settle(&self, outcome: u8) -> bool {
        self.state
            .compare_exchange(PENDING, outcome, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl JsonlStore {
    /// Open (creating if needed) the store file and its parent directory
    ///
    /// A trailing fragment without a newline, left by a crash mid-write, is removed. Such bytes
    /// were never acknowledged to any client.
    pub fn open(path: impl Into<PathBuf>, append_timeout: Duration) -> Result<Self, StorageError> {
        let path = path.into();
        let io_err = |source| StorageError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;

        let dropped = repair_torn_tail(&mut file).map_err(io_err)?;
        if dropped > 0 {
            warn!(
                path = %path.display(),
                bytes = dropped,
                "Removed incomplete trailing line from store"
            );
        }

        Ok(Self {
            inner: Arc::new(StoreInner {
                path,
                append_timeout,
                writer: Mutex::new(WriterState::default()),
            }),
        })
    }

    /// Store file location
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Configured bound on a single append
    pub fn append_timeout(&self) -> Duration {
        self.inner.append_timeout
    }

    /// Build a record from the append time and append it as a single JSON line
    ///
    /// `build` runs under the store lock with the current UTC time, never earlier than the
    /// previous append's. Returns the record only after its line is synced. On
    /// [`StorageError::Timeout`] nothing from this call remains in the store.
    pub async fn append_with<T, F>(&self, build: F) -> Result<T, StorageError>
    where
        T: Serialize + Send + 'static,
        F: FnOnce(DateTime<Utc>) -> T + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let ticket = Arc::new(AppendTicket::new());
        let writer_ticket = Arc::clone(&ticket);

        let mut task =
            tokio::task::spawn_blocking(move || inner.append_line(build, &writer_ticket));

        let outcome = tokio::time::timeout(self.inner.append_timeout, &mut task).await;
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(StorageError::Task(join_error.to_string())),
            Err(_) if ticket.abandon() => {
                error!(
                    path = %self.inner.path.display(),
                    timeout_ms = self.inner.append_timeout.as_millis() as u64,
                    "Store append timed out"
                );
                Err(StorageError::Timeout(self.inner.append_timeout))
            }
            // Committed as the deadline passed; the line is durable
            Err(_) => task
                .await
                .map_err(|join_error| StorageError::Task(join_error.to_string()))?,
        }
    }
}

impl StoreInner {
    fn append_line<T, F>(&self, build: F, ticket: &AppendTicket) -> Result<T, StorageError>
    where
        T: Serialize,
        F: FnOnce(DateTime<Utc>) -> T,
    {
        let mut writer = self.writer.lock().map_err(|_| StorageError::LockPoisoned)?;

        if ticket.is_abandoned() {
            debug!("Skipping append abandoned by caller");
            return Err(StorageError::Timeout(self.append_timeout));
        }

        let stamp = writer.next_stamp(time::now());
        let record = build(stamp);
        let line = encode_line(&record)?;

        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;

        let start_len = file.metadata().map_err(io_err)?.len();

        if let Err(e) = file.write_all(&line).and_then(|()| file.sync_data()) {
            self.roll_back(&file, start_len);
            return Err(io_err(e));
        }

        if !ticket.commit() {
            debug!("Rolling back append abandoned during write");
            self.roll_back(&file, start_len);
            return Err(StorageError::Timeout(self.append_timeout));
        }

        writer.last_stamp = Some(stamp);
        debug!(path = %self.path.display(), bytes = line.len(), "Appended record");
        Ok(record)
    }

    fn roll_back(&self, file: &File, len: u64) {
        if let Err(e) = file.set_len(len).and_then(|()| file.sync_data()) {
            error!(
                path = %self.path.display(),
                error = %e,
                "Failed to roll back append"
            );
        }
    }
}

/// Serialize a record to one newline-terminated JSON line
pub fn encode_line<T: Serialize>(record: &T) -> Result<Vec<u8>, StorageError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    Ok(line)
}

/// Truncate any bytes after the last newline; returns how many were dropped
fn repair_torn_tail(file: &mut File) -> std::io::Result<u64> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(0);
    }

    let mut end = len;
    let mut buf = vec![0u8; TAIL_SCAN_CHUNK as usize];
    let mut keep = 0;

    while end > 0 {
        let start = end.saturating_sub(TAIL_SCAN_CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;

        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            keep = start + pos as u64 + 1;
            break;
        }
        end = start;
    }

    if keep == len {
        return Ok(0);
    }

    file.set_len(keep)?;
    file.sync_data()?;
    Ok(len - keep)
}

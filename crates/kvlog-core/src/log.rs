//! Append-only transaction log
//!
//! The log has two phases:
//!
//! 1. **Replay**: before anything is written, [`TransactionLog::replay`]
//!    scans the file and yields every recorded event in order, failing fast
//!    on a malformed line or a sequence that does not strictly increase.
//! 2. **Live writes**: [`TransactionLog::run`] starts a single writer thread
//!    that drains a bounded intent queue, stamps each intent with the next
//!    sequence number and appends it to the file.
//!
//! [`TransactionLog::run`] first reads whatever replay left unread, so the
//! writer always numbers from the true end of the file. It refuses to start
//! if replay failed.
//!
//! Submissions are fire-and-forget. A failed append is reported once on the
//! error channel and stops the writer for good; later submissions are
//! dropped. The sequence counter resumes from whatever replay observed, so
//! numbering continues across restarts.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use tracing::{debug, error, info, trace, warn};

use crate::config::{Config, SyncPolicy};
use crate::error::{KvError, KvResult};
use crate::event::{Event, EventKind};
use crate::platform_durability::durable_sync;

/// Capacity of the error channel. The writer reports at most one failure.
const ERROR_CHANNEL_CAPACITY: usize = 1;

/// Room for the sequence, kind, separators, quotes and newline of a record.
const RECORD_OVERHEAD: u64 = 32;

/// Longest line replay will read for `config`.
///
/// A quoted value takes at most four bytes per input byte (`\xNN`).
fn max_record_len(config: &Config) -> u64 {
    config.max_key_size as u64 + 4 * config.max_value_size as u64 + RECORD_OVERHEAD
}

/// Durable, ordered record of every store mutation.
pub trait TransactionLog: Send + Sync {
    /// Queue a Put intent. Blocks only while the intent queue is full.
    fn write_put(&self, key: &str, value: &str);

    /// Queue a Delete intent. Blocks only while the intent queue is full.
    fn write_delete(&self, key: &str);

    /// Events recorded so far, oldest first. Stops after the first error.
    ///
    /// Call once, before [`run`](TransactionLog::run).
    fn replay(&mut self) -> Box<dyn Iterator<Item = KvResult<Event>> + '_>;

    /// Receiver for asynchronous writer failures.
    fn errors(&self) -> Receiver<KvError>;

    /// Start accepting live writes.
    ///
    /// Records replay has not yet yielded are read first; fails without
    /// starting if the log could not be replayed to the end.
    fn run(&mut self) -> KvResult<()>;

    /// Highest sequence number replayed or written.
    fn last_sequence(&self) -> u64;

    /// Drain queued intents, stop the writer and report its failure if any.
    fn close(&mut self) -> KvResult<()>;
}

/// A write waiting for its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WriteIntent {
    kind: EventKind,
    key: String,
    value: String,
}

impl WriteIntent {
    fn stamp(self, sequence: u64) -> Event {
        Event { sequence, kind: self.kind, key: self.key, value: self.value }
    }
}

/// How far replay has read the file.
enum ReplayState {
    NotStarted,
    Reading { reader: BufReader<File>, line: u64 },
    Complete,
    Failed(KvError),
}

/// Destination of encoded records on the writer thread.
trait RecordSink: Send {
    fn append(&mut self, record: &[u8]) -> std::io::Result<()>;
}

struct FileSink {
    file: File,
    sync_policy: SyncPolicy,
}

impl RecordSink for FileSink {
    fn append(&mut self, record: &[u8]) -> std::io::Result<()> {
        self.file.write_all(record)?;
        if self.sync_policy == SyncPolicy::EveryRecord {
            durable_sync(&self.file)?;
        }
        Ok(())
    }
}

/// File-backed [`TransactionLog`].
pub struct FileTransactionLog {
    /// Log file location (for reopening during replay and error context)
    path: PathBuf,
    /// Append handle; the writer thread gets a clone
    file: File,
    sync_policy: SyncPolicy,
    queue_capacity: usize,
    /// Shared with the writer thread, which advances it after each append
    last_sequence: Arc<AtomicU64>,
    /// Present while the writer is accepting intents
    intents: Option<Sender<WriteIntent>>,
    error_tx: Sender<KvError>,
    error_rx: Receiver<KvError>,
    writer: Option<thread::JoinHandle<Option<KvError>>>,
    replay: ReplayState,
    max_record_len: u64,
}

impl FileTransactionLog {
    /// Open or create the log file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, config: &Config) -> KvResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| KvError::io_at(&path, &e, "could not open transaction log file"))?;

        let (error_tx, error_rx) = channel::bounded(ERROR_CHANNEL_CAPACITY);

        Ok(Self {
            path,
            file,
            sync_policy: config.sync_policy,
            queue_capacity: config.queue_capacity,
            last_sequence: Arc::new(AtomicU64::new(0)),
            intents: None,
            error_tx,
            error_rx,
            writer: None,
            replay: ReplayState::NotStarted,
            max_record_len: max_record_len(config),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True while the writer thread is alive.
    pub fn is_running(&self) -> bool {
        self.writer.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Concrete replay iterator; [`TransactionLog::replay`] boxes this.
    ///
    /// A replay dropped early resumes where it stopped on the next call.
    /// Once the end of the file or an error is reached it yields nothing.
    pub fn replay_events(&mut self) -> Replay<'_> {
        let mut pending = None;
        if matches!(self.replay, ReplayState::NotStarted) {
            match File::open(&self.path) {
                Ok(file) => {
                    self.replay = ReplayState::Reading { reader: BufReader::new(file), line: 0 };
                }
                Err(e) => {
                    let err = KvError::io_at(&self.path, &e, "could not read transaction log file");
                    self.replay = ReplayState::Failed(err.clone());
                    pending = Some(err);
                }
            }
        } else if !matches!(self.replay, ReplayState::Reading { .. }) {
            warn!(path = %self.path.display(), "transaction log already replayed, nothing to yield");
        }

        Replay {
            path: &self.path,
            state: &mut self.replay,
            pending,
            max_record_len: self.max_record_len,
            last_sequence: &self.last_sequence,
        }
    }

    /// Read any records replay left behind so `last_sequence` is the file's.
    fn finish_replay(&mut self) -> KvResult<()> {
        match &self.replay {
            ReplayState::Complete => return Ok(()),
            ReplayState::Failed(err) => return Err(err.clone()),
            ReplayState::NotStarted | ReplayState::Reading { .. } => {}
        }

        let mut skipped = 0u64;
        for event in self.replay_events() {
            event?;
            skipped += 1;
        }
        if skipped > 0 {
            debug!(path = %self.path.display(), skipped, "read unreplayed records before starting writer");
        }
        Ok(())
    }

    fn submit(&self, intent: WriteIntent) {
        let Some(intents) = self.intents.as_ref() else {
            warn!(key = %intent.key, kind = ?intent.kind, "transaction log writer not running, intent dropped");
            return;
        };
        if intents.send(intent).is_err() {
            warn!("transaction log writer has stopped, intent dropped");
        }
    }

    fn start_writer(&mut self, sink: Box<dyn RecordSink>) -> KvResult<()> {
        if self.intents.is_some() {
            debug!(path = %self.path.display(), "transaction log writer already started");
            return Ok(());
        }
        if let Err(e) = self.finish_replay() {
            error!(error = %e, "transaction log not replayed cleanly, writer not started");
            return Err(e);
        }

        let (tx, rx) = channel::bounded(self.queue_capacity);
        let path = self.path.clone();
        let errors = self.error_tx.clone();
        let last_sequence = Arc::clone(&self.last_sequence);

        let handle = thread::Builder::new()
            .name("kvlog-writer".to_string())
            .spawn(move || writer_loop(sink, path, rx, errors, last_sequence))
            .map_err(|e| KvError::Io {
                path: Some(self.path.clone()),
                kind: std::io::ErrorKind::Other,
                message: format!("failed to spawn log writer thread: {}", e),
            })?;

        self.intents = Some(tx);
        self.writer = Some(handle);
        Ok(())
    }
}

impl TransactionLog for FileTransactionLog {
    fn write_put(&self, key: &str, value: &str) {
        self.submit(WriteIntent {
            kind: EventKind::Put,
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    fn write_delete(&self, key: &str) {
        self.submit(WriteIntent {
            kind: EventKind::Delete,
            key: key.to_string(),
            value: String::new(),
        });
    }

    fn replay(&mut self) -> Box<dyn Iterator<Item = KvResult<Event>> + '_> {
        Box::new(self.replay_events())
    }

    fn errors(&self) -> Receiver<KvError> {
        self.error_rx.clone()
    }

    fn run(&mut self) -> KvResult<()> {
        let file = self
            .file
            .try_clone()
            .map_err(|e| KvError::io_at(&self.path, &e, "could not clone transaction log handle"))?;
        let sink = FileSink { file, sync_policy: self.sync_policy };
        self.start_writer(Box::new(sink))
    }

    fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    fn close(&mut self) -> KvResult<()> {
        // Dropping the sender ends the writer's receive loop once it drains.
        self.intents = None;
        let Some(handle) = self.writer.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(None) => Ok(()),
            Ok(Some(failure)) => Err(failure),
            Err(_) => Err(KvError::Io {
                path: Some(self.path.clone()),
                kind: std::io::ErrorKind::Other,
                message: "log writer thread panicked".to_string(),
            }),
        }
    }
}

impl Drop for FileTransactionLog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "transaction log closed with a write failure");
        }
    }
}

/// Single writer: drains intents in order, one record per intent.
///
/// Returns the failure that stopped it, if any.
fn writer_loop(
    mut sink: Box<dyn RecordSink>,
    path: PathBuf,
    intents: Receiver<WriteIntent>,
    errors: Sender<KvError>,
    last_sequence: Arc<AtomicU64>,
) -> Option<KvError> {
    let mut sequence = last_sequence.load(Ordering::Acquire);
    info!(path = %path.display(), next_sequence = sequence + 1, "transaction log writer started");

    for intent in intents.iter() {
        sequence += 1;
        let event = intent.stamp(sequence);
        trace!(sequence, kind = ?event.kind, key = %event.key, "appending record");

        if let Err(e) = sink.append(event.encode().as_bytes()) {
            let failure = KvError::WriteFailure {
                path: path.clone(),
                sequence,
                kind: e.kind(),
                message: e.to_string(),
            };
            error!(error = %failure, "transaction log writer stopping");
            match errors.try_send(failure.clone()) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("error channel already holds an unread failure");
                }
            }
            return Some(failure);
        }
        last_sequence.store(sequence, Ordering::Release);
    }

    info!(path = %path.display(), last_sequence = sequence, "transaction log writer stopped");
    None
}

/// Lazy, fused iterator over the events in a log file.
///
/// Each yielded event has been checked against the running sequence; the
/// owning log's counter is advanced as events are yielded.
pub struct Replay<'a> {
    path: &'a Path,
    state: &'a mut ReplayState,
    /// Open failure reported on the first call to `next`
    pending: Option<KvError>,
    max_record_len: u64,
    last_sequence: &'a AtomicU64,
}

impl Replay<'_> {
    fn decode(&self, raw: &[u8], line: u64) -> KvResult<Event> {
        if raw.len() as u64 > self.max_record_len {
            return Err(self.malformed(line, format!("record exceeds {} bytes", self.max_record_len)));
        }
        let text =
            std::str::from_utf8(raw).map_err(|e| self.malformed(line, format!("invalid UTF-8: {}", e)))?;
        let event = Event::parse(text).map_err(|reason| self.malformed(line, reason))?;

        let last = self.last_sequence.load(Ordering::Acquire);
        if last >= event.sequence {
            return Err(KvError::OutOfOrderSequence {
                path: self.path.to_path_buf(),
                line,
                last,
                found: event.sequence,
            });
        }
        self.last_sequence.store(event.sequence, Ordering::Release);
        Ok(event)
    }

    fn malformed(&self, line: u64, reason: String) -> KvError {
        KvError::MalformedRecord { path: self.path.to_path_buf(), line, reason }
    }

    fn fail(&mut self, err: KvError) -> KvError {
        error!(error = %err, "transaction log replay aborted");
        *self.state = ReplayState::Failed(err.clone());
        err
    }
}

impl Iterator for Replay<'_> {
    type Item = KvResult<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            return Some(Err(err));
        }
        let ReplayState::Reading { reader, line } = &mut *self.state else {
            return None;
        };

        // One byte past the limit is enough to tell an oversized record apart.
        let mut raw = Vec::new();
        let read = reader.by_ref().take(self.max_record_len + 1).read_until(b'\n', &mut raw);
        let line = match read {
            Ok(0) => {
                debug!(path = %self.path.display(), records = *line, "transaction log replay finished");
                *self.state = ReplayState::Complete;
                return None;
            }
            Ok(_) => {
                *line += 1;
                *line
            }
            Err(e) => {
                let err = KvError::io_at(self.path, &e, "failed reading transaction log");
                return Some(Err(self.fail(err)));
            }
        };

        match self.decode(&raw, line) {
            Ok(event) => {
                trace!(sequence = event.sequence, kind = ?event.kind, key = %event.key, "replayed record");
                Some(Ok(event))
            }
            Err(e) => Some(Err(self.fail(e))),
        }
    }
}

impl std::iter::FusedIterator for Replay<'_> {}

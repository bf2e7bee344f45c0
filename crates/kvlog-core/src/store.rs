//! Key-value store: a concurrent map mirrored to a transaction log.
//!
//! **Read path**: map only, under the shared lock. The log is never touched.
//! **Write path**: map update and log submission under the exclusive lock,
//! so the log sees mutations of any one key in the order the map applied
//! them. Persistence happens later on the log's writer thread; a reader can
//! observe a value before it is on disk.
//! **Startup**: replay the whole log into the map, then start live writes.

use std::path::Path;

use crossbeam::channel::Receiver;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{KvError, KvResult};
use crate::event::{key_violation, Event, EventKind};
use crate::log::{FileTransactionLog, TransactionLog};
use crate::map::ConcurrentMap;

/// In-process key-value store with transaction-log durability.
///
/// All operations take `&self`; share it behind an `Arc` across threads.
pub struct Store<L: TransactionLog = FileTransactionLog> {
    map: ConcurrentMap<String, String>,
    log: L,
    config: Config,
}

impl Store<FileTransactionLog> {
    /// Open or create the log at `path` and recover the store from it.
    pub fn open<P: AsRef<Path>>(path: P, config: Config) -> KvResult<Self> {
        config.validate()?;
        info!(path = %path.as_ref().display(), "initializing store from transaction log");
        let log = FileTransactionLog::open(path, &config)?;
        Self::initialize(log, config)
    }

    /// Location of the transaction log.
    pub fn path(&self) -> &Path {
        self.log.path()
    }

    /// False once the log writer has stopped after a failure.
    pub fn is_log_writer_running(&self) -> bool {
        self.log.is_running()
    }
}

impl<L: TransactionLog> Store<L> {
    /// Replay `log` into a fresh map, then start its writer.
    ///
    /// The first replay error aborts initialisation; the writer is never
    /// started on a log that failed to recover.
    pub fn initialize(mut log: L, config: Config) -> KvResult<Self> {
        config.validate()?;
        let map = ConcurrentMap::new();

        let mut replayed = 0u64;
        for event in log.replay() {
            apply(&map, event?);
            replayed += 1;
        }

        log.run()?;
        info!(
            events = replayed,
            keys = map.len(),
            last_sequence = log.last_sequence(),
            "store recovered, transaction log accepting writes"
        );

        Ok(Self { map, log, config })
    }

    /// Value for `key`, or [`KvError::NotFound`].
    pub fn get(&self, key: &str) -> KvResult<String> {
        self.map
            .get(key)
            .ok_or_else(|| KvError::NotFound { key: key.to_string() })
    }

    /// Insert or overwrite `key`.
    ///
    /// Rejected keys and values leave both the map and the log untouched.
    /// Log write failures are reported on [`errors`](Store::errors), not here.
    pub fn put(&self, key: &str, value: &str) -> KvResult<()> {
        self.check_key(key)?;
        if value.len() > self.config.max_value_size {
            return Err(KvError::OversizedEntry {
                component: "value".to_string(),
                entry_size: value.len() as u64,
                max_size: self.config.max_value_size as u64,
            });
        }

        let mut map = self.map.write();
        map.insert(key.to_string(), value.to_string());
        self.log.write_put(key, value);
        Ok(())
    }

    /// Remove `key`. Deleting an absent key succeeds and is still logged.
    pub fn delete(&self, key: &str) -> KvResult<()> {
        self.check_key(key)?;

        let mut map = self.map.write();
        if map.remove(key).is_none() {
            debug!(key, "delete of absent key");
        }
        self.log.write_delete(key);
        Ok(())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Asynchronous log writer failures. Once one arrives, later mutations
    /// are no longer persisted.
    pub fn errors(&self) -> Receiver<KvError> {
        self.log.errors()
    }

    /// Highest sequence number recovered or written so far.
    pub fn last_sequence(&self) -> u64 {
        self.log.last_sequence()
    }

    /// Wait for every queued mutation to reach the log, then stop the writer.
    pub fn close(mut self) -> KvResult<()> {
        self.log.close()
    }

    fn check_key(&self, key: &str) -> KvResult<()> {
        if let Some(reason) = key_violation(key) {
            return Err(KvError::InvalidKey { reason: reason.to_string() });
        }
        if key.len() > self.config.max_key_size {
            return Err(KvError::OversizedEntry {
                component: "key".to_string(),
                entry_size: key.len() as u64,
                max_size: self.config.max_key_size as u64,
            });
        }
        Ok(())
    }
}

/// Apply one replayed event directly to the map, bypassing the log.
fn apply(map: &ConcurrentMap<String, String>, event: Event) {
    match event.kind {
        EventKind::Put => map.set(event.key, event.value),
        EventKind::Delete => {
            map.delete(&event.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::{self, Sender};
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// In-memory log double: replays a fixed script and records submissions.
    struct ScriptedLog {
        script: Vec<KvResult<Event>>,
        submitted: Arc<Mutex<Vec<(EventKind, String, String)>>>,
        running: Arc<AtomicBool>,
        fail_writes: bool,
        error_tx: Sender<KvError>,
        error_rx: Receiver<KvError>,
    }

    impl ScriptedLog {
        fn new(script: Vec<KvResult<Event>>) -> Self {
            let (error_tx, error_rx) = channel::bounded(1);
            Self {
                script,
                submitted: Arc::new(Mutex::new(Vec::new())),
                running: Arc::new(AtomicBool::new(false)),
                fail_writes: false,
                error_tx,
                error_rx,
            }
        }

        fn record(&self, kind: EventKind, key: &str, value: &str) {
            if self.fail_writes {
                let _ = self.error_tx.try_send(KvError::WriteFailure {
                    path: PathBuf::from("scripted"),
                    sequence: 1,
                    kind: std::io::ErrorKind::Other,
                    message: "scripted failure".into(),
                });
                return;
            }
            self.submitted.lock().push((kind, key.to_string(), value.to_string()));
        }
    }

    impl TransactionLog for ScriptedLog {
        fn write_put(&self, key: &str, value: &str) {
            self.record(EventKind::Put, key, value);
        }
        fn write_delete(&self, key: &str) {
            self.record(EventKind::Delete, key, "");
        }
        fn replay(&mut self) -> Box<dyn Iterator<Item = KvResult<Event>> + '_> {
            Box::new(std::mem::take(&mut self.script).into_iter())
        }
        fn errors(&self) -> Receiver<KvError> {
            self.error_rx.clone()
        }
        fn run(&mut self) -> KvResult<()> {
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn last_sequence(&self) -> u64 {
            0
        }
        fn close(&mut self) -> KvResult<()> {
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("transaction.log"), Config::default()).unwrap();
        (store, dir)
    }

    #[test]
    fn test_open_empty() {
        let (store, _dir) = test_store();
        assert!(store.is_empty());
        assert_eq!(store.last_sequence(), 0);
        assert!(store.is_log_writer_running());
        assert!(store.get("a").unwrap_err().is_not_found());
    }

    #[test]
    fn test_put_get_overwrite() {
        let (store, _dir) = test_store();
        store.put("k", "v1").unwrap();
        assert_eq!(store.get("k").unwrap(), "v1");
        store.put("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap(), "v2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete_and_idempotent_delete() {
        let (store, _dir) = test_store();
        store.put("k", "v").unwrap();
        store.delete("k").unwrap();
        assert!(!store.contains_key("k"));
        store.delete("k").unwrap();
        store.delete("never-existed").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_empty_value_is_a_value() {
        let (store, _dir) = test_store();
        store.put("blank", "").unwrap();
        assert_eq!(store.get("blank").unwrap(), "");
    }

    #[test]
    fn test_invalid_key_rejected_without_mutation() {
        let log = ScriptedLog::new(vec![]);
        let submitted = Arc::clone(&log.submitted);
        let store = Store::initialize(log, Config::default()).unwrap();

        let err = store.put("bad\tkey", "v").unwrap_err();
        assert!(matches!(err, KvError::InvalidKey { .. }));
        assert!(matches!(store.delete("bad\nkey"), Err(KvError::InvalidKey { .. })));
        assert!(store.is_empty());
        assert!(submitted.lock().is_empty());
    }

    #[test]
    fn test_oversized_entries_rejected() {
        let mut config = Config::default();
        config.max_key_size = 4;
        config.max_value_size = 8;
        let store = Store::initialize(ScriptedLog::new(vec![]), config).unwrap();

        assert!(matches!(
            store.put("toolong", "v"),
            Err(KvError::OversizedEntry { component, .. }) if component == "key"
        ));
        assert!(matches!(
            store.put("k", "123456789"),
            Err(KvError::OversizedEntry { component, .. }) if component == "value"
        ));
        store.put("k", "12345678").unwrap();
    }

    #[test]
    fn test_initialize_applies_script_in_order() {
        let log = ScriptedLog::new(vec![
            Ok(Event::put(1, "a", "1")),
            Ok(Event::put(2, "b", "2")),
            Ok(Event::put(3, "a", "3")),
            Ok(Event::delete(4, "b")),
        ]);
        let running = Arc::clone(&log.running);
        let store = Store::initialize(log, Config::default()).unwrap();

        assert!(running.load(Ordering::SeqCst));
        assert_eq!(store.get("a").unwrap(), "3");
        assert!(store.get("b").unwrap_err().is_not_found());
    }

    #[test]
    fn test_apply_replayed_events() {
        let map = ConcurrentMap::new();
        apply(&map, Event::put(1, "a", "1"));
        apply(&map, Event::put(2, "a", "2"));
        apply(&map, Event::delete(3, "missing"));
        assert_eq!(map.get("a"), Some("2".to_string()));

        apply(&map, Event::delete(4, "a"));
        assert!(map.is_empty());
    }

    #[test]
    fn test_initialize_aborts_on_replay_error() {
        let log = ScriptedLog::new(vec![
            Ok(Event::put(1, "a", "1")),
            Err(KvError::MalformedRecord {
                path: PathBuf::from("scripted"),
                line: 2,
                reason: "bad".into(),
            }),
            Ok(Event::put(3, "c", "3")),
        ]);
        let running = Arc::clone(&log.running);

        let err = Store::initialize(log, Config::default()).err().unwrap();
        assert!(err.is_corruption());
        assert!(!running.load(Ordering::SeqCst), "writer must not start after a failed replay");
    }

    #[test]
    fn test_initialize_rejects_invalid_config() {
        let mut config = Config::default();
        config.queue_capacity = 0;
        let log = ScriptedLog::new(vec![]);
        let running = Arc::clone(&log.running);

        assert!(matches!(Store::initialize(log, config), Err(KvError::InvalidConfig(_))));
        assert!(!running.load(Ordering::SeqCst));
    }

    #[test]
    fn test_mutations_submitted_in_map_order() {
        let log = ScriptedLog::new(vec![]);
        let submitted = Arc::clone(&log.submitted);
        let store = Store::initialize(log, Config::default()).unwrap();

        store.put("a", "1").unwrap();
        store.delete("a").unwrap();
        store.put("b", "2").unwrap();

        assert_eq!(
            *submitted.lock(),
            vec![
                (EventKind::Put, "a".to_string(), "1".to_string()),
                (EventKind::Delete, "a".to_string(), String::new()),
                (EventKind::Put, "b".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_get_never_touches_log() {
        let log = ScriptedLog::new(vec![Ok(Event::put(1, "a", "1"))]);
        let submitted = Arc::clone(&log.submitted);
        let store = Store::initialize(log, Config::default()).unwrap();

        for _ in 0..10 {
            store.get("a").unwrap();
            let _ = store.get("missing");
        }
        assert!(submitted.lock().is_empty());
    }

    #[test]
    fn test_write_failure_is_asynchronous() {
        let mut log = ScriptedLog::new(vec![]);
        log.fail_writes = true;
        let store = Store::initialize(log, Config::default()).unwrap();
        let errors = store.errors();

        // Put itself succeeds and the map keeps serving the value.
        store.put("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), "v");
        assert!(matches!(errors.try_recv(), Ok(KvError::WriteFailure { .. })));
    }

    #[test]
    fn test_close_flushes_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("transaction.log");
        let store = Store::open(&path, Config::default()).unwrap();
        store.put("x", "y").unwrap();
        store.close().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\t1\tx\t\"y\"\n");
    }
}

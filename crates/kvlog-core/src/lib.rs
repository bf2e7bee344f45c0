//! kvlog Core — In-Process Key-Value Store with a Transaction Log
//!
//! A concurrent in-memory map whose every mutation is mirrored to an
//! append-only, human-readable transaction log. Restarting replays the log
//! in full, so state survives process restarts.
//!
//! # Architecture
//!
//! - **Read path**: serve from the map under a shared lock; the log is not involved
//! - **Write path**: update the map under the exclusive lock, queue an intent for the log
//! - **Log writer**: one background thread stamps sequence numbers and appends records
//! - **Recovery**: replay every record into the map before accepting writes
//!
//! # Log format
//!
//! One record per line: `sequence\tkind\tkey\t"quoted value"`. See [`event`].
//!
//! ```no_run
//! use kvlog_core::{Config, Store};
//!
//! let store = Store::open("transaction.log", Config::default())?;
//! store.put("greeting", "hello")?;
//! assert_eq!(store.get("greeting")?, "hello");
//! store.close()?;
//! # Ok::<(), kvlog_core::KvError>(())
//! ```

pub mod config;
pub mod error;
pub mod escape;
pub mod event;
pub mod log;
pub mod map;
pub mod platform_durability;
pub mod store;

// Re-export key types for convenience
pub use config::{Config, SyncPolicy};
pub use error::{KvError, KvResult};
pub use event::{Event, EventKind};
pub use log::{FileTransactionLog, Replay, TransactionLog};
pub use map::ConcurrentMap;
pub use store::Store;

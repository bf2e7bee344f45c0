//! Configuration for kvlog stores
//!
//! Two presets cover the usual trade-off between write throughput and
//! durability, and the fields can be tuned individually afterwards.

use crate::error::{KvError, KvResult};

/// When the log writer forces appended records to persistent storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Append only; the OS decides when pages reach the disk.
    OsBuffered,
    /// Call `durable_sync` after every appended record.
    EveryRecord,
}

/// kvlog configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of the bounded intent queue feeding the log writer
    pub queue_capacity: usize,
    /// Sync behaviour of the log writer
    pub sync_policy: SyncPolicy,
    /// Maximum key size in bytes
    pub max_key_size: usize,
    /// Maximum value size in bytes
    pub max_value_size: usize,
}

impl Config {
    /// Plain appends, small queue. Matches the throughput-first write path.
    pub fn fast() -> Self {
        Self {
            queue_capacity: 16,
            sync_policy: SyncPolicy::OsBuffered,
            max_key_size: 1024,
            max_value_size: 32 * 1024 * 1024,
        }
    }

    /// Every record is synced before the writer takes the next intent.
    pub fn durable() -> Self {
        Self {
            sync_policy: SyncPolicy::EveryRecord,
            ..Self::fast()
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> KvResult<()> {
        if self.queue_capacity == 0 {
            return Err(KvError::InvalidConfig("queue_capacity must be > 0".into()));
        }
        if self.max_key_size == 0 || self.max_key_size > 64 * 1024 {
            return Err(KvError::InvalidConfig("max_key_size must be in [1, 64KB]".into()));
        }
        if self.max_value_size > 128 * 1024 * 1024 {
            return Err(KvError::InvalidConfig("max_value_size must be <= 128MB".into()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self { Self::fast() }
}

//! Completion tracking and checkpoint persistence.
//!
//! The publisher signals every accepted event's completion through a
//! [`CompletionSink`]. Completions arrive out of order, so
//! [`InflightPositions`] keeps submitted positions in order and only
//! advances the safe position past a prefix of completed events. The
//! [`CheckpointManager`] persists that position so replication can resume
//! after a restart.
//!
//! # Example
//!
//! ```rust,no_run
//! use cdc_publisher::checkpoint::{Checkpoint, CheckpointManager};
//! use cdc_publisher::event::Position;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = CheckpointManager::new("checkpoint.json");
//!
//!     if let Some(checkpoint) = manager.load().await? {
//!         println!("Resuming after {}", checkpoint.position);
//!     }
//!
//!     let checkpoint = Checkpoint::new(Position::new("mysql-bin.000003", 4), 100);
//!     manager.save(&checkpoint).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::event::Position;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Receives completion signals from the publisher.
pub trait CompletionSink: Send + Sync {
    /// Called by the worker, in submission order, just before an event is
    /// handed to the broker.
    fn submitted(&self, _position: &Position) {}

    /// Called once the event's fate is settled. May run on any thread and in
    /// any order relative to other events.
    fn completed(&self, position: &Position);
}

/// One-shot completion signal for a single event.
///
/// `mark_completed` consumes the completer, so an event can be completed at
/// most once. Dropping it without marking leaves the event pending.
pub struct Completer {
    sink: Arc<dyn CompletionSink>,
    position: Position,
}

impl Completer {
    pub fn new(sink: Arc<dyn CompletionSink>, position: Position) -> Self {
        Self { sink, position }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn mark_completed(self) {
        self.sink.completed(&self.position);
    }
}

impl std::fmt::Debug for Completer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completer")
            .field("position", &self.position)
            .finish()
    }
}

#[derive(Debug, Default)]
struct Inflight {
    pending: VecDeque<(Position, bool)>,
    safe: Option<Position>,
    completed: u64,
}

/// Tracks in-flight events and the newest position whose predecessors have
/// all completed.
#[derive(Debug, Default)]
pub struct InflightPositions {
    inner: Mutex<Inflight>,
}

impl InflightPositions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking from an already persisted position.
    pub fn resume_from(position: Position) -> Self {
        Self {
            inner: Mutex::new(Inflight {
                safe: Some(position),
                ..Default::default()
            }),
        }
    }

    /// Newest position that is safe to persist.
    pub fn safe_position(&self) -> Option<Position> {
        self.lock().safe.clone()
    }

    pub fn inflight(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn completed_count(&self) -> u64 {
        self.lock().completed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inflight> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CompletionSink for InflightPositions {
    fn submitted(&self, position: &Position) {
        self.lock().pending.push_back((position.clone(), false));
    }

    fn completed(&self, position: &Position) {
        let mut guard = self.lock();
        let Inflight {
            pending,
            safe,
            completed,
        } = &mut *guard;
        *completed += 1;

        match pending.iter_mut().find(|(p, done)| !*done && p == position) {
            Some(entry) => entry.1 = true,
            None => {
                warn!("Completion for untracked position {}", position);
                return;
            }
        }

        // A position is safe only once every event sharing it has completed.
        while pending.front().is_some_and(|(_, done)| *done) {
            let Some((popped, _)) = pending.pop_front() else {
                break;
            };
            if pending.front().map_or(true, |(next, _)| *next != popped) {
                *safe = Some(popped);
            }
        }
    }
}

/// A persisted position in the replication stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Newest position whose events, and all before it, are settled
    pub position: Position,
    /// The timestamp when this checkpoint was created
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Number of events completed since startup
    pub message_count: u64,
}

impl Checkpoint {
    /// Creates a new checkpoint with the current timestamp.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cdc_publisher::checkpoint::Checkpoint;
    /// use cdc_publisher::event::Position;
    ///
    /// let checkpoint = Checkpoint::new(Position::new("mysql-bin.000003", 4), 100);
    /// assert_eq!(checkpoint.position.offset, 4);
    /// assert_eq!(checkpoint.message_count, 100);
    /// ```
    pub fn new(position: Position, message_count: u64) -> Self {
        Self {
            position,
            timestamp: chrono::Utc::now(),
            message_count,
        }
    }
}

/// Manages checkpoint persistence to disk.
///
/// Writes go to a temporary file that is synced and then renamed over the
/// checkpoint, so a crash never leaves a partially written checkpoint.
pub struct CheckpointManager {
    file_path: PathBuf,
}

impl CheckpointManager {
    pub fn new(checkpoint_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: checkpoint_path.as_ref().to_path_buf(),
        }
    }

    /// Loads the checkpoint, `None` on first run.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file exists but cannot be read or parsed.
    pub async fn load(&self) -> Result<Option<Checkpoint>> {
        if !self.file_path.exists() {
            debug!("No checkpoint file found at {:?}", self.file_path);
            return Ok(None);
        }

        match fs::read_to_string(&self.file_path).await {
            Ok(content) => match serde_json::from_str::<Checkpoint>(&content) {
                Ok(checkpoint) => {
                    info!(
                        "Loaded checkpoint: position={}, timestamp={}",
                        checkpoint.position, checkpoint.timestamp
                    );
                    Ok(Some(checkpoint))
                }
                Err(e) => {
                    error!("Failed to parse checkpoint file: {}", e);
                    Err(Error::Config(format!("Invalid checkpoint file: {}", e)))
                }
            },
            Err(e) => {
                error!("Failed to read checkpoint file: {}", e);
                Err(Error::Io(e))
            }
        }
    }

    /// Saves the checkpoint atomically.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        debug!("Saving checkpoint: position={}", checkpoint.position);

        let temp_path = self.file_path.with_extension("tmp");

        let json = serde_json::to_string_pretty(checkpoint)?;
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.file_path).await?;

        debug!("Checkpoint saved successfully");
        Ok(())
    }

    /// Deletes the checkpoint file if it exists, resetting replication to the start.
    pub async fn delete(&self) -> Result<()> {
        if self.file_path.exists() {
            fs::remove_file(&self.file_path).await?;
            info!("Deleted checkpoint file");
        }
        Ok(())
    }
}

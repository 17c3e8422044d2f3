//! Worker lifecycle and the process-termination hook.
//!
//! A worker moves through `Created -> Running -> StopRequested -> Stopped`,
//! or straight from `Running` to `Stopped` when it fails. The state lives in
//! a [`tokio::sync::watch`] channel so any number of callers can wait for a
//! transition.

use crate::{Error, Result};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    Running,
    StopRequested,
    Stopped,
}

/// Shared view of one task's lifecycle.
#[derive(Debug)]
pub struct TaskStateHandle {
    name: String,
    state: watch::Sender<TaskState>,
}

impl TaskStateHandle {
    pub fn new(name: impl Into<String>) -> Self {
        let (state, _) = watch::channel(TaskState::Created);
        Self {
            name: name.into(),
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> TaskState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.get() == TaskState::Running
    }

    /// `Created -> Running`. A stop requested before the task started is kept.
    pub fn started(&self) {
        self.state.send_if_modified(|state| {
            if *state == TaskState::Created {
                *state = TaskState::Running;
                true
            } else {
                false
            }
        });
    }

    /// Returns `false` if the task had already stopped.
    pub fn request_stop(&self) -> bool {
        let requested = self.state.send_if_modified(|state| match state {
            TaskState::Created | TaskState::Running => {
                *state = TaskState::StopRequested;
                true
            }
            _ => false,
        });
        if requested {
            info!("{}: stop requested", self.name);
        }
        self.get() != TaskState::Stopped
    }

    pub fn stopped(&self) {
        self.state.send_replace(TaskState::Stopped);
        debug!("{}: stopped", self.name);
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.state.subscribe()
    }

    /// Waits until the task reports `Stopped`, at most `timeout`.
    pub async fn await_stopped(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.subscribe();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|s| *s == TaskState::Stopped))
            .await
            .map(|_| ());
        match waited {
            Ok(_) => Ok(()),
            Err(_) => Err(Error::Timeout {
                message: format!("{} did not stop within {:?}", self.name, timeout),
            }),
        }
    }
}

/// Marks the task stopped when dropped, so a panicking task still unblocks
/// anyone waiting on it.
pub(crate) struct StoppedGuard<'a>(pub(crate) &'a TaskStateHandle);

impl Drop for StoppedGuard<'_> {
    fn drop(&mut self) {
        self.0.stopped();
    }
}

/// Whole-pipeline escalation for unrecoverable errors.
///
/// Implementations must stop the entire process, not just the publisher,
/// and make it exit non-zero.
pub trait Terminator: Send + Sync {
    fn terminate(&self, cause: Error);
}

/// Terminator that records the first fatal cause and wakes whoever is
/// supervising the process.
#[derive(Debug)]
pub struct ShutdownTerminator {
    cause: Mutex<Option<Error>>,
    fired: watch::Sender<bool>,
}

impl ShutdownTerminator {
    pub fn new() -> Self {
        let (fired, _) = watch::channel(false);
        Self {
            cause: Mutex::new(None),
            fired,
        }
    }

    pub fn is_terminated(&self) -> bool {
        *self.fired.borrow()
    }

    /// Resolves once [`Terminator::terminate`] has been called.
    pub async fn terminated(&self) {
        let mut rx = self.fired.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// The first cause passed to `terminate`, if any.
    pub fn take_cause(&self) -> Option<Error> {
        self.cause
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }
}

impl Default for ShutdownTerminator {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminator for ShutdownTerminator {
    fn terminate(&self, cause: Error) {
        error!("Fatal error, terminating: {}", cause);
        let mut slot = self
            .cause
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(cause);
        }
        drop(slot);
        self.fired.send_replace(true);
    }
}

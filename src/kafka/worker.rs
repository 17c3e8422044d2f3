use crate::checkpoint::{Completer, CompletionSink};
use crate::event::{ChangeEvent, Position};
use crate::kafka::broker::DeliveryCallback;
use crate::kafka::completion::{CompletionContext, CompletionHandler, PublishContext};
use crate::lifecycle::{StoppedGuard, TaskState, TaskStateHandle};
use crate::{Error, Result, SendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn, Level};

/// Pause before resubmitting a record the local producer queue had no room for.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(10);

/// Progress visible to diagnostics while the worker runs.
#[derive(Debug, Default)]
pub struct WorkerStatus {
    last_position: Mutex<Option<Position>>,
}

impl WorkerStatus {
    pub fn last_position(&self) -> Option<Position> {
        self.last_position
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_last_position(&self, position: Position) {
        *self
            .last_position
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(position);
    }
}

/// Drains the publishing queue into the broker client.
///
/// Records are submitted in queue order without waiting for their outcome.
/// After a stop request the worker submits whatever is still queued, closes
/// the broker client and reports `Stopped`.
pub struct Worker {
    queue: mpsc::Receiver<ChangeEvent>,
    publish: Arc<PublishContext>,
    completions: Arc<dyn CompletionSink>,
    state: Arc<TaskStateHandle>,
    status: Arc<WorkerStatus>,
}

impl Worker {
    pub fn new(
        queue: mpsc::Receiver<ChangeEvent>,
        publish: Arc<PublishContext>,
        completions: Arc<dyn CompletionSink>,
        state: Arc<TaskStateHandle>,
        status: Arc<WorkerStatus>,
    ) -> Self {
        Self {
            queue,
            publish,
            completions,
            state,
            status,
        }
    }

    pub async fn run(mut self) {
        let state = self.state.clone();
        let _stopped = StoppedGuard(&state);
        let mut state_rx = state.subscribe();
        state.started();
        info!("{} started", state.name());

        if let Err(e) = self.dequeue_loop(&mut state_rx).await {
            error!("{} failed: {}", state.name(), e);
            self.publish.terminator.terminate(e);
        }
        self.queue.close();

        let client = self.publish.client.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || client.close()).await {
            warn!("Closing the broker client failed: {}", e);
        }
        info!("{} stopped", state.name());
    }

    async fn dequeue_loop(&mut self, state_rx: &mut watch::Receiver<TaskState>) -> Result<()> {
        loop {
            let event = if self.state.get() == TaskState::StopRequested {
                match self.queue.try_recv() {
                    Ok(event) => event,
                    Err(_) => {
                        debug!("Queue drained after stop request");
                        return Ok(());
                    }
                }
            } else {
                tokio::select! {
                    event = self.queue.recv() => match event {
                        Some(event) => event,
                        None => return Err(Error::QueueInterrupted),
                    },
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            return Err(Error::QueueInterrupted);
                        }
                        continue;
                    }
                }
            };

            self.publish_event(event).await?;
        }
    }

    async fn publish_event(&self, event: ChangeEvent) -> Result<()> {
        let publish = &self.publish;
        let mut record = publish.builder.build(&event, publish.client.as_ref())?;

        let position = event.position().clone();
        // Holding on to the value is only worth it when it will be logged.
        let value = tracing::enabled!(Level::DEBUG).then(|| record.value.clone());
        let context = CompletionContext::new(
            position.clone(),
            event.identity().clone(),
            record.key.clone(),
            value,
            publish.clone(),
        );
        let completer = Completer::new(self.completions.clone(), position.clone());
        let mut callback: Box<dyn DeliveryCallback> =
            Box::new(CompletionHandler::new(context, completer));

        self.completions.submitted(&position);
        self.status.set_last_position(position.clone());

        loop {
            match publish.client.send(record, callback) {
                Ok(()) => return Ok(()),
                Err(rejected) if rejected.error.is_queue_full() => {
                    debug!("Producer queue full, retrying in {:?}", QUEUE_FULL_BACKOFF);
                    record = rejected.record;
                    callback = rejected.callback;
                    tokio::time::sleep(QUEUE_FULL_BACKOFF).await;
                }
                // The producer was closed under a pending stop. The event stays
                // unacknowledged so the checkpoint never passes it.
                Err(rejected)
                    if matches!(rejected.error, SendError::Closed)
                        && self.state.get() != TaskState::Running =>
                {
                    warn!(
                        "Producer closed during shutdown, abandoning event at {}",
                        position
                    );
                    return Ok(());
                }
                Err(rejected) => {
                    rejected.fail();
                    return Ok(());
                }
            }
        }
    }
}

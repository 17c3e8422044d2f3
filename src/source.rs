//! Newline-delimited JSON change events, as written by a replication reader.
//!
//! Each non-blank line holds one serialized [`ChangeEvent`]. When resuming
//! from a checkpoint, events at or before the checkpointed position are
//! skipped.

use crate::event::{ChangeEvent, Position};
use crate::{Error, Result};
use tokio::io::AsyncBufRead;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

pub struct JsonLinesSource<R> {
    lines: LinesStream<R>,
    resume_after: Option<Position>,
    line_number: u64,
    skipped: u64,
}

impl<R: AsyncBufRead + Unpin> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: LinesStream::new(tokio::io::AsyncBufReadExt::lines(reader)),
            resume_after: None,
            line_number: 0,
            skipped: 0,
        }
    }

    /// Skips every event up to and including `position`.
    pub fn resume_after(mut self, position: Option<Position>) -> Self {
        self.resume_after = position;
        self
    }

    /// Events skipped so far because they were already checkpointed.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// The next event, or `None` at end of input.
    pub async fn next_event(&mut self) -> Result<Option<ChangeEvent>> {
        while let Some(line) = self.lines.next().await {
            let line = line?;
            self.line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            let event: ChangeEvent =
                serde_json::from_str(&line).map_err(|e| Error::InvalidEvent {
                    message: format!("line {}: {}", self.line_number, e),
                })?;

            if self
                .resume_after
                .as_ref()
                .is_some_and(|checkpoint| event.position() <= checkpoint)
            {
                trace!(position = %event.position(), "Skipping checkpointed event");
                self.skipped += 1;
                continue;
            }

            return Ok(Some(event));
        }

        debug!(lines = self.line_number, skipped = self.skipped, "End of input");
        Ok(None)
    }
}

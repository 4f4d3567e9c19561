//! Consumer side of the pipeline.
//!
//! Every event is dispatched to the recorder here. Failures are logged and
//! counted, and never stop the loop.

use crate::collector::types::InputEvent;
use crate::core::recorder::{Outcome, SessionRecorder};
use crate::queue::EventQueue;
use crate::store::{InsertOutcome, SessionStore};
use crate::transparency::TransparencyLog;
use std::io::BufRead;
use thiserror::Error;
use tracing::{debug, warn};

/// Hand one event to the recorder and account for the result.
pub fn dispatch<S: SessionStore>(
    recorder: &mut SessionRecorder<S>,
    event: &InputEvent,
    log: &TransparencyLog,
) -> Option<Outcome> {
    match event {
        InputEvent::Pointer(_) => log.record_pointer_event(),
        InputEvent::Keyboard(_) => log.record_keyboard_event(),
    }

    match recorder.handle(event) {
        Ok(outcome) => {
            match &outcome {
                Outcome::Finalized {
                    stored: InsertOutcome::Inserted,
                    ..
                } => log.record_session_persisted(),
                Outcome::Finalized {
                    stored: InsertOutcome::Ignored,
                    session_start_ts,
                    ..
                } => {
                    debug!(ts = session_start_ts, "session already stored");
                    log.record_session_ignored();
                }
                Outcome::Unchanged { .. } => log.record_click_discarded(),
                _ => {}
            }
            Some(outcome)
        }
        Err(e) => {
            warn!(ts = event.timestamp_ms(), error = %e, "event handling failed");
            log.record_failure();
            None
        }
    }
}

/// Dispatch everything currently queued. Returns the number of events handled.
pub fn drain_queue<S: SessionStore>(
    queue: &EventQueue,
    recorder: &mut SessionRecorder<S>,
    log: &TransparencyLog,
) -> usize {
    let mut handled = 0;
    while let Some(event) = queue.try_pop() {
        dispatch(recorder, &event, log);
        handled += 1;
    }
    handled
}

/// Moves the queue's drop counter into the transparency log.
#[derive(Debug, Default)]
pub struct DropTracker {
    seen: u64,
}

impl DropTracker {
    pub fn sync(&mut self, queue: &EventQueue, log: &TransparencyLog) {
        let total = queue.dropped_count();
        if total > self.seen {
            let delta = total - self.seen;
            warn!(dropped = delta, "merge queue full, events dropped");
            log.record_queue_drops(delta);
            self.seen = total;
        }
    }
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("cannot read events: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse recorded events, one JSON object per line. Blank lines are skipped.
pub fn read_events(reader: impl BufRead) -> Result<Vec<InputEvent>, ReplayError> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line).map_err(|source| ReplayError::Parse {
            line: index + 1,
            source,
        })?;
        events.push(event);
    }
    Ok(events)
}

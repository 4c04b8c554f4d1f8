//! Append-only per-task progress log with live fan-out.
//!
//! The log is authoritative: sequence numbers are assigned under the same
//! lock that stores the event, so they are strictly increasing with no
//! gaps. The broadcast feed is a bounded best-effort mirror for live
//! subscribers; anyone who lags (or joins late) falls back to replaying
//! from the log, which is how the terminal event is guaranteed to reach
//! every subscriber that asks for it.

use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{Arc, Mutex},
};

use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;

use crate::progress::{
    error::{ProgressError, stream_closed},
    types::{EventStatus, ProgressEvent, Step},
};

pub type ProgressEventStream = Pin<Box<dyn futures_core::Stream<Item = Arc<ProgressEvent>> + Send>>;

pub struct ProgressStream {
    shared: Mutex<LogState>,
    live: broadcast::Sender<Arc<ProgressEvent>>,
}

struct LogState {
    events: VecDeque<Arc<ProgressEvent>>,
    first_retained: u64,
    next_sequence: u64,
    closed: bool,
    retention: usize,
}

impl ProgressStream {
    pub fn new(live_buffer: usize, retention: usize) -> Self {
        let (live, _) = broadcast::channel(live_buffer.max(1));
        Self {
            shared: Mutex::new(LogState {
                events: VecDeque::new(),
                first_retained: 0,
                next_sequence: 0,
                closed: false,
                retention: retention.max(1),
            }),
            live,
        }
    }

    /// Append a non-terminal event. Returns the assigned sequence number.
    pub fn append(
        &self,
        step: Step,
        status: EventStatus,
        message: impl Into<String>,
    ) -> Result<u64, ProgressError> {
        self.append_inner(step, status, message.into(), None)
    }

    /// Append the terminal event and close the stream. Exactly one terminal
    /// append is accepted per stream.
    pub fn append_terminal(
        &self,
        status: EventStatus,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<u64, ProgressError> {
        debug_assert!(status.is_terminal());
        self.append_inner(Step::Terminal, status, message.into(), Some(data))
    }

    fn append_inner(
        &self,
        step: Step,
        status: EventStatus,
        message: String,
        data: Option<serde_json::Value>,
    ) -> Result<u64, ProgressError> {
        let mut state = self.shared.lock().expect("lock poisoned");
        if state.closed {
            return Err(stream_closed("progress stream already carries a terminal event"));
        }

        let sequence = state.next_sequence;
        let event = Arc::new(ProgressEvent {
            sequence,
            step,
            message,
            status,
            data,
        });

        state.next_sequence = state.next_sequence.saturating_add(1);
        state.events.push_back(Arc::clone(&event));
        if status.is_terminal() {
            state.closed = true;
        }

        // Evict oldest non-terminal events beyond the retention window.
        // Sequence numbers never renumber; replay then starts at the
        // earliest retained sequence.
        while state.events.len() > state.retention
            && state
                .events
                .front()
                .is_some_and(|front| !front.is_terminal())
        {
            state.events.pop_front();
            state.first_retained = state.first_retained.saturating_add(1);
        }

        // Best-effort live delivery; lagging receivers recover via replay.
        let _ = self.live.send(event);
        Ok(sequence)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().expect("lock poisoned").closed
    }

    /// Sequence number the next appended event will receive.
    pub fn next_sequence(&self) -> u64 {
        self.shared.lock().expect("lock poisoned").next_sequence
    }

    /// Earliest sequence still available for replay.
    pub fn first_retained_sequence(&self) -> u64 {
        self.shared.lock().expect("lock poisoned").first_retained
    }

    pub fn subscribe(self: &Arc<Self>, from_sequence: u64) -> ProgressSubscription {
        ProgressSubscription {
            stream: Arc::clone(self),
            cursor: from_sequence,
            live: self.live.subscribe(),
        }
    }
}

/// A single subscriber's cursor over one task's event log.
///
/// Replays the authoritative log first, then follows the live feed; any
/// lag or drop sends it back to the log. Yields `None` only after the
/// terminal event has been delivered (or the stream is gone).
pub struct ProgressSubscription {
    stream: Arc<ProgressStream>,
    cursor: u64,
    live: broadcast::Receiver<Arc<ProgressEvent>>,
}

impl ProgressSubscription {
    pub async fn next_event(&mut self) -> Option<Arc<ProgressEvent>> {
        loop {
            {
                let state = self.stream.shared.lock().expect("lock poisoned");
                if self.cursor < state.first_retained {
                    self.cursor = state.first_retained;
                }
                if self.cursor < state.next_sequence {
                    let index = (self.cursor - state.first_retained) as usize;
                    let event = Arc::clone(&state.events[index]);
                    self.cursor = self.cursor.saturating_add(1);
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }

            match self.live.recv().await {
                Ok(event) => {
                    if event.sequence < self.cursor {
                        continue;
                    }
                    if event.sequence == self.cursor {
                        self.cursor = self.cursor.saturating_add(1);
                        return Some(event);
                    }
                    // Live feed jumped past our cursor; recover from the log.
                    continue;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    let drained = {
                        let state = self.stream.shared.lock().expect("lock poisoned");
                        self.cursor >= state.next_sequence
                    };
                    if drained {
                        return None;
                    }
                }
            }
        }
    }

    /// Adapt the subscription into a `Stream` for push-style consumers.
    pub fn into_stream(mut self) -> ProgressEventStream {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            while let Some(event) = self.next_event().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Box::pin(ReceiverStream::new(rx))
    }
}

//! Ordered, push-delivered progress events over a bounded hand-off queue.
//!
//! The producer half emits events and marks completion; the consumer half
//! polls with a short timeout, keeps waiting while the producer is active,
//! and once completion is signaled drains whatever is still queued. The
//! consumer never reorders or skips ahead of the producer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{timeout, Duration};
use tracing::debug;

use drydock_core::events::RunEvent;
use drydock_core::ids::ToolCallId;

/// Default channel capacity.
pub const EVENT_CHANNEL_CAPACITY: usize = 128;

/// How long the consumer waits per poll before re-checking completion.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Creates a bounded event channel with the default capacity.
pub fn event_channel() -> (EventSender, EventStream) {
    event_channel_with_capacity(EVENT_CHANNEL_CAPACITY)
}

pub fn event_channel_with_capacity(capacity: usize) -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::channel(capacity);
    let completed = Arc::new(AtomicBool::new(false));
    (
        EventSender {
            tx,
            completed: Arc::clone(&completed),
        },
        EventStream { rx, completed },
    )
}

/// Producer half. Sends await delivery so the consumer is never skipped;
/// a dropped consumer is tolerated (sends become no-ops).
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<RunEvent>,
    completed: Arc<AtomicBool>,
}

impl EventSender {
    pub async fn emit(&self, event: RunEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("no event receiver, event dropped");
        }
    }

    pub async fn status(&self, message: impl Into<String>) {
        self.emit(RunEvent::Status {
            message: message.into(),
        })
        .await;
    }

    pub async fn text(&self, content: impl Into<String>) {
        self.emit(RunEvent::Text {
            content: content.into(),
        })
        .await;
    }

    pub async fn tool_use(&self, id: ToolCallId, tool: impl Into<String>, input: serde_json::Value) {
        self.emit(RunEvent::ToolUse {
            id,
            tool: tool.into(),
            input,
        })
        .await;
    }

    pub async fn tool_result(&self, id: ToolCallId, payload: impl Into<String>, is_error: bool) {
        self.emit(RunEvent::ToolResult {
            id,
            payload: payload.into(),
            is_error,
        })
        .await;
    }

    pub async fn file(&self, path: impl Into<String>, size: u64) {
        self.emit(RunEvent::File {
            path: path.into(),
            size,
        })
        .await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.emit(RunEvent::Error {
            message: message.into(),
        })
        .await;
    }

    /// Emit the terminal event and signal completion. Called exactly once
    /// per run.
    pub async fn done(&self, message: impl Into<String>) {
        self.emit(RunEvent::Done {
            message: message.into(),
        })
        .await;
        self.completed.store(true, Ordering::SeqCst);
    }
}

/// Consumer half.
pub struct EventStream {
    rx: mpsc::Receiver<RunEvent>,
    completed: Arc<AtomicBool>,
}

impl EventStream {
    /// Next event in producer order, or `None` once the stream is exhausted.
    pub async fn next(&mut self) -> Option<RunEvent> {
        loop {
            match timeout(POLL_TIMEOUT, self.rx.recv()).await {
                Ok(Some(event)) => return Some(event),
                // Producer dropped: nothing more can arrive.
                Ok(None) => return None,
                Err(_) => {
                    if self.completed.load(Ordering::SeqCst) {
                        // Completion signaled: drain anything still queued.
                        return match self.rx.try_recv() {
                            Ok(event) => Some(event),
                            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
                        };
                    }
                }
            }
        }
    }

    /// Collect every remaining event. Test/CLI convenience.
    pub async fn collect(mut self) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }
}

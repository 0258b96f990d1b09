//! Per-execution event bus (§4.3): in-process publish/subscribe with
//! terminal-event stream closure, one named channel per execution.

use futures::Stream;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EventType {
    Started,
    WaveStarted,
    TaskStarted,
    TaskProgress,
    TaskCompleted,
    TaskFailed,
    WaveCompleted,
    SynthesisStarted,
    SynthesisCompleted,
    Completed,
    Failed,
    Suspended,
}

impl EventType {
    /// The three terminal event types (§4.2, P5): exactly one closes the
    /// stream for a given execution, and it is always the last event.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Suspended)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventError {
    pub message: String,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub event_type: EventType,
    pub execution_id: String,
    /// Epoch milliseconds — numeric, not a serialized date (§4.3).
    pub ts: i64,
    pub data: Option<Value>,
    pub error: Option<EventError>,
}

impl ExecutionEvent {
    pub fn new(event_type: EventType, execution_id: impl Into<String>, ts: i64) -> Self {
        Self {
            event_type,
            execution_id: execution_id.into(),
            ts,
            data: None,
            error: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>, code: Option<&str>) -> Self {
        self.error = Some(EventError {
            message: message.into(),
            code: code.map(str::to_string),
        });
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.event_type.is_terminal()
    }
}

use serde::{Deserialize, Serialize};

/// Channel capacity per execution. Generous because terminal-event closure
/// is prompt in practice (§4.3: "the queue is unbounded but in practice
/// small"); a bounded broadcast channel with headroom gives the same
/// property without unbounded growth.
const CHANNEL_CAPACITY: usize = 4096;

#[derive(Default)]
pub struct EventBus {
    channels: Mutex<HashMap<String, broadcast::Sender<ExecutionEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, execution_id: &str) -> broadcast::Sender<ExecutionEvent> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(execution_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Non-blocking: dispatched asynchronously so publishers are never
    /// delayed by slow subscribers (§4.3 Emission). A send with no
    /// subscribers is simply dropped.
    pub fn publish(&self, event: ExecutionEvent) {
        let sender = self.sender_for(&event.execution_id);
        let _ = sender.send(event);
    }

    /// Lazy, restartable-on-reconnect sequence of events for one execution,
    /// ending at the first terminal event (inclusive). Callers that already
    /// know the execution is terminal should skip calling this and return an
    /// empty sequence directly (§4.3 fast path) — the bus itself has no
    /// notion of "already terminal" since it does not persist history.
    pub fn subscribe(&self, execution_id: &str) -> impl Stream<Item = ExecutionEvent> + Send + 'static {
        let receiver = self.sender_for(execution_id).subscribe();
        futures::stream::unfold((receiver, false), |(mut rx, done)| async move {
            if done {
                return None;
            }
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let terminal = event.is_terminal();
                        return Some((event, (rx, terminal)));
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn stream_closes_after_terminal_event() {
        let bus = EventBus::new();
        let mut stream = Box::pin(bus.subscribe("exec_1"));

        bus.publish(ExecutionEvent::new(EventType::Started, "exec_1", 0));
        bus.publish(ExecutionEvent::new(EventType::WaveStarted, "exec_1", 1));
        bus.publish(ExecutionEvent::new(EventType::Completed, "exec_1", 2));
        bus.publish(ExecutionEvent::new(EventType::Started, "exec_1", 3)); // should never be seen

        let mut seen = vec![];
        while let Some(event) = stream.next().await {
            seen.push(event.event_type);
        }
        assert_eq!(seen, vec![EventType::Started, EventType::WaveStarted, EventType::Completed]);
    }

    #[tokio::test]
    async fn events_for_different_executions_are_isolated() {
        let bus = EventBus::new();
        let mut a = Box::pin(bus.subscribe("exec_a"));
        bus.publish(ExecutionEvent::new(EventType::Started, "exec_b", 0));
        bus.publish(ExecutionEvent::new(EventType::Completed, "exec_b", 1));
        bus.publish(ExecutionEvent::new(EventType::Started, "exec_a", 2));
        bus.publish(ExecutionEvent::new(EventType::Completed, "exec_a", 3));

        let first = a.next().await.unwrap();
        assert_eq!(first.execution_id, "exec_a");
    }
}

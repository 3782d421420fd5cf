//! # Session Event Bus
//!
//! Broadcast channel over which the playback session publishes what happened,
//! independent of the UI collaborator callbacks.
//!
//! ## Overview
//!
//! - **SessionEvent**: typed, serialisable session events
//! - **EventBus**: clonable broadcast sender
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! ```text
//! ┌──────────────┐   emit    ┌──────────┐   subscribe   ┌───────────────┐
//! │ Session task ├──────────>│ EventBus ├──────────────>│ analytics/UI  │
//! └──────────────┘           └──────────┘               └───────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, SessionEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(SessionEvent::QueueFinished).ok();
//! assert_eq!(rx.recv().await.unwrap(), SessionEvent::QueueFinished);
//! # }
//! ```
//!
//! ## Error Handling
//!
//! `RecvError::Lagged(n)` is non-fatal: the subscriber missed `n` events and
//! keeps receiving. `RecvError::Closed` means the session is gone.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Session Events
// ============================================================================

/// Events published by a playback session.
///
/// Payloads are plain strings and numbers so that subscribers do not need the
/// playback crate's types. Positions are server ticks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum SessionEvent {
    /// The session moved between playback states.
    StateChanged {
        from: String,
        to: String,
    },
    /// Negotiation succeeded and the surface was pointed at a stream.
    ItemStarted {
        item_id: String,
        /// `DirectPlay`, `DirectStream` or `Transcode`.
        play_method: String,
        start_position_ticks: i64,
    },
    /// Negotiation failed; the session returned to idle.
    NegotiationFailed {
        item_id: String,
        reason: String,
    },
    /// The next-item threshold fired for the current item.
    ThresholdReached {
        item_id: String,
        next_item_id: String,
        position_ticks: i64,
    },
    /// The queue moved to a new current item.
    QueueAdvanced {
        index: usize,
        item_id: String,
    },
    /// The last item finished and the session handed control back.
    QueueFinished,
    /// A non-fatal condition worth surfacing (seek failed, subtitle missing).
    Warning {
        message: String,
    },
}

impl SessionEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            SessionEvent::StateChanged { .. } => "Playback state changed",
            SessionEvent::ItemStarted { .. } => "Item playback started",
            SessionEvent::NegotiationFailed { .. } => "Stream negotiation failed",
            SessionEvent::ThresholdReached { .. } => "Next item threshold reached",
            SessionEvent::QueueAdvanced { .. } => "Queue advanced",
            SessionEvent::QueueFinished => "Queue finished",
            SessionEvent::Warning { .. } => "Playback warning",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            SessionEvent::NegotiationFailed { .. } => EventSeverity::Error,
            SessionEvent::StateChanged { to, .. } if to == "Error" => EventSeverity::Error,
            SessionEvent::Warning { .. } => EventSeverity::Warning,
            SessionEvent::ItemStarted { .. }
            | SessionEvent::QueueAdvanced { .. }
            | SessionEvent::QueueFinished => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast bus for [`SessionEvent`]s.
///
/// Cloning shares the underlying channel. Slow subscribers receive
/// `RecvError::Lagged` but never block the session.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Creates a new event bus; `capacity` is the per-subscriber backlog.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event. Errors only when nobody is subscribed, which
    /// publishers are expected to ignore.
    pub fn emit(&self, event: SessionEvent) -> Result<usize, SendError<SessionEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Subscribe and wrap the receiver in an [`EventStream`].
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&SessionEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with optional filtering.
pub struct EventStream {
    receiver: Receiver<SessionEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<SessionEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SessionEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Only events at or above `min` are returned.
    pub fn min_severity(self, min: EventSeverity) -> Self {
        self.filter(move |event| event.severity() >= min)
    }

    fn matches(&self, event: &SessionEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<SessionEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive; `None` when nothing matching is queued.
    pub fn try_recv(&mut self) -> Option<Result<SessionEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn state_changed(from: &str, to: &str) -> SessionEvent {
        SessionEvent::StateChanged {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(SessionEvent::QueueFinished).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = SessionEvent::QueueAdvanced {
            index: 1,
            item_id: "item-2".to_string(),
        };
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = bus
            .stream()
            .filter(|event| matches!(event, SessionEvent::ThresholdReached { .. }));

        bus.emit(state_changed("Buffering", "Playing")).ok();
        let threshold = SessionEvent::ThresholdReached {
            item_id: "a".to_string(),
            next_item_id: "b".to_string(),
            position_ticks: 17_700_000_000,
        };
        bus.emit(threshold.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), threshold);
    }

    #[tokio::test]
    async fn test_min_severity_stream() {
        let bus = EventBus::new(10);
        let mut stream = bus.stream().min_severity(EventSeverity::Warning);

        bus.emit(state_changed("Idle", "Buffering")).ok();
        bus.emit(SessionEvent::QueueFinished).ok();
        bus.emit(SessionEvent::Warning {
            message: "Seek failed".to_string(),
        })
        .ok();

        assert!(matches!(
            stream.try_recv(),
            Some(Ok(SessionEvent::Warning { .. }))
        ));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(SessionEvent::QueueAdvanced {
                index: i,
                item_id: format!("item-{}", i),
            })
            .ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
        assert!(sub.recv().await.is_ok());
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(
            state_changed("Playing", "Error").severity(),
            EventSeverity::Error
        );
        assert_eq!(
            state_changed("Idle", "Buffering").severity(),
            EventSeverity::Debug
        );
        assert_eq!(
            SessionEvent::NegotiationFailed {
                item_id: "x".to_string(),
                reason: "rate limited".to_string()
            }
            .severity(),
            EventSeverity::Error
        );
        assert_eq!(SessionEvent::QueueFinished.severity(), EventSeverity::Info);
    }

    #[test]
    fn test_event_serialization_shape() {
        let json = serde_json::to_value(SessionEvent::QueueAdvanced {
            index: 2,
            item_id: "abc".to_string(),
        })
        .unwrap();

        assert_eq!(json["type"], "QueueAdvanced");
        assert_eq!(json["payload"]["index"], 2);
        assert_eq!(json["payload"]["item_id"], "abc");
    }
}

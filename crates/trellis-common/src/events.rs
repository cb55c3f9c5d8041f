//! # Events
//!
//! Named events published by the engine to an external sink. Dispatching to
//! listeners is the sink's business; the engine only fires and forgets.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::NodeId;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

impl EventId {
    /// Create a new unique EventId.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Structured payload carried by an event.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EventDetail {
    #[default]
    None,
    /// A style sheet parse started or finished.
    StyleSheet {
        href: Option<String>,
        rule_count: usize,
    },
    /// A media resource changed state.
    Media { src: Option<String> },
}

/// A named event.
#[derive(Debug, Clone)]
pub struct Event {
    /// Unique ID for this event.
    pub id: EventId,
    /// Event type (e.g., "focus", "cssparsestart").
    pub event_type: String,
    /// Whether the event bubbles.
    pub bubbles: bool,
    /// Whether the event is cancelable.
    pub cancelable: bool,
    /// Whether the event was fired by the engine itself.
    pub is_trusted: bool,
    /// Milliseconds since the Unix epoch at creation.
    pub timestamp: u64,
    /// The node the event is about, if any.
    pub target: Option<NodeId>,
    /// Extra data.
    pub detail: EventDetail,
}

impl Event {
    /// Create a new event.
    pub fn new(event_type: &str, bubbles: bool, cancelable: bool) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.to_string(),
            bubbles,
            cancelable,
            is_trusted: false,
            timestamp: Self::current_timestamp(),
            target: None,
            detail: EventDetail::None,
        }
    }

    /// Create a trusted, non-bubbling, non-cancelable event.
    pub fn trusted(event_type: &str) -> Self {
        let mut event = Self::new(event_type, false, false);
        event.is_trusted = true;
        event
    }

    /// Set the target node.
    pub fn with_target(mut self, target: Option<NodeId>) -> Self {
        self.target = target;
        self
    }

    /// Set the payload.
    pub fn with_detail(mut self, detail: EventDetail) -> Self {
        self.detail = detail;
        self
    }

    fn current_timestamp() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Receiver of published events.
pub trait EventSink {
    /// Publish an event. The return value of any listener is not observed.
    fn publish(&self, event: Event);
}

/// Sink that keeps every event it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: RefCell<Vec<Event>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Event types received so far.
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Remove and return all received events.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// Number of received events.
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    /// Whether nothing was received.
    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trusted_event() {
        let event = Event::trusted("focus").with_target(Some(NodeId::new(3)));
        assert!(event.is_trusted);
        assert!(!event.bubbles);
        assert_eq!(event.target, Some(NodeId::new(3)));
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.publish(Event::trusted("a"));
        sink.publish(Event::trusted("b"));
        assert_eq!(sink.event_types(), vec!["a", "b"]);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.is_empty());
    }
}

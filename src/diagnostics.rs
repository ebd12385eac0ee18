//! # Diagnostics Module
//!
//! Bounded event log of connection, message and remap activity.
//!
//! A [`Diagnostics`] handle is created once and cloned into every
//! component that reports events. Oldest events are evicted first.
//!
//! ## Usage
//!
//! ```
//! use relay_pilot::diagnostics::{Diagnostics, EventKind};
//!
//! let diagnostics = Diagnostics::new(2);
//! diagnostics.record(EventKind::RelayConnected);
//! diagnostics.record(EventKind::Latency { millis: 12 });
//! diagnostics.record(EventKind::RelayDisconnected);
//!
//! assert_eq!(diagnostics.len(), 2);
//! assert_eq!(diagnostics.last_latency(), Some(12));
//! ```

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    RelayConnected,
    RelayDisconnected,
    MessageSent { name: String },
    MessageReceived { name: String },
    /// Relay round trip measured from a ping/pong exchange
    Latency { millis: u64 },
    DeviceConnected { device: String },
    DeviceDisconnected { device: String },
    RemapCommitted { action: String, input: String },
    Error { message: String },
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::RelayConnected => write!(f, "relay connected"),
            EventKind::RelayDisconnected => write!(f, "relay disconnected"),
            EventKind::MessageSent { name } => write!(f, "sent {}", name),
            EventKind::MessageReceived { name } => write!(f, "received {}", name),
            EventKind::Latency { millis } => write!(f, "latency {} ms", millis),
            EventKind::DeviceConnected { device } => write!(f, "device connected: {}", device),
            EventKind::DeviceDisconnected { device } => write!(f, "device disconnected: {}", device),
            EventKind::RemapCommitted { action, input } => write!(f, "remapped {} to {}", action, input),
            EventKind::Error { message } => write!(f, "error: {}", message),
        }
    }
}

/// One logged event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub at: DateTime<Utc>,
    pub kind: EventKind,
}

/// Fixed-capacity ring of events, oldest first.
#[derive(Debug, Clone)]
pub struct EventLog {
    capacity: usize,
    events: VecDeque<DiagnosticEvent>,
}

impl EventLog {
    /// Creates a log holding at most `capacity` events (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, event: DiagnosticEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &DiagnosticEvent> {
        self.events.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Shared handle to an [`EventLog`].
#[derive(Debug, Clone)]
pub struct Diagnostics {
    log: Arc<Mutex<EventLog>>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(200)
    }
}

impl Diagnostics {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            log: Arc::new(Mutex::new(EventLog::new(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EventLog> {
        // A panic while holding the lock cannot leave the ring inconsistent
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an event stamped with the current time.
    pub fn record(&self, kind: EventKind) {
        self.lock().push(DiagnosticEvent { at: Utc::now(), kind });
    }

    /// Copy of the logged events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Most recent latency measurement still in the log.
    #[must_use]
    pub fn last_latency(&self) -> Option<u64> {
        self.lock().iter().rev().find_map(|event| match event.kind {
            EventKind::Latency { millis } => Some(millis),
            _ => None,
        })
    }
}

//! # Event Delivery
//!
//! Provides the plumbing that carries typed events from the core to its
//! consumers. The event *types* live with the modules that emit them (the
//! synchronization protocol is defined in `core-sync`); this module only
//! knows how to deliver them.
//!
//! ## Overview
//!
//! - **`EventSink<E>`**: the seam producers publish through
//! - **`EventLog<E>`**: append-only, ordered, in-memory log
//! - **`EventBus<E>`**: `tokio::sync::broadcast` fan-out to many subscribers
//! - **`EventStream<E>`**: filtered wrapper around a bus subscription
//! - `tokio::sync::mpsc::UnboundedSender<E>` implements `EventSink<E>` too
//!
//! ## Choosing a sink
//!
//! The log and the mpsc sender never drop events and preserve emission
//! order, so they are the right choice when a consumer reconstructs state from
//! the stream. The broadcast bus is lossy by construction: a subscriber that
//! falls behind by more than the buffer size receives `RecvError::Lagged`.
//!
//! ```rust
//! use core_runtime::events::{EventLog, EventSink};
//!
//! let log = EventLog::new();
//! log.publish("started");
//! log.publish("finished");
//! assert_eq!(log.snapshot(), vec!["started", "finished"]);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Event Sink
// ============================================================================

/// Destination for events emitted by a producer.
///
/// Publishing never fails from the producer's point of view; a sink that
/// cannot deliver (closed channel, no subscribers) drops the event.
pub trait EventSink<E>: Send + Sync {
    /// Delivers one event.
    fn publish(&self, event: E);
}

impl<E, S> EventSink<E> for &S
where
    S: EventSink<E> + ?Sized,
{
    fn publish(&self, event: E) {
        (**self).publish(event)
    }
}

impl<E: Send> EventSink<E> for mpsc::UnboundedSender<E> {
    fn publish(&self, event: E) {
        // A closed receiver means nobody is listening anymore.
        let _ = self.send(event);
    }
}

// ============================================================================
// Event Log
// ============================================================================

/// Append-only, ordered log of events.
pub struct EventLog<E> {
    entries: Mutex<Vec<E>>,
}

impl<E> EventLog<E> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Number of events recorded so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns every recorded event.
    pub fn drain(&self) -> Vec<E> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<E>> {
        // A panic while holding the lock cannot leave the Vec half-written.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<E: Clone> EventLog<E> {
    /// Returns a copy of every recorded event, in emission order.
    pub fn snapshot(&self) -> Vec<E> {
        self.lock().clone()
    }
}

impl<E> Default for EventLog<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Send> EventSink<E> for EventLog<E> {
    fn publish(&self, event: E) {
        self.lock().push(event);
    }
}

impl<E> fmt::Debug for EventLog<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
///
/// # Example
///
/// ```rust
/// use core_runtime::events::EventBus;
///
/// # #[tokio::main]
/// # async fn main() {
/// let event_bus = EventBus::new(16);
/// let mut subscriber = event_bus.subscribe();
///
/// event_bus.emit("hello".to_string()).ok();
/// assert_eq!(subscriber.recv().await.unwrap(), "hello");
/// # }
/// ```
#[derive(Clone)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: E) -> Result<usize, SendError<E>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future events.
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<E> {
        self.sender.subscribe()
    }

    /// Subscribes and wraps the receiver in an [`EventStream`].
    pub fn stream(&self) -> EventStream<E> {
        EventStream::new(self.subscribe())
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone + Send> EventSink<E> for EventBus<E> {
    fn publish(&self, event: E) {
        self.emit(event).ok();
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering capabilities.
pub struct EventStream<E> {
    receiver: Receiver<E>,
    filter: Option<EventFilter<E>>,
}

impl<E: Clone> EventStream<E> {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<E>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<E, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<E, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
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

impl<E> fmt::Debug for EventStream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

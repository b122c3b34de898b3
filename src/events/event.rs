//! # Events and the factory that mints them.
//!
//! An [`Event`] is an identified, timestamped, typed value published through
//! the application log. Events are created only by the [`EventFactory`]: it
//! assigns the [`EventId`] (callers may **not** supply one), copies the
//! recognized fields from the [`EventDraft`], and defaults the timestamp to
//! the current clock reading.
//!
//! ## Example
//! ```
//! use modvisor::events::{EventDraft, EventFactory};
//!
//! let factory = EventFactory::random();
//! let ev = factory
//!     .create(EventDraft::new("cache/invalidated").with_data(42_u32))
//!     .unwrap();
//!
//! assert_eq!(ev.kind.as_ref(), "cache/invalidated");
//! assert_eq!(ev.data_as::<u32>().as_deref(), Some(&42));
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use thiserror::Error;

use crate::modules::Arg;

use super::id::{Clock, EventId, EventIdGenerator, SystemClock};

/// An identified, timestamped, typed value carried by the application log.
#[derive(Clone)]
pub struct Event {
    /// Globally orderable identifier, assigned by the factory.
    pub id: EventId,
    /// Event type, an open set of names (`"db/connected"`, …).
    pub kind: Arc<str>,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Optional payload.
    pub data: Option<Arg>,
}

impl Event {
    /// Typed view of the payload.
    pub fn data_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.data.as_ref().and_then(|d| d.clone().downcast::<T>().ok())
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("at", &self.at)
            .field("data", &self.data.is_some())
            .finish()
    }
}

/// Input to [`EventFactory::create`].
///
/// Carries the recognized fields of an event-to-be. The `id` slot exists only
/// so the factory can reject drafts that try to supply one.
#[derive(Clone, Default)]
pub struct EventDraft {
    kind: Arc<str>,
    at: Option<SystemTime>,
    data: Option<Arg>,
    id: Option<EventId>,
}

impl EventDraft {
    /// Starts a draft of the given event type.
    pub fn new(kind: impl Into<Arc<str>>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Sets an explicit timestamp (defaults to the factory clock's reading).
    pub fn with_at(mut self, at: SystemTime) -> Self {
        self.at = Some(at);
        self
    }

    /// Attaches a payload.
    pub fn with_data<T: Any + Send + Sync>(self, data: T) -> Self {
        self.with_data_arc(Arc::new(data))
    }

    /// Attaches an already-shared payload.
    pub fn with_data_arc(mut self, data: Arg) -> Self {
        self.data = Some(data);
        self
    }

    /// Supplies an id. The factory rejects such drafts — ids are assigned,
    /// never accepted.
    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    /// The draft's event type.
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl fmt::Debug for EventDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDraft")
            .field("kind", &self.kind)
            .field("at", &self.at)
            .field("data", &self.data.is_some())
            .field("id", &self.id)
            .finish()
    }
}

/// # Errors produced by the event factory.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EventError {
    /// The draft already carried an id; no generation was performed.
    #[error("event drafts must not carry an id (found '{id}')")]
    IdSupplied {
        /// The offending id.
        id: EventId,
    },
}

impl EventError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventError::IdSupplied { .. } => "event_id_supplied",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            EventError::IdSupplied { id } => format!("draft already carries id '{id}'"),
        }
    }
}

/// Mints [`Event`]s: assigns fresh ids and defaults timestamps.
pub struct EventFactory {
    generator: EventIdGenerator,
    clock: Arc<dyn Clock>,
}

impl EventFactory {
    /// Creates a factory over the given clock and instance id.
    pub fn new(clock: Arc<dyn Clock>, instance: impl Into<Arc<str>>) -> Self {
        Self {
            generator: EventIdGenerator::new(clock.clone(), instance),
            clock,
        }
    }

    /// Creates a factory with a random instance id on the system clock.
    pub fn random() -> Self {
        Self::new(Arc::new(SystemClock), super::id::random_instance_id())
    }

    /// The factory's 12-character instance id.
    pub fn instance_id(&self) -> &str {
        self.generator.instance_id()
    }

    /// Builds an event from a draft.
    ///
    /// Copies only the recognized fields (`kind`, `at`, `data`), assigns a
    /// freshly generated id, and defaults `at` to the current clock reading.
    ///
    /// # Errors
    /// [`EventError::IdSupplied`] when the draft already carries an id; no id
    /// is generated in that case.
    pub fn create(&self, draft: EventDraft) -> Result<Event, EventError> {
        if let Some(id) = draft.id {
            return Err(EventError::IdSupplied { id });
        }
        Ok(Event {
            id: self.generator.next_id(),
            kind: draft.kind,
            at: draft.at.unwrap_or_else(|| self.clock.now()),
            data: draft.data,
        })
    }
}

impl fmt::Debug for EventFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFactory")
            .field("instance", &self.instance_id())
            .finish()
    }
}

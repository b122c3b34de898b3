//! Application events: logical-clock ids, factory, emitter, and the app-log.
//!
//! This module groups the event **data model** and the **pub/sub hub** that
//! modules communicate through without direct coupling.
//!
//! ## Contents
//! - [`EventId`], [`EventIdGenerator`], [`Clock`] — timestamp-plus-counter
//!   identifiers, strictly increasing per generator;
//! - [`Event`], [`EventDraft`], [`EventFactory`] — events are minted by the
//!   factory only (ids are assigned, never accepted);
//! - [`EventEmitter`], [`Listener`] — ordered, pausable, typed delivery;
//! - [`AppLog`], [`APP_LOG`], [`module`] — the injected dependency-of-
//!   everything module exposing `on`/`off`/`put`.
//!
//! ## Quick reference
//! - **Publishers**: module update functions (via their injected `app-log`
//!   export) and host application code.
//! - **Pause/resume**: the transition orchestrator pauses the log for the
//!   duration of a transition; resume flushes buffered events in FIFO order.

mod emitter;
mod event;
mod id;
mod log;

pub use emitter::{listener, EventEmitter, Listener};
pub use event::{Event, EventDraft, EventError, EventFactory};
pub use id::{
    random_instance_id, Clock, EventId, EventIdGenerator, SystemClock, ENCODED_LEN,
};
pub use log::{app_log, module, AppLog, APP_LOG};
#[cfg(feature = "logging")]
pub use log::LogWriter;

pub(crate) use log::inject;

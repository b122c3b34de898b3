//! # EventEmitter: ordered, pausable, typed publish/subscribe.
//!
//! A mutable registry mapping event type → ordered listener list, plus a
//! reserved **any-type** list:
//!
//! - [`listen`](EventEmitter::listen) appends to every currently-known list
//!   *and* the any-list, so per-type lists registered later seed from it;
//! - [`listen_to`](EventEmitter::listen_to) appends to one type's list,
//!   seeding a fresh list from the any-list;
//! - [`emit`](EventEmitter::emit) synchronously invokes, in list order, the
//!   type's listeners (falling back to the any-list when no specific list
//!   exists) — or appends to a FIFO buffer while paused;
//! - [`resume`](EventEmitter::resume) drains the buffer strictly in FIFO
//!   order before accepting new emissions, so pausing is invisible to
//!   listeners apart from timing.
//!
//! Listeners are invoked outside the registry lock, so a listener may itself
//! publish.
//!
//! ## Rules
//! - Per-list ordering is registration order.
//! - The paused buffer never drops events; crossing the soft cap only logs a
//!   warning.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

use super::event::Event;

/// Callback invoked with each published event.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wraps a closure into a shareable [`Listener`] handle.
///
/// Keep the handle if you need to unsubscribe later — removal is by handle
/// identity.
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Soft cap on the paused buffer before a warning is logged.
const BUFFER_WARN_THRESHOLD: usize = 1024;

#[derive(Default)]
struct EmitterState {
    lists: HashMap<Arc<str>, Vec<Listener>>,
    any: Vec<Listener>,
    paused: bool,
    buffer: VecDeque<Event>,
}

impl EmitterState {
    fn targets_for(&self, kind: &str) -> Vec<Listener> {
        match self.lists.get(kind) {
            Some(list) => list.clone(),
            None => self.any.clone(),
        }
    }
}

/// Ordered, pausable, typed publish/subscribe hub.
#[derive(Default)]
pub struct EventEmitter {
    state: Mutex<EmitterState>,
}

impl EventEmitter {
    /// Creates an empty emitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to every event type, current and future.
    pub fn listen(&self, f: Listener) {
        let mut state = self.lock();
        for list in state.lists.values_mut() {
            list.push(f.clone());
        }
        state.any.push(f);
    }

    /// Subscribes to one event type.
    ///
    /// A type seen for the first time gets its list seeded from the any-list,
    /// so earlier catch-all subscribers keep their position ahead of `f`.
    pub fn listen_to(&self, kind: impl Into<Arc<str>>, f: Listener) {
        let mut state = self.lock();
        let seed = state.any.clone();
        state.lists.entry(kind.into()).or_insert(seed).push(f);
    }

    /// Removes every listener. Future emissions go nowhere until new
    /// listeners are registered.
    pub fn unlisten(&self) {
        let mut state = self.lock();
        state.lists.clear();
        state.any.clear();
    }

    /// Removes listeners for one event type: a specific one (by handle
    /// identity) or, with `None`, the whole list.
    pub fn unlisten_to(&self, kind: &str, f: Option<&Listener>) {
        let mut state = self.lock();
        match f {
            Some(f) => {
                if let Some(list) = state.lists.get_mut(kind) {
                    list.retain(|l| !Arc::ptr_eq(l, f));
                }
            }
            None => {
                state.lists.remove(kind);
            }
        }
    }

    /// Removes one listener (by handle identity) from every list.
    pub fn unlisten_fn(&self, f: &Listener) {
        let mut state = self.lock();
        for list in state.lists.values_mut() {
            list.retain(|l| !Arc::ptr_eq(l, f));
        }
        state.any.retain(|l| !Arc::ptr_eq(l, f));
    }

    /// Publishes an event: buffered while paused, delivered synchronously
    /// (in list order) otherwise.
    pub fn emit(&self, event: Event) {
        let targets = {
            let mut state = self.lock();
            if state.paused {
                state.buffer.push_back(event);
                if state.buffer.len() > BUFFER_WARN_THRESHOLD {
                    eprintln!(
                        "[modvisor] event buffer holds {} events while paused",
                        state.buffer.len()
                    );
                }
                return;
            }
            state.targets_for(&event.kind)
        };
        for listen in &targets {
            listen(&event);
        }
    }

    /// Stops delivery; subsequent emissions accumulate in FIFO order.
    pub fn pause(&self) {
        self.lock().paused = true;
    }

    /// Drains the buffer strictly in FIFO order, then accepts new emissions.
    ///
    /// Events published by listeners during the drain are appended to the
    /// buffer and drained in turn, preserving global order.
    pub fn resume(&self) {
        loop {
            let next = {
                let mut state = self.lock();
                match state.buffer.pop_front() {
                    Some(event) => {
                        let targets = state.targets_for(&event.kind);
                        Some((event, targets))
                    }
                    None => {
                        state.paused = false;
                        None
                    }
                }
            };
            let Some((event, targets)) = next else {
                return;
            };
            for listen in &targets {
                listen(&event);
            }
        }
    }

    /// True while emissions are being buffered.
    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Number of events waiting in the paused buffer.
    pub fn buffered(&self) -> usize {
        self.lock().buffer.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EmitterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("EventEmitter")
            .field("kinds", &state.lists.len())
            .field("any", &state.any.len())
            .field("paused", &state.paused)
            .field("buffered", &state.buffer.len())
            .finish()
    }
}

//! # AppLog: the injected application event log module.
//!
//! [`AppLog`] bundles an [`EventFactory`] and an [`EventEmitter`] behind the
//! publish/subscribe surface every module may use: `on`/`off`/`put`. The
//! transition orchestrator merges the [`module`] definition into the system
//! map under the key [`APP_LOG`] and makes every other module depend on it,
//! so each module receives the shared `Arc<AppLog>` in its exports.
//!
//! ## Example
//! ```
//! use modvisor::{Module, Update};
//! use modvisor::events::{AppLog, EventDraft, listener};
//!
//! let web = Module::new().on_start(|update: Update| async move {
//!     let log = update
//!         .exports
//!         .get::<AppLog>("app-log")
//!         .expect("injected by the orchestrator");
//!     log.on(Some("config/changed"), listener(|ev| {
//!         println!("reloading: {}", ev.id);
//!     }));
//!     log.put(EventDraft::new("web/listening")).ok();
//!     Ok(update.state)
//! });
//! # let _ = web;
//! ```

use std::fmt;
use std::sync::Arc;

use crate::modules::{Module, SystemMap};

use super::emitter::{EventEmitter, Listener};
use super::event::{EventDraft, EventError, EventFactory};
use super::id::EventId;

/// System-map key of the injected event log module.
pub const APP_LOG: &str = "app-log";

/// The application event log: factory plus pausable emitter.
pub struct AppLog {
    factory: EventFactory,
    emitter: EventEmitter,
}

impl Default for AppLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AppLog {
    /// Creates a log with a random instance id on the system clock.
    pub fn new() -> Self {
        Self::with_factory(EventFactory::random())
    }

    /// Creates a log over a caller-supplied factory (fixed clock/instance).
    pub fn with_factory(factory: EventFactory) -> Self {
        Self {
            factory,
            emitter: EventEmitter::new(),
        }
    }

    /// Subscribes: to one event type, or (with `None`) to every type.
    pub fn on(&self, kind: Option<&str>, f: Listener) {
        match kind {
            Some(kind) => self.emitter.listen_to(kind.to_string(), f),
            None => self.emitter.listen(f),
        }
    }

    /// Unsubscribes. All four combinations are meaningful:
    /// - `(Some(kind), Some(f))` — remove `f` from that type's list;
    /// - `(Some(kind), None)` — drop that type's whole list;
    /// - `(None, Some(f))` — remove `f` everywhere;
    /// - `(None, None)` — silence all future emissions.
    pub fn off(&self, kind: Option<&str>, f: Option<&Listener>) {
        match (kind, f) {
            (Some(kind), f) => self.emitter.unlisten_to(kind, f),
            (None, Some(f)) => self.emitter.unlisten_fn(f),
            (None, None) => self.emitter.unlisten(),
        }
    }

    /// Publishes: mints an event from the draft and emits it.
    ///
    /// # Errors
    /// [`EventError::IdSupplied`] when the draft already carries an id.
    pub fn put(&self, draft: EventDraft) -> Result<EventId, EventError> {
        let event = self.factory.create(draft)?;
        let id = event.id.clone();
        self.emitter.emit(event);
        Ok(id)
    }

    /// The underlying emitter (pause/resume, introspection).
    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// The underlying factory.
    pub fn factory(&self) -> &EventFactory {
        &self.factory
    }
}

impl fmt::Debug for AppLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppLog")
            .field("instance", &self.factory.instance_id())
            .field("emitter", &self.emitter)
            .finish()
    }
}

/// The event log as a module definition: shared [`AppLog`] state, exported
/// as-is to every dependent.
pub fn module() -> Module {
    Module::new()
        .with_state_arc(Arc::new(AppLog::new()))
        .with_export(|state| state.clone())
}

/// The shared log of a system map, if the module is present.
pub fn app_log(system: &SystemMap) -> Option<Arc<AppLog>> {
    system.get(APP_LOG)?.state_as::<AppLog>()
}

/// Merges the log module into the map (no overwrite) and makes every other
/// module depend on it.
pub(crate) fn inject(system: &mut SystemMap) {
    system.merge_defaults(SystemMap::new().with(APP_LOG, module()));
    system.depend_all_on(APP_LOG);
}

/// Simple stdout logging listener for debugging and demos.
///
/// Enabled via the `logging` feature. Prints one line per event:
///
/// ```text
/// [db/connected] id=008m2zq5instanceid0x0000
/// ```
///
/// Not intended for production use — register a custom [`Listener`] for
/// structured logging or metrics collection.
#[cfg(feature = "logging")]
pub struct LogWriter;

#[cfg(feature = "logging")]
impl LogWriter {
    /// Builds the listener; register it with [`AppLog::on`].
    pub fn listener() -> Listener {
        super::emitter::listener(|ev| {
            println!("[{}] id={}", ev.kind, ev.id);
        })
    }
}

//! # modvisor
//!
//! **Modvisor** is a lightweight module lifecycle orchestration library for Rust.
//!
//! It provides primitives to declare application modules with dependencies,
//! bring them up and tear them down in dependency order, and let them
//! communicate through an injected, ordering-guaranteed event log. The crate
//! is designed as a building block for larger applications and hot-reload
//! tooling.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    Module    │   │    Module    │   │    Module    │
//!     │  ("db")      │   │  ("cache")   │   │  ("web")     │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  App (lifecycle controller)                                       │
//! │  - SystemMap (all module definitions, one value)                  │
//! │  - serialized tail (FIFO, commit-or-rollback, timeout)            │
//! │  - watchers (change notification on every commit)                 │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Transition orchestrator                                          │
//! │  - resolve_order: dependency closure, cycle detection             │
//! │  - up: deps first    down: dependents first    tx: as given       │
//! │  - injects the app-log module, pauses it for the duration         │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Interceptor engine (per module, per scope)                       │
//! │  enter: A → B → C          leave/error: C → B → A                 │
//! │  [enter("started")] [step("start")] …                             │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  AppLog ("app-log" module, dependency of everything)              │
//! │  on/off/put · EventFactory (logical-clock ids) · EventEmitter     │
//! │  paused during transitions, flushed FIFO on completion or error   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! App::create(SystemMap) ──► start!/stop!/pause!/resume!/load!
//!
//! schedule(update) {
//!   ├─► wait for the previous scheduled call to settle (FIFO tail)
//!   ├─► run update(last-good map) under the configured timeout
//!   ├─► ok      ─► commit wholesale, notify watchers, become the tail
//!   └─► err/t.o ─► restore tail to the pre-call value; only this caller
//!                  sees the failure
//! }
//!
//! per module (dependency order):
//!   enter("started")  ─► already tagged? skip module (idempotent)
//!   step("start")     ─► update(state, exports, key) → new state
//!   …leave phase…     ─► tag set on the way out, exact reverse order
//! ```
//!
//! ## Features
//! | Area              | Description                                                           | Key types / functions                   |
//! |-------------------|-----------------------------------------------------------------------|-----------------------------------------|
//! | **Modules**       | Declare deps, opaque state, lifecycle updates, exports, plugins.      | [`Module`], [`SystemMap`], [`Plugin`]   |
//! | **Resolution**    | Dependency-closure ordering with eager cycle detection.               | [`resolve_order`]                       |
//! | **Interceptors**  | Suspendable enter/leave/error pipelines over a shared record.         | [`Interceptor`], [`Context`], [`engine`](context::engine) |
//! | **Transitions**   | Dependency-ordered elevation/degradation with log pause.              | [`up`], [`down`], [`tx`]                |
//! | **Controller**    | Serialized, rollback-capable lifecycle entry points.                  | [`App`], [`Config`]                     |
//! | **Event log**     | Logical-clock ids, typed pub/sub, pause/flush.                        | [`events::AppLog`], [`events::EventId`] |
//! | **Errors**        | Typed errors for resolution, steps, and timeouts.                     | [`LifecycleError`], [`StepError`]       |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`events::LogWriter`] listener
//!   _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use modvisor::{App, Module, StepError, SystemMap, Update};
//! use modvisor::events::{AppLog, EventDraft};
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let system = SystemMap::new()
//!         .with(
//!             "db",
//!             Module::new()
//!                 .with_state("postgres://localhost".to_string())
//!                 .with_export(|state| state.clone())
//!                 .on_start(|u: Update| async move { Ok(u.state) }),
//!         )
//!         .with(
//!             "web",
//!             Module::new().with_deps(["db"]).on_start(|u: Update| async move {
//!                 let url = u
//!                     .exports
//!                     .get::<String>("db")
//!                     .ok_or_else(|| StepError::fail("db export missing"))?;
//!                 let log = u
//!                     .exports
//!                     .get::<AppLog>("app-log")
//!                     .ok_or_else(|| StepError::fail("app-log missing"))?;
//!                 log.put(EventDraft::new("web/listening")).map_err(StepError::fail)?;
//!                 Ok(Arc::new(format!("serving on {url}")) as modvisor::State)
//!             }),
//!         );
//!
//!     let app = App::create(system);
//!     app.start(&[]).await?;   // db before web, app-log before both
//!     app.stop(&[]).await?;    // web before db
//!     Ok(())
//! }
//! ```

mod app;
mod config;
pub mod context;
mod error;
pub mod events;
pub mod modules;
pub mod transition;

// ---- Public re-exports ----

pub use app::{App, WatchFn, TAG_PAUSED, TAG_STARTED};
pub use config::Config;
pub use context::{Context, Hook, Interceptor};
pub use error::{LifecycleError, Stage, StepError};
pub use modules::{
    resolve_order, steps, Arg, Args, Exports, Module, ModuleKey, Plugin, Selector, State,
    SystemMap, Update, UpdateFn,
};
pub use transition::{down, tx, up};

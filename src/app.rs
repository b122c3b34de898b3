//! # Application lifecycle controller.
//!
//! An [`App`] owns the committed [`SystemMap`] and serializes every lifecycle
//! call onto a single tail: each scheduled transition runs strictly after the
//! previous one settles, under a bounded timeout, and either **commits** its
//! result wholesale or leaves the last known-good value in place. Later,
//! unrelated calls are never poisoned by an earlier failure.
//!
//! ```text
//! start!/stop!/pause!/resume!/load! ──► schedule(update)
//!        │  (fair async mutex = FIFO tail)
//!        ▼
//!   update(last-good map) ── ok ──► commit + notify watchers ──► new tail
//!        │
//!        ├─ err ─────► tail restored to pre-call value, error to this caller
//!        └─ timeout ─► same, with a timeout error (the in-flight future is
//!                      dropped, i.e. cancelled at its next suspension point)
//! ```
//!
//! ## Example
//! ```no_run
//! use modvisor::{App, Module, SystemMap, Update};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let system = SystemMap::new()
//!         .with("db", Module::new().on_start(|u: Update| async move { Ok(u.state) }))
//!         .with("web", Module::new().with_deps(["db"]));
//!
//!     let app = App::create(system);
//!     app.start(&[]).await?;          // all modules, dependencies first
//!     app.stop(&["web"]).await?;      // web (and its dependents) only
//!     Ok(())
//! }
//! ```

use std::borrow::Cow;
use std::sync::{Arc, Mutex as StdMutex, RwLock};

use futures::future::BoxFuture;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::Config;
use crate::context::Interceptor;
use crate::error::LifecycleError;
use crate::modules::{steps, ModuleKey, SystemMap};
use crate::transition;

/// Lifecycle tag set while a module is started.
pub const TAG_STARTED: &str = "started";
/// Lifecycle tag set while a module is paused.
pub const TAG_PAUSED: &str = "paused";

/// Change-notification callback: `(old, new)` on every committed update.
pub type WatchFn = Arc<dyn Fn(&SystemMap, &SystemMap) + Send + Sync>;

struct Watcher {
    name: Cow<'static, str>,
    callback: WatchFn,
}

struct AppInner {
    config: Config,
    /// Last committed value, readable synchronously.
    committed: RwLock<SystemMap>,
    /// Serialization tail: the last known-good value, advanced only by
    /// successful transitions. Tokio's mutex is fair, so waiters run FIFO.
    tail: AsyncMutex<SystemMap>,
    watchers: StdMutex<Vec<Watcher>>,
}

/// One logical application instance. Cloning yields another handle to the
/// same instance.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    /// Creates an application over an initial system map with default
    /// configuration.
    pub fn create(system: SystemMap) -> Self {
        Self::create_with(system, Config::default())
    }

    /// Creates an application with explicit configuration.
    pub fn create_with(system: SystemMap, config: Config) -> Self {
        Self {
            inner: Arc::new(AppInner {
                config,
                committed: RwLock::new(system.clone()),
                tail: AsyncMutex::new(system),
                watchers: StdMutex::new(Vec::new()),
            }),
        }
    }

    /// The controller's configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Synchronous read of the current committed value.
    pub fn current(&self) -> SystemMap {
        self.inner
            .committed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Schedules `update` strictly after every previously scheduled call.
    ///
    /// The closure receives the last known-good map and must return the next
    /// one. On success the result is committed (watchers fire) and becomes
    /// the new tail; on failure or timeout the tail keeps its pre-call value
    /// and the error goes to this caller only.
    pub async fn schedule<F>(&self, update: F) -> Result<SystemMap, LifecycleError>
    where
        F: FnOnce(SystemMap) -> BoxFuture<'static, Result<SystemMap, LifecycleError>> + Send,
    {
        let mut tail = self.inner.tail.lock().await;
        let fut = update(tail.clone());

        let timeout = self.inner.config.timeout;
        let result = if timeout.is_zero() {
            fut.await
        } else {
            match tokio::time::timeout(timeout, fut).await {
                Ok(settled) => settled,
                Err(_) => Err(LifecycleError::Timeout { timeout }),
            }
        };

        match result {
            Ok(next) => {
                let prev = std::mem::replace(&mut *tail, next.clone());
                *self
                    .inner
                    .committed
                    .write()
                    .unwrap_or_else(|e| e.into_inner()) = next.clone();
                self.notify(&prev, &next);
                Ok(next)
            }
            Err(error) => {
                if self.inner.config.console {
                    eprintln!("[modvisor] transition failed: {}", error.as_message());
                }
                Err(error)
            }
        }
    }

    /// Starts `keys` and their dependencies (`&[]` = all known modules).
    ///
    /// Already-started modules are skipped; the `started` tag is set on each
    /// module brought up.
    pub async fn start(&self, keys: &[&str]) -> Result<SystemMap, LifecycleError> {
        self.elevate(
            keys,
            vec![steps::enter(TAG_STARTED), steps::step("start")],
        )
        .await
    }

    /// Stops `keys` and their dependencies, dependents first (`&[]` = all).
    ///
    /// Never-started modules are skipped; the `started` tag is cleared.
    pub async fn stop(&self, keys: &[&str]) -> Result<SystemMap, LifecycleError> {
        self.degrade(keys, vec![steps::exit(TAG_STARTED), steps::step("stop")])
            .await
    }

    /// Pauses started modules among `keys` and their dependencies (`&[]` =
    /// all). Sets the `paused` tag.
    pub async fn pause(&self, keys: &[&str]) -> Result<SystemMap, LifecycleError> {
        self.degrade(
            keys,
            vec![
                steps::only(TAG_STARTED),
                steps::enter(TAG_PAUSED),
                steps::step("pause"),
            ],
        )
        .await
    }

    /// Resumes paused modules among `keys` and their dependencies (`&[]` =
    /// all). Clears the `paused` tag.
    pub async fn resume(&self, keys: &[&str]) -> Result<SystemMap, LifecycleError> {
        self.elevate(
            keys,
            vec![
                steps::only(TAG_STARTED),
                steps::exit(TAG_PAUSED),
                steps::step("resume"),
            ],
        )
        .await
    }

    /// Merges `modules` into the system map without overwriting existing
    /// fields, then starts exactly the supplied keys.
    pub async fn load(&self, modules: SystemMap) -> Result<SystemMap, LifecycleError> {
        let new_keys: Vec<ModuleKey> = modules.keys().cloned().collect();
        let txs = vec![steps::enter(TAG_STARTED), steps::step("start")];
        self.schedule(move |mut system| {
            Box::pin(async move {
                system.merge_defaults(modules);
                transition::up(system, txs, &new_keys).await
            })
        })
        .await
    }

    /// Merges `modules` in without overwriting existing fields. No modules
    /// are started.
    pub async fn extend(&self, modules: SystemMap) -> Result<SystemMap, LifecycleError> {
        self.schedule(move |mut system| {
            Box::pin(async move {
                system.merge_defaults(modules);
                Ok(system)
            })
        })
        .await
    }

    /// Merges `modules` in, replacing existing modules wholesale. No modules
    /// are started.
    pub async fn override_with(&self, modules: SystemMap) -> Result<SystemMap, LifecycleError> {
        self.schedule(move |mut system| {
            Box::pin(async move {
                system.merge_override(modules);
                Ok(system)
            })
        })
        .await
    }

    /// Registers a change-notification callback fired on every commit.
    /// A watcher registered under an existing name replaces it.
    pub fn watch<F>(&self, name: impl Into<Cow<'static, str>>, f: F)
    where
        F: Fn(&SystemMap, &SystemMap) + Send + Sync + 'static,
    {
        let name = name.into();
        let mut watchers = self.lock_watchers();
        watchers.retain(|w| w.name != name);
        watchers.push(Watcher {
            name,
            callback: Arc::new(f),
        });
    }

    /// Removes a watcher by name.
    pub fn unwatch(&self, name: &str) {
        self.lock_watchers().retain(|w| w.name != name);
    }

    async fn elevate(
        &self,
        keys: &[&str],
        txs: Vec<Interceptor>,
    ) -> Result<SystemMap, LifecycleError> {
        let keys = own_keys(keys);
        self.schedule(move |system| {
            Box::pin(async move {
                let keys = all_if_empty(&system, keys);
                transition::up(system, txs, &keys).await
            })
        })
        .await
    }

    async fn degrade(
        &self,
        keys: &[&str],
        txs: Vec<Interceptor>,
    ) -> Result<SystemMap, LifecycleError> {
        let keys = own_keys(keys);
        self.schedule(move |system| {
            Box::pin(async move {
                let keys = all_if_empty(&system, keys);
                transition::down(system, txs, &keys).await
            })
        })
        .await
    }

    fn notify(&self, old: &SystemMap, new: &SystemMap) {
        let callbacks: Vec<WatchFn> = self
            .lock_watchers()
            .iter()
            .map(|w| w.callback.clone())
            .collect();
        for callback in callbacks {
            callback(old, new);
        }
    }

    fn lock_watchers(&self) -> std::sync::MutexGuard<'_, Vec<Watcher>> {
        self.inner.watchers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn own_keys(keys: &[&str]) -> Vec<ModuleKey> {
    keys.iter().map(|k| ModuleKey::from(*k)).collect()
}

fn all_if_empty(system: &SystemMap, keys: Vec<ModuleKey>) -> Vec<ModuleKey> {
    if keys.is_empty() {
        system.keys().cloned().collect()
    } else {
        keys
    }
}

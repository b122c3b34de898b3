//! # Transition orchestrator: dependency-ordered module pipelines.
//!
//! A transition applies one interceptor chain across an ordered sequence of
//! modules. The orchestrator resolves the order, then drives the interceptor
//! engine once per module under a per-module scope, inside an outer
//! `transition` scope that pauses the event log for the duration.
//!
//! ```text
//! up(system, txs, keys):
//!   inject app-log module (merge, no overwrite) + dep-of-everything
//!   order = resolve_order(keys)              (deps before dependents)
//!   execute "transition" scope: [log_guard, driver]
//!        log_guard.enter  → log.pause()
//!        driver.enter     → for each module: execute per-module scope: txs
//!        driver.leave     → (identity)
//!        log_guard.leave  → log.resume()     (flushes buffered events, FIFO)
//!   on any module fault: unwind → log_guard.error → log.resume(), error kept
//!
//! down(...): same closure, reverse order, no injection
//! tx(...):   exactly the caller's keys, caller order, no closure
//! ```
//!
//! All three return the updated [`SystemMap`] or the first unrecovered error.
//! The caller's original map is untouched on failure — transitions work on
//! the value they were given and the controller only commits successes.

use futures::future::BoxFuture;

use crate::context::{engine, Context, Interceptor};
use crate::error::{LifecycleError, StepError};
use crate::events;
use crate::modules::{resolve_order, ModuleKey, SystemMap};

/// Scope name of the outer per-transition pipeline.
pub const SCOPE_TRANSITION: &str = "transition";

/// Elevation: brings `keys` (and everything they depend on) through `txs`,
/// dependencies first.
///
/// Injects the event log module into the map (added if absent, fields never
/// overwritten) and makes every other module depend on it, so the log is
/// always first up and available in every module's exports.
pub async fn up(
    system: SystemMap,
    txs: Vec<Interceptor>,
    keys: &[ModuleKey],
) -> Result<SystemMap, LifecycleError> {
    let mut system = system;
    events::inject(&mut system);
    let order = resolve_order(&system, keys)?;
    run(system, txs, order).await
}

/// Degradation: tears `keys` (and everything they depend on) through `txs`,
/// dependents first.
///
/// Unlike [`up`], does not inject the event log module — it is paused only
/// when already present.
pub async fn down(
    system: SystemMap,
    txs: Vec<Interceptor>,
    keys: &[ModuleKey],
) -> Result<SystemMap, LifecycleError> {
    let mut order = resolve_order(&system, keys)?;
    order.reverse();
    run(system, txs, order).await
}

/// Applies `txs` to exactly `keys`, preserving caller order, without adding
/// the dependency closure.
pub async fn tx(
    system: SystemMap,
    txs: Vec<Interceptor>,
    keys: &[ModuleKey],
) -> Result<SystemMap, LifecycleError> {
    run(system, txs, keys.to_vec()).await
}

async fn run(
    system: SystemMap,
    txs: Vec<Interceptor>,
    order: Vec<ModuleKey>,
) -> Result<SystemMap, LifecycleError> {
    let mut ctx = Context::new(system);
    let chain = vec![log_guard(), driver(txs, order)];
    engine::execute(&mut ctx, SCOPE_TRANSITION, chain).await?;
    Ok(ctx.into_system())
}

/// Runs the per-module pipeline for each module in order, under a scope
/// named after the module, so the outer `transition` scope and the
/// per-module scope coexist on one record.
fn driver(txs: Vec<Interceptor>, order: Vec<ModuleKey>) -> Interceptor {
    Interceptor::named("modules").on_enter(
        move |ctx: &mut Context| -> BoxFuture<'_, Result<(), StepError>> {
            let txs = txs.clone();
            let order = order.clone();
            Box::pin(async move {
                for key in order {
                    // Prefixed so a module key can never collide with the
                    // outer scope name.
                    let scope = format!("module/{key}");
                    ctx.set_current(Some(key));
                    engine::execute(ctx, scope, txs.clone()).await?;
                }
                ctx.set_current(None);
                Ok(())
            })
        },
    )
}

/// Pauses the event log on enter and resumes it on leave **and** on error,
/// flushing buffered events in publish order either way. The error hook does
/// not clear the captured error — the failure still propagates.
fn log_guard() -> Interceptor {
    fn resume(ctx: &mut Context) -> Result<(), StepError> {
        if let Some(log) = events::app_log(&ctx.system) {
            log.emitter().resume();
        }
        Ok(())
    }

    Interceptor::named("event-log")
        .on_enter_sync(|ctx: &mut Context| {
            if let Some(log) = events::app_log(&ctx.system) {
                log.emitter().pause();
            }
            Ok(())
        })
        .on_leave_sync(resume)
        .on_error_sync(resume)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{app_log, EventDraft, listener, APP_LOG};
    use crate::modules::{steps, Module, State, Update};
    use std::sync::{Arc, Mutex};

    type Trace = Arc<Mutex<Vec<String>>>;

    fn keys(list: &[&str]) -> Vec<ModuleKey> {
        list.iter().map(|k| ModuleKey::from(*k)).collect()
    }

    /// Module whose `start`/`stop` record their invocation.
    fn traced_module(name: &'static str, trace: &Trace) -> Module {
        let (t1, t2) = (trace.clone(), trace.clone());
        Module::new()
            .on_start(move |u: Update| {
                let t = t1.clone();
                async move {
                    t.lock().unwrap().push(format!("start:{name}"));
                    Ok(u.state)
                }
            })
            .on_stop(move |u: Update| {
                let t = t2.clone();
                async move {
                    t.lock().unwrap().push(format!("stop:{name}"));
                    Ok(u.state)
                }
            })
    }

    fn start_chain() -> Vec<Interceptor> {
        vec![steps::enter("started"), steps::step("start")]
    }

    fn stop_chain() -> Vec<Interceptor> {
        vec![steps::exit("started"), steps::step("stop")]
    }

    #[tokio::test]
    async fn test_up_runs_dependencies_first() {
        let trace: Trace = Default::default();
        let system = SystemMap::new()
            .with("db", traced_module("db", &trace))
            .with("cache", traced_module("cache", &trace).with_deps(["db"]))
            .with(
                "web",
                traced_module("web", &trace).with_deps(["cache"]),
            );

        let system = up(system, start_chain(), &keys(&["web"])).await.unwrap();

        assert_eq!(
            trace.lock().unwrap().clone(),
            vec!["start:db", "start:cache", "start:web"]
        );
        for key in ["db", "cache", "web"] {
            assert!(system.get(key).unwrap().has_tag("started"), "{key}");
        }
    }

    #[tokio::test]
    async fn test_down_runs_dependents_first() {
        let trace: Trace = Default::default();
        let system = SystemMap::new()
            .with("db", traced_module("db", &trace))
            .with("web", traced_module("web", &trace).with_deps(["db"]));

        let system = up(system, start_chain(), &keys(&["web"])).await.unwrap();
        trace.lock().unwrap().clear();

        down(system, stop_chain(), &keys(&["web"])).await.unwrap();
        assert_eq!(
            trace.lock().unwrap().clone(),
            vec!["stop:web", "stop:db"]
        );
    }

    #[tokio::test]
    async fn test_tx_preserves_caller_order_without_closure() {
        let trace: Trace = Default::default();
        let system = SystemMap::new()
            .with("db", traced_module("db", &trace))
            .with("web", traced_module("web", &trace).with_deps(["db"]));

        // Exactly the named key, no dependency closure, no injection.
        let system = tx(system, vec![steps::step("start")], &keys(&["web"]))
            .await
            .unwrap();
        assert_eq!(trace.lock().unwrap().clone(), vec!["start:web"]);
        assert!(!system.contains(APP_LOG));
    }

    #[tokio::test]
    async fn test_up_injects_app_log_as_dependency_of_everything() {
        let system = SystemMap::new().with("web", Module::new());
        let system = up(system, start_chain(), &keys(&["web"])).await.unwrap();

        assert!(system.contains(APP_LOG));
        assert!(system.get("web").unwrap().deps().contains(APP_LOG));
        // The log module itself went through the chain.
        assert!(system.get(APP_LOG).unwrap().has_tag("started"));
    }

    #[tokio::test]
    async fn test_log_paused_during_transition_flushed_after() {
        let seen: Trace = Default::default();

        let publisher = Module::new().on_start(|u: Update| async move {
            let log = u.exports.get::<crate::events::AppLog>(APP_LOG)
                .ok_or_else(|| StepError::fail("no app-log export"))?;
            log.put(EventDraft::new("first")).map_err(StepError::fail)?;
            log.put(EventDraft::new("second")).map_err(StepError::fail)?;
            // Delivery is deferred until the transition completes.
            assert_eq!(log.emitter().buffered(), 2);
            Ok(u.state)
        });

        let mut system = SystemMap::new().with("pub", publisher);
        events::inject(&mut system);
        let s = seen.clone();
        app_log(&system)
            .unwrap()
            .on(None, listener(move |ev| {
                s.lock().unwrap().push(ev.kind.to_string());
            }));

        let system = up(system, start_chain(), &keys(&["pub"])).await.unwrap();

        assert_eq!(seen.lock().unwrap().clone(), vec!["first", "second"]);
        assert!(!app_log(&system).unwrap().emitter().is_paused());
    }

    #[tokio::test]
    async fn test_failed_transition_still_flushes_log_and_rejects() {
        let seen: Trace = Default::default();

        let noisy_failure = Module::new().on_start(|u: Update| async move {
            let log = u.exports.get::<crate::events::AppLog>(APP_LOG)
                .ok_or_else(|| StepError::fail("no app-log export"))?;
            log.put(EventDraft::new("about-to-fail")).map_err(StepError::fail)?;
            Err::<State, _>(StepError::fail("boom"))
        });

        let mut system = SystemMap::new().with("bad", noisy_failure);
        events::inject(&mut system);
        let s = seen.clone();
        let log = app_log(&system).unwrap();
        log.on(None, listener(move |ev| {
            s.lock().unwrap().push(ev.kind.to_string());
        }));

        let err = up(system, start_chain(), &keys(&["bad"])).await.unwrap_err();
        assert_eq!(err.as_label(), "step_fault");
        // Buffered events were flushed on the error path.
        assert_eq!(seen.lock().unwrap().clone(), vec!["about-to-fail"]);
        assert!(!log.emitter().is_paused());
    }

    #[tokio::test]
    async fn test_failure_leaves_callers_map_untouched() {
        let trace: Trace = Default::default();
        let original = SystemMap::new()
            .with("ok", traced_module("ok", &trace))
            .with(
                "bad",
                Module::new()
                    .with_deps(["ok"])
                    .on_start(|_| async { Err::<State, _>(StepError::fail("boom")) }),
            );

        let err = up(original.clone(), start_chain(), &keys(&["bad"]))
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "step_fault");

        // "ok" ran before the failure, but only inside the transition's
        // working copy; the caller's value never saw it.
        assert_eq!(trace.lock().unwrap().clone(), vec!["start:ok"]);
        assert!(!original.get("ok").unwrap().has_tag("started"));
        assert!(!original.contains(APP_LOG));
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_any_module_runs() {
        let trace: Trace = Default::default();
        let system = SystemMap::new()
            .with("a", traced_module("a", &trace).with_deps(["b"]))
            .with("b", traced_module("b", &trace).with_deps(["a"]));

        let err = up(system, start_chain(), &keys(&["a"])).await.unwrap_err();
        assert_eq!(err.as_label(), "cyclic_dependency");
        assert!(trace.lock().unwrap().is_empty());
    }
}

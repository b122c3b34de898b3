//! # Reusable step interceptors for module transitions.
//!
//! The transition orchestrator composes these into per-module chains:
//!
//! - [`enter`]`(tag)` — skip the module when `tag` is already set; set `tag`
//!   on the way out. Makes elevation idempotent.
//! - [`exit`]`(tag)` — skip the module when `tag` is absent; clear `tag` on
//!   the way out. Makes degradation idempotent.
//! - [`only`]`(tag)` — read-only guard: skip unless `tag` is set.
//! - [`step`]`(selector)` / [`step_with`] — resolve the module's update
//!   function (against its plugin-extended definition), inject dependency
//!   exports, and store the returned state back into the system map.
//!
//! All of them operate on the module named by the record's *current* key,
//! which the orchestrator sets before driving each per-module pipeline.
//!
//! ## Example
//! ```text
//! start  = up(system,   [enter("started"), step("start")], keys)
//! stop   = down(system, [exit("started"),  step("stop")],  keys)
//! ```

use std::borrow::Cow;

use futures::future::BoxFuture;

use crate::context::{Context, Interceptor};
use crate::error::StepError;

use super::module::{Arg, Args, Selector, Update};

/// Guard for elevation: terminates the module's pipeline when `tag` is
/// already present, and adds `tag` once the pipeline leaves cleanly.
pub fn enter(tag: impl Into<Cow<'static, str>>) -> Interceptor {
    let tag = tag.into();
    let enter_tag = tag.clone();
    let leave_tag = tag.clone();
    Interceptor::named(format!("enter:{tag}"))
        .on_enter_sync(move |ctx: &mut Context| {
            if ctx.current_module()?.has_tag(&enter_tag) {
                ctx.terminate();
            }
            Ok(())
        })
        .on_leave_sync(move |ctx: &mut Context| {
            ctx.current_module_mut()?.add_tag(leave_tag.clone());
            Ok(())
        })
}

/// Guard for degradation: terminates the module's pipeline when `tag` is
/// absent, and removes `tag` once the pipeline leaves cleanly.
pub fn exit(tag: impl Into<Cow<'static, str>>) -> Interceptor {
    let tag = tag.into();
    let enter_tag = tag.clone();
    let leave_tag = tag.clone();
    Interceptor::named(format!("exit:{tag}"))
        .on_enter_sync(move |ctx: &mut Context| {
            if !ctx.current_module()?.has_tag(&enter_tag) {
                ctx.terminate();
            }
            Ok(())
        })
        .on_leave_sync(move |ctx: &mut Context| {
            ctx.current_module_mut()?.remove_tag(&leave_tag);
            Ok(())
        })
}

/// Read-only guard: terminates the module's pipeline unless `tag` is set.
pub fn only(tag: impl Into<Cow<'static, str>>) -> Interceptor {
    let tag = tag.into();
    Interceptor::named(format!("only:{}", tag)).on_enter_sync(move |ctx: &mut Context| {
        if !ctx.current_module()?.has_tag(&tag) {
            ctx.terminate();
        }
        Ok(())
    })
}

/// Runs the module's update function resolved by `selector`.
///
/// No-op when nothing resolves (a module without a `stop` function is simply
/// skipped). Otherwise the update receives the module's state, its
/// dependencies' exports, and its key; the awaited return value becomes the
/// module's new state.
pub fn step(selector: impl Into<Selector>) -> Interceptor {
    step_with(selector, Vec::new())
}

/// Like [`step`], with extra arguments forwarded to the update function.
pub fn step_with(selector: impl Into<Selector>, extra: Vec<Arg>) -> Interceptor {
    let selector = selector.into();
    let args: Args = extra.into();
    let name = match &selector {
        Selector::Field(field) => format!("step:{field}"),
        Selector::Func(_) => "step:fn".to_string(),
    };
    Interceptor::named(name).on_enter(
        move |ctx: &mut Context| -> BoxFuture<'_, Result<(), StepError>> {
            let selector = selector.clone();
            let args = args.clone();
            Box::pin(async move {
                let key = ctx.current_key()?;
                let fut = {
                    let module = ctx.system.get(&key).ok_or_else(|| {
                        StepError::fail(format!("module '{key}' missing from system map"))
                    })?;
                    let Some(update) = module.resolve(&selector) else {
                        return Ok(());
                    };
                    let exports = ctx.system.exports_for(&key)?;
                    update(Update {
                        state: module.state().clone(),
                        exports,
                        key: key.clone(),
                        args,
                    })
                };
                let new_state = fut.await?;
                ctx.system
                    .get_mut(&key)
                    .ok_or_else(|| {
                        StepError::fail(format!("module '{key}' missing from system map"))
                    })?
                    .set_state(new_state);
                Ok(())
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::engine;
    use crate::error::LifecycleError;
    use crate::modules::{Module, ModuleKey, SystemMap};
    use std::sync::{Arc, Mutex};

    async fn run_for(
        system: SystemMap,
        key: &str,
        chain: Vec<Interceptor>,
    ) -> Result<Context, LifecycleError> {
        let mut ctx = Context::new(system);
        ctx.set_current(Some(ModuleKey::from(key)));
        engine::execute(&mut ctx, "module", chain).await?;
        Ok(ctx)
    }

    #[tokio::test]
    async fn test_enter_sets_tag_and_skips_when_present() {
        let calls: Arc<Mutex<u32>> = Default::default();
        let c = calls.clone();
        let system = SystemMap::new().with(
            "m",
            Module::new().on_start(move |u| {
                let c = c.clone();
                async move {
                    *c.lock().unwrap() += 1;
                    Ok(u.state)
                }
            }),
        );

        let chain = vec![enter("started"), step("start")];
        let ctx = run_for(system, "m", chain.clone()).await.unwrap();
        assert!(ctx.system.get("m").unwrap().has_tag("started"));
        assert_eq!(*calls.lock().unwrap(), 1);

        // Second run: the guard terminates before the update runs.
        let ctx = run_for(ctx.into_system(), "m", chain).await.unwrap();
        assert!(ctx.system.get("m").unwrap().has_tag("started"));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_exit_requires_tag_and_clears_it() {
        let calls: Arc<Mutex<u32>> = Default::default();
        let c = calls.clone();
        let system = SystemMap::new().with(
            "m",
            Module::new().on_stop(move |u| {
                let c = c.clone();
                async move {
                    *c.lock().unwrap() += 1;
                    Ok(u.state)
                }
            }),
        );

        let chain = vec![exit("started"), step("stop")];
        // Never started: stop must not run.
        let ctx = run_for(system, "m", chain.clone()).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), 0);

        let mut system = ctx.into_system();
        system.get_mut("m").unwrap().add_tag("started".into());
        let ctx = run_for(system, "m", chain).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(!ctx.system.get("m").unwrap().has_tag("started"));
    }

    #[tokio::test]
    async fn test_only_is_a_read_only_guard() {
        let system = SystemMap::new().with("m", Module::new());
        let witness = Interceptor::named("witness").on_enter_sync(|ctx: &mut Context| {
            ctx.current_module_mut()?.add_tag("reached".into());
            Ok(())
        });

        let ctx = run_for(system, "m", vec![only("started"), witness.clone()])
            .await
            .unwrap();
        assert!(!ctx.system.get("m").unwrap().has_tag("reached"));

        let mut system = ctx.into_system();
        system.get_mut("m").unwrap().add_tag("started".into());
        let ctx = run_for(system, "m", vec![only("started"), witness])
            .await
            .unwrap();
        let m = ctx.system.get("m").unwrap();
        assert!(m.has_tag("reached"));
        // The guard itself never mutates tags.
        assert!(m.has_tag("started"));
    }

    #[tokio::test]
    async fn test_step_injects_exports_and_stores_state() {
        let system = SystemMap::new()
            .with(
                "db",
                Module::new()
                    .with_state("postgres://localhost".to_string())
                    .with_export(|state| state.clone()),
            )
            .with(
                "web",
                Module::new().with_deps(["db"]).on_start(|u: Update| async move {
                    let url = u
                        .exports
                        .get::<String>("db")
                        .ok_or_else(|| StepError::fail("db export missing"))?;
                    Ok(Arc::new(format!("connected to {url}")) as crate::modules::State)
                }),
            );

        let ctx = run_for(system, "web", vec![step("start")]).await.unwrap();
        let state = ctx.system.get("web").unwrap().state_as::<String>().unwrap();
        assert_eq!(state.as_str(), "connected to postgres://localhost");
    }

    #[tokio::test]
    async fn test_step_without_update_function_is_noop() {
        let system = SystemMap::new().with("m", Module::new().with_state(7_u32));
        let ctx = run_for(system, "m", vec![step("start")]).await.unwrap();
        assert_eq!(ctx.system.get("m").unwrap().state_as::<u32>().as_deref(), Some(&7));
    }

    #[tokio::test]
    async fn test_step_failure_is_attributed() {
        let system = SystemMap::new().with(
            "m",
            Module::new()
                .on_start(|_| async { Err::<crate::modules::State, _>(StepError::fail("refused")) }),
        );
        let err = run_for(system, "m", vec![step("start")]).await.unwrap_err();
        match err {
            LifecycleError::Step { interceptor, .. } => {
                assert_eq!(interceptor.as_ref(), "step:start");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_step_with_forwards_extra_args() {
        let system = SystemMap::new().with(
            "m",
            Module::new().on_update("reload", |u: Update| async move {
                let level = u.args[0]
                    .clone()
                    .downcast::<u32>()
                    .map_err(|_| StepError::fail("bad arg"))?;
                Ok(Arc::new(*level) as crate::modules::State)
            }),
        );

        let chain = vec![step_with("reload", vec![Arc::new(3_u32) as Arg])];
        let ctx = run_for(system, "m", chain).await.unwrap();
        assert_eq!(ctx.system.get("m").unwrap().state_as::<u32>().as_deref(), Some(&3));
    }
}

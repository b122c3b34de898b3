//! # Interceptor engine: the pipeline state machine.
//!
//! Drives a chain of interceptors against a [`Context`] under one scope.
//! Per scope, the record carries a FIFO `queue` (not yet entered), a LIFO
//! `stack` (entered, not yet left) and an optional captured `error`; the
//! engine is the only thing that moves interceptors between them.
//!
//! ## State machine
//! ```text
//! entering: queue non-empty
//!     pop head → push stack
//!     error unset → run `enter` (failure is captured, interceptor stays pushed)
//!     error set   → skip hook (interceptor still recorded for unwind)
//! leaving:  queue empty, stack non-empty, error unset
//!     pop top → run `leave` (failure is captured)
//! erroring: queue empty, stack non-empty, error set
//!     pop top → run `error` (may clear the error to recover, or fail anew)
//! done:     both empty
//!     execute() fails with the captured error if present
//! ```
//!
//! Enter order is declared order; leave/error order is the exact reverse, so
//! cleanup for a partially-initialized chain undoes exactly what was
//! initialized. Hook panics are caught and captured like failures (the same
//! isolation the subscriber workers apply to user callbacks).

use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::error::{LifecycleError, Stage, StepError};

use super::interceptor::{Hook, Interceptor};
use super::record::{Context, ScopeName};

/// Runs one *entering* step: pops the queue head, pushes it onto the stack,
/// and invokes its `enter` hook unless an error is already captured.
///
/// Returns `false` (no-op) when the scope's queue is empty.
pub async fn step_enter(ctx: &mut Context, scope: &ScopeName) -> bool {
    let Some(itx) = ctx.pop_queue(scope) else {
        return false;
    };
    ctx.push_stack(scope, itx.clone());
    if ctx.error_in(scope).is_none() {
        if let Some(hook) = itx.hook(Stage::Enter) {
            if let Err(e) = invoke(ctx, scope, &hook).await {
                ctx.capture(scope, itx.name_owned(), Stage::Enter, e);
            }
        }
    }
    true
}

/// Runs one *leaving* or *erroring* step: pops the stack top and invokes its
/// `leave` hook (no captured error) or `error` hook (captured error).
///
/// Returns `false` (no-op) while the queue is non-empty or once the stack is
/// exhausted.
pub async fn step_leave(ctx: &mut Context, scope: &ScopeName) -> bool {
    if ctx.queue_len(scope) > 0 {
        return false;
    }
    let Some(itx) = ctx.pop_stack(scope) else {
        return false;
    };
    let stage = if ctx.error_in(scope).is_some() {
        Stage::Error
    } else {
        Stage::Leave
    };
    if let Some(hook) = itx.hook(stage) {
        if let Err(e) = invoke(ctx, scope, &hook).await {
            ctx.capture(scope, itx.name_owned(), stage, e);
        }
    }
    true
}

/// Runs whichever single step the scope's state calls for.
///
/// Returns `false` once the scope is done.
pub async fn step_any(ctx: &mut Context, scope: &ScopeName) -> bool {
    if ctx.queue_len(scope) > 0 {
        step_enter(ctx, scope).await
    } else {
        step_leave(ctx, scope).await
    }
}

/// Enqueues `txs` under `scope` and runs the pipeline to completion.
///
/// Fails with the captured error if one survives the unwind; otherwise the
/// updated record is left in place and `Ok(())` is returned. The scope's
/// (now empty) entry is removed from the record.
pub async fn execute(
    ctx: &mut Context,
    scope: impl Into<ScopeName>,
    txs: Vec<Interceptor>,
) -> Result<(), LifecycleError> {
    let scope = scope.into();
    ctx.enqueue(scope.clone(), txs);
    while step_any(ctx, &scope).await {}
    let error = ctx.take_error_in(&scope);
    ctx.remove_scope(&scope);
    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Invokes one hook with the scope marked active, converting panics into
/// captured failures.
async fn invoke(ctx: &mut Context, scope: &ScopeName, hook: &Hook) -> Result<(), StepError> {
    let prev = ctx.set_active(Some(scope.clone()));
    // The hook call itself may panic (sync hooks run during future
    // construction), so it happens inside the caught future.
    let result = AssertUnwindSafe(async { hook(ctx).await })
        .catch_unwind()
        .await;
    ctx.set_active(prev);
    match result {
        Ok(r) => r,
        Err(payload) => Err(StepError::Panic {
            info: panic_info(payload),
        }),
    }
}

fn panic_info(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

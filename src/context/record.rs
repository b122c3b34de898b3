//! # Context: the execution record interceptor chains run against.
//!
//! A [`Context`] carries the in-flight [`SystemMap`], the key of the module
//! currently under transition, and any number of named **scopes**. Each scope
//! owns three fields:
//!
//! - `queue` — FIFO of interceptors not yet entered;
//! - `stack` — LIFO of interceptors entered but not yet left;
//! - `error` — the captured failure, if any.
//!
//! Scopes are fully independent: an outer `transition` pipeline and an inner
//! per-module pipeline coexist on one record without interference. The engine
//! tracks which scope a hook is running under, so hooks can call
//! [`Context::terminate`] or [`Context::clear_error`] without naming it.
//!
//! ## Rules
//! - The `error` field of a scope is set only by the engine (capturing a hook
//!   failure) and cleared only by an `error` hook recovering.
//! - `queue`/`stack` are driven by the engine; `enqueue`/`terminate` are the
//!   only mutations exposed to hooks.

use std::collections::{HashMap, VecDeque};

use crate::error::{LifecycleError, Stage, StepError};
use crate::modules::{Module, ModuleKey, SystemMap};

use super::interceptor::Interceptor;

/// Name qualifying which queue/stack/error fields an operation affects.
///
/// Cheap to clone; the orchestrator derives one per module.
pub type ScopeName = std::sync::Arc<str>;

#[derive(Default, Debug)]
struct ScopeState {
    queue: VecDeque<Interceptor>,
    stack: Vec<Interceptor>,
    error: Option<LifecycleError>,
}

/// Mutable execution record for one logical request.
///
/// Created by the transition orchestrator (or directly, for standalone
/// pipelines) and threaded through every hook by `&mut` reference.
#[derive(Debug)]
pub struct Context {
    /// The in-flight system map. Hooks read and write module state through it.
    pub system: SystemMap,
    current: Option<ModuleKey>,
    scopes: HashMap<ScopeName, ScopeState>,
    active: Option<ScopeName>,
}

impl Context {
    /// Creates a record over the given system map with no scopes.
    pub fn new(system: SystemMap) -> Self {
        Self {
            system,
            current: None,
            scopes: HashMap::new(),
            active: None,
        }
    }

    /// Consumes the record, returning the (possibly updated) system map.
    pub fn into_system(self) -> SystemMap {
        self.system
    }

    /// Key of the module currently under transition, if any.
    pub fn current(&self) -> Option<&ModuleKey> {
        self.current.as_ref()
    }

    pub(crate) fn set_current(&mut self, key: Option<ModuleKey>) {
        self.current = key;
    }

    /// Like [`current`](Self::current), but failing when no module is under
    /// transition — for hooks that only make sense per module.
    pub fn current_key(&self) -> Result<ModuleKey, StepError> {
        self.current
            .clone()
            .ok_or_else(|| StepError::fail("no module under transition"))
    }

    /// The module currently under transition.
    pub fn current_module(&self) -> Result<&Module, StepError> {
        let key = self.current_key()?;
        self.system
            .get(&key)
            .ok_or_else(|| StepError::fail(format!("module '{key}' missing from system map")))
    }

    /// Mutable access to the module currently under transition.
    pub fn current_module_mut(&mut self) -> Result<&mut Module, StepError> {
        let key = self.current_key()?;
        self.system
            .get_mut(&key)
            .ok_or_else(|| StepError::fail(format!("module '{key}' missing from system map")))
    }

    // ---------------------------
    // Scope operations
    // ---------------------------

    /// Appends interceptors to the scope's queue, creating the scope if new.
    pub fn enqueue(
        &mut self,
        scope: impl Into<ScopeName>,
        txs: impl IntoIterator<Item = Interceptor>,
    ) {
        self.scopes
            .entry(scope.into())
            .or_default()
            .queue
            .extend(txs);
    }

    /// Empties the active scope's queue: the pipeline proceeds directly to
    /// its leave/error phase. No-op outside a running pipeline.
    pub fn terminate(&mut self) {
        if let Some(scope) = self.active.clone() {
            self.terminate_in(&scope);
        }
    }

    /// Empties the named scope's queue.
    pub fn terminate_in(&mut self, scope: &str) {
        if let Some(s) = self.scopes.get_mut(scope) {
            s.queue.clear();
        }
    }

    /// The failure captured on the active scope, if any.
    pub fn error(&self) -> Option<&LifecycleError> {
        self.active.as_deref().and_then(|s| self.error_in(s))
    }

    /// The failure captured on the named scope, if any.
    pub fn error_in(&self, scope: &str) -> Option<&LifecycleError> {
        self.scopes.get(scope).and_then(|s| s.error.as_ref())
    }

    /// Clears the active scope's captured failure, recovering the pipeline.
    ///
    /// Meant for `error` hooks: after clearing, the remaining stack unwinds
    /// through `leave` hooks as if nothing had failed.
    pub fn clear_error(&mut self) -> Option<LifecycleError> {
        let scope = self.active.clone()?;
        self.take_error_in(&scope)
    }

    pub(crate) fn take_error_in(&mut self, scope: &str) -> Option<LifecycleError> {
        self.scopes.get_mut(scope).and_then(|s| s.error.take())
    }

    /// Records a hook failure on the scope, attributing it to the interceptor
    /// and stage — unless it is an already-attributed inner pipeline failure,
    /// which passes through unchanged.
    pub(crate) fn capture(
        &mut self,
        scope: &str,
        interceptor: std::borrow::Cow<'static, str>,
        stage: Stage,
        err: StepError,
    ) {
        let error = match err {
            StepError::Lifecycle(inner) => *inner,
            other => LifecycleError::Step {
                interceptor,
                stage,
                source: other,
            },
        };
        if let Some(s) = self.scopes.get_mut(scope) {
            s.error = Some(error);
        }
    }

    /// Number of interceptors not yet entered in the scope.
    pub fn queue_len(&self, scope: &str) -> usize {
        self.scopes.get(scope).map_or(0, |s| s.queue.len())
    }

    /// Number of interceptors entered but not yet left in the scope.
    pub fn stack_len(&self, scope: &str) -> usize {
        self.scopes.get(scope).map_or(0, |s| s.stack.len())
    }

    /// True when the scope has nothing left to run.
    pub fn is_done(&self, scope: &str) -> bool {
        self.queue_len(scope) == 0 && self.stack_len(scope) == 0
    }

    /// Scope the currently running hook was invoked under, if any.
    pub fn active_scope(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub(crate) fn set_active(&mut self, scope: Option<ScopeName>) -> Option<ScopeName> {
        std::mem::replace(&mut self.active, scope)
    }

    pub(crate) fn pop_queue(&mut self, scope: &str) -> Option<Interceptor> {
        self.scopes.get_mut(scope).and_then(|s| s.queue.pop_front())
    }

    pub(crate) fn push_stack(&mut self, scope: &str, itx: Interceptor) {
        if let Some(s) = self.scopes.get_mut(scope) {
            s.stack.push(itx);
        }
    }

    pub(crate) fn pop_stack(&mut self, scope: &str) -> Option<Interceptor> {
        self.scopes.get_mut(scope).and_then(|s| s.stack.pop())
    }

    pub(crate) fn remove_scope(&mut self, scope: &str) {
        self.scopes.remove(scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Interceptor;

    fn ctx() -> Context {
        Context::new(SystemMap::new())
    }

    #[test]
    fn test_scopes_are_independent() {
        let mut ctx = ctx();
        ctx.enqueue("outer", vec![Interceptor::named("a"), Interceptor::named("b")]);
        ctx.enqueue("inner", vec![Interceptor::named("c")]);

        assert_eq!(ctx.queue_len("outer"), 2);
        assert_eq!(ctx.queue_len("inner"), 1);

        ctx.terminate_in("outer");
        assert_eq!(ctx.queue_len("outer"), 0);
        assert_eq!(ctx.queue_len("inner"), 1);
    }

    #[test]
    fn test_unknown_scope_is_done() {
        let ctx = ctx();
        assert!(ctx.is_done("nope"));
        assert!(ctx.error_in("nope").is_none());
    }

    #[test]
    fn test_current_key_requires_module() {
        let mut ctx = ctx();
        assert!(ctx.current_key().is_err());
        ctx.set_current(Some("db".into()));
        assert_eq!(ctx.current_key().unwrap().as_ref(), "db");
    }

    #[test]
    fn test_capture_attributes_and_passthrough() {
        let mut ctx = ctx();
        ctx.enqueue("s", Vec::<Interceptor>::new());

        ctx.capture("s", "boom".into(), Stage::Enter, StepError::fail("x"));
        match ctx.error_in("s") {
            Some(LifecycleError::Step { interceptor, .. }) => {
                assert_eq!(interceptor.as_ref(), "boom");
            }
            other => panic!("expected attributed step fault, got {other:?}"),
        }

        let inner = LifecycleError::Timeout {
            timeout: std::time::Duration::from_secs(1),
        };
        ctx.capture("s", "outer".into(), Stage::Enter, StepError::from(inner));
        match ctx.error_in("s") {
            Some(LifecycleError::Timeout { .. }) => {}
            other => panic!("expected passthrough timeout, got {other:?}"),
        }
    }
}

//! # Interceptor: a named bundle of optional enter/leave/error hooks.
//!
//! All three hooks are optional (absent = identity). A hook receives the
//! [`Context`] by mutable reference and returns a future, so it may suspend —
//! the engine awaits it before taking the next step. Hooks built from plain
//! closures via the `*_sync` constructors complete immediately.
//!
//! ## Example
//! ```
//! use modvisor::{Context, Interceptor};
//!
//! let guard = Interceptor::named("guard")
//!     .on_enter_sync(|ctx: &mut Context| {
//!         if ctx.system.contains("db") {
//!             ctx.terminate();
//!         }
//!         Ok(())
//!     });
//! assert_eq!(guard.name(), "guard");
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{Stage, StepError};

use super::record::Context;

/// Type-erased hook: mutates the [`Context`], may suspend, may fail.
pub type Hook =
    Arc<dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<(), StepError>> + Send + Sync>;

/// A named bundle of optional `enter`/`leave`/`error` hooks.
///
/// Cheap to clone (hooks are shared). Enter order along a chain is declared
/// order; leave/error order is the exact reverse of entry.
#[derive(Clone, Default)]
pub struct Interceptor {
    name: Cow<'static, str>,
    enter: Option<Hook>,
    leave: Option<Hook>,
    error: Option<Hook>,
}

impl Interceptor {
    /// Creates an interceptor with the given name and no hooks (identity).
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Interceptor name (used in fault attribution and logs).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installs an async `enter` hook.
    ///
    /// The closure must return a boxed future; annotate the signature to help
    /// inference: `|ctx: &mut Context| -> BoxFuture<'_, Result<(), StepError>>`.
    pub fn on_enter<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<(), StepError>>
            + Send
            + Sync
            + 'static,
    {
        self.enter = Some(Arc::new(f));
        self
    }

    /// Installs an async `leave` hook.
    pub fn on_leave<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<(), StepError>>
            + Send
            + Sync
            + 'static,
    {
        self.leave = Some(Arc::new(f));
        self
    }

    /// Installs an async `error` hook.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<(), StepError>>
            + Send
            + Sync
            + 'static,
    {
        self.error = Some(Arc::new(f));
        self
    }

    /// Installs a synchronous `enter` hook.
    pub fn on_enter_sync<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), StepError> + Send + Sync + 'static,
    {
        self.enter = Some(sync_hook(f));
        self
    }

    /// Installs a synchronous `leave` hook.
    pub fn on_leave_sync<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), StepError> + Send + Sync + 'static,
    {
        self.leave = Some(sync_hook(f));
        self
    }

    /// Installs a synchronous `error` hook.
    pub fn on_error_sync<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), StepError> + Send + Sync + 'static,
    {
        self.error = Some(sync_hook(f));
        self
    }

    pub(crate) fn hook(&self, stage: Stage) -> Option<Hook> {
        match stage {
            Stage::Enter => self.enter.clone(),
            Stage::Leave => self.leave.clone(),
            Stage::Error => self.error.clone(),
        }
    }

    pub(crate) fn name_owned(&self) -> Cow<'static, str> {
        self.name.clone()
    }
}

fn sync_hook<F>(f: F) -> Hook
where
    F: Fn(&mut Context) -> Result<(), StepError> + Send + Sync + 'static,
{
    Arc::new(move |ctx: &mut Context| -> BoxFuture<'_, Result<(), StepError>> {
        let res = f(ctx);
        Box::pin(std::future::ready(res))
    })
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("name", &self.name)
            .field("enter", &self.enter.is_some())
            .field("leave", &self.leave.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

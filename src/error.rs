//! Error types used by the modvisor runtime and module authors.
//!
//! This module defines two main error enums:
//!
//! - [`LifecycleError`] — errors raised by the orchestration runtime itself
//!   (cycles, unknown modules, attributed interceptor faults, timeouts).
//! - [`StepError`] — errors raised inside user-supplied hooks and module
//!   update functions.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for
//! logging/metrics. A [`StepError`] captured by the interceptor engine is
//! attributed to the faulting interceptor and stage and becomes a
//! [`LifecycleError::Step`]; an inner pipeline failure travelling through an
//! outer hook ([`StepError::Lifecycle`]) passes through unwrapped so the
//! innermost attribution survives.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::modules::ModuleKey;

/// Pipeline stage in which an interceptor hook faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The `enter` hook (queue-draining phase).
    Enter,
    /// The `leave` hook (stack-unwinding phase, no captured error).
    Leave,
    /// The `error` hook (stack-unwinding phase with a captured error).
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Enter => f.write_str("enter"),
            Stage::Leave => f.write_str("leave"),
            Stage::Error => f.write_str("error"),
        }
    }
}

/// # Errors produced inside hooks and module update functions.
///
/// These are the failures user code reports back to the engine. The engine
/// wraps them with the faulting interceptor's name and stage; see
/// [`LifecycleError::Step`].
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StepError {
    /// A hook or update function failed with a message.
    #[error("step failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// A hook or update function panicked; the panic was caught and captured.
    #[error("step panicked: {info}")]
    Panic {
        /// Panic payload rendered as text.
        info: String,
    },

    /// An inner pipeline already failed with an attributed lifecycle error.
    ///
    /// Produced when a hook drives a nested interceptor chain (the transition
    /// orchestrator does this once per module) and that chain rejects. The
    /// engine unwraps this variant instead of re-attributing it.
    #[error(transparent)]
    Lifecycle(Box<LifecycleError>),
}

impl StepError {
    /// Creates a [`StepError::Fail`] from any displayable error.
    ///
    /// # Example
    /// ```
    /// use modvisor::StepError;
    ///
    /// let err = StepError::fail("connection refused");
    /// assert_eq!(err.as_label(), "step_failed");
    /// ```
    pub fn fail(error: impl fmt::Display) -> Self {
        StepError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StepError::Fail { .. } => "step_failed",
            StepError::Panic { .. } => "step_panicked",
            StepError::Lifecycle(e) => e.as_label(),
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            StepError::Fail { error } => format!("error: {error}"),
            StepError::Panic { info } => format!("panic: {info}"),
            StepError::Lifecycle(e) => e.as_message(),
        }
    }
}

impl From<LifecycleError> for StepError {
    fn from(e: LifecycleError) -> Self {
        StepError::Lifecycle(Box::new(e))
    }
}

/// # Errors produced by the orchestration runtime.
///
/// Resolver errors ([`Cycle`](LifecycleError::Cycle),
/// [`Unknown`](LifecycleError::Unknown)) are raised eagerly, before any module
/// is touched. [`Step`](LifecycleError::Step) carries the interceptor name and
/// [`Stage`] of the faulting hook. [`Timeout`](LifecycleError::Timeout)
/// originates from the application controller rather than the engine, but
/// propagates identically.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A module dependency chain loops back onto itself.
    #[error("cyclic dependency on '{target}' (path: {})", format_path(.path))]
    Cycle {
        /// The key whose revisit closed the loop.
        target: ModuleKey,
        /// The ancestor path at the moment the loop was detected.
        path: Vec<ModuleKey>,
    },

    /// A declared dependency does not exist in the system map.
    #[error("module '{key}'{} is not defined", format_required_by(.required_by))]
    Unknown {
        /// The undefined key.
        key: ModuleKey,
        /// The module that declared the dependency, if any.
        required_by: Option<ModuleKey>,
    },

    /// A hook faulted; the failure is attributed to interceptor and stage.
    #[error("{stage} hook of interceptor '{interceptor}' failed: {source}")]
    Step {
        /// Name of the faulting interceptor.
        interceptor: Cow<'static, str>,
        /// Stage in which the hook ran.
        stage: Stage,
        /// The captured failure.
        #[source]
        source: StepError,
    },

    /// A scheduled transition did not settle within the configured duration.
    #[error("transition timed out after {timeout:?}")]
    Timeout {
        /// The configured per-transition timeout.
        timeout: Duration,
    },
}

impl LifecycleError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use modvisor::LifecycleError;
    ///
    /// let err = LifecycleError::Timeout { timeout: Duration::from_secs(5) };
    /// assert_eq!(err.as_label(), "transition_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleError::Cycle { .. } => "cyclic_dependency",
            LifecycleError::Unknown { .. } => "unknown_module",
            LifecycleError::Step { .. } => "step_fault",
            LifecycleError::Timeout { .. } => "transition_timeout",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            LifecycleError::Cycle { target, path } => {
                format!("cycle on '{target}' via {}", format_path(path))
            }
            LifecycleError::Unknown { key, required_by } => {
                format!(
                    "module '{key}'{} is not defined",
                    format_required_by(required_by)
                )
            }
            LifecycleError::Step {
                interceptor,
                stage,
                source,
            } => format!("{stage} hook of '{interceptor}': {}", source.as_message()),
            LifecycleError::Timeout { timeout } => format!("timed out after {timeout:?}"),
        }
    }
}

fn format_path(path: &[ModuleKey]) -> String {
    path.iter()
        .map(|k| k.as_ref())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_required_by(required_by: &Option<ModuleKey>) -> String {
    match required_by {
        Some(key) => format!(" required by '{key}'"),
        None => String::new(),
    }
}

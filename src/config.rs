//! # Global runtime configuration.
//!
//! [`Config`] defines the application controller's behavior: per-transition
//! timeout and whether failure diagnostics are surfaced to the developer
//! console.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use modvisor::Config;
//!
//! let mut cfg = Config::default();
//! cfg.timeout = Duration::from_secs(10);
//! cfg.console = false;
//!
//! assert_eq!(cfg.timeout, Duration::from_secs(10));
//! ```

use std::time::Duration;

/// Global configuration for the application lifecycle controller.
///
/// Controls how long a scheduled transition may run before it is abandoned,
/// and whether failed/timed-out transitions print a diagnostic line.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum duration a scheduled transition may take before it is
    /// abandoned and its caller receives a timeout error (0 = no timeout).
    pub timeout: Duration,
    /// Print a one-line diagnostic to stderr when a transition fails or
    /// times out.
    pub console: bool,
}

impl Default for Config {
    /// Provides a default configuration:
    /// - `timeout = 5s`
    /// - `console = true`
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            console: true,
        }
    }
}

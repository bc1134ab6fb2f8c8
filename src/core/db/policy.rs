/// Error Policy Module
///
/// A single process-wide choice, made once per executor: surface typed errors
/// to the caller, or report the failure and halt the process. The default is
/// terminate-and-report, matching the single-connection, single-request
/// lifetime this layer is built for. Internally everything is a plain
/// `Result`; the policy is applied only at the public entry points.

use crate::core::{DbError, Result};
use std::io::Write;
use tracing::error;

/// Failure-propagation switch derived from `Config::throw_on_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Report the failure and halt the process (default)
    #[default]
    Terminate,
    /// Surface the failure to the caller as a typed error
    Throw,
}

impl ErrorPolicy {
    pub fn from_config(throw_on_error: bool) -> Self {
        if throw_on_error {
            ErrorPolicy::Throw
        } else {
            ErrorPolicy::Terminate
        }
    }

    /// Routes an internal failure according to the policy. Under `Throw` the
    /// error is returned; under `Terminate` this call does not return.
    pub fn check<T>(self, err: DbError) -> Result<T> {
        match self {
            ErrorPolicy::Throw => Err(err),
            ErrorPolicy::Terminate => report_and_terminate(&err),
        }
    }
}

/// Reports the failure on the operator-visible channel and halts.
fn report_and_terminate(err: &DbError) -> ! {
    error!("fatal database error: {err}");
    // Write stderr directly as well, so the message survives environments
    // that install their own output capture around the logging layer.
    let _ = writeln!(std::io::stderr(), "fatal database error: {err}");
    std::process::exit(1);
}

/// chatdb Error Module
///
/// This module defines the error taxonomy for the database access layer.
/// Every failure is classified by the phase it occurred in, so callers can
/// distinguish a dead connection from a malformed call site.
use thiserror::Error;

/// Error type covering every failure the database layer can produce.
///
/// The four variants map to the four phases of a query's life:
/// - `Connection`: the driver is unavailable or the connect call failed
/// - `Prepare`: statement compilation failed
/// - `Execute`: execution failed; carries the driver diagnostic text
/// - `Usage`: the call itself was malformed (bad option value, binding style
///   mismatch, broken table-marker syntax) — always detected before any
///   mutating execution
#[derive(Error, Debug)]
pub enum DbError {
    /// Driver unavailable or connect failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement compilation failure
    #[error("Prepare error: {0}")]
    Prepare(String),

    /// Execution failure with driver-level diagnostic payload
    #[error("Execute error: {0}")]
    Execute(String),

    /// Invalid call-level option or inconsistent binding style
    #[error("Usage error: {0}")]
    Usage(String),
}

/// Type alias for Result to use DbError as the error type.
///
/// This provides a consistent error type across the entire layer instead of
/// mixing `Result<T, String>` with driver error types.
pub type Result<T> = std::result::Result<T, DbError>;

/// Core Module for the chatdb access layer
///
/// This module contains the fundamental components that form the backbone
/// of the database layer: error handling and the database subsystem itself
/// (connection lifecycle, statement caching, templating, query execution).

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DbError, Result};

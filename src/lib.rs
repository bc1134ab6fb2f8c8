// Core infrastructure modules
pub mod core;

// Configuration loading
pub mod config;

// Re-export the public query surface at the crate root for convenience
pub use crate::config::{load_config, Config};
pub use crate::core::db::{
    Bindings, ErrorPolicy, FetchShape, QueryExecutor, QueryOptions, ResultSet, ReturnMode, Row,
    Value,
};
pub use crate::core::{DbError, Result};

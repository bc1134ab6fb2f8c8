/// Database Module
///
/// This module provides the data-access core for the chat-support backend,
/// organized into focused submodules:
///
/// - **Connection Management** (`connection.rs`): one lazily-opened connection
///   per manager, with explicit teardown
/// - **Table-Name Templating** (`template.rs`): `{name}` markers resolved to
///   `prefix + name` before any statement is prepared or cached
/// - **Statement Caching** (`cache.rs`): compiled statements keyed by a hash
///   of the final SQL text, never evicted before teardown
/// - **Query Execution** (`query.rs`): the uniform query contract (bindings,
///   return mode, fetch shape) plus last-statement introspection
/// - **Error Policy** (`policy.rs`): the switch between surfacing typed
///   errors and reporting-then-terminating
///
/// ## Error Handling
///
/// All operations use the shared `DbError` type. Whether a failure is
/// returned to the caller or halts the process is decided once, by the
/// executor's `ErrorPolicy`.
pub mod cache;
pub mod connection;
pub mod policy;
pub mod query;
pub mod template;

pub use cache::*;
pub use connection::*;
pub use policy::*;
pub use query::*;
pub use template::*;

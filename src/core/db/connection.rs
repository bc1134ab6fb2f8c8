/// Connection Management Module
///
/// This module owns the single live database connection for the layer. The
/// connection is opened lazily on first use, reused by every subsequent call,
/// and released by an explicit teardown that also clears the statement cache.
/// The manager is an explicit handle, constructed once by the owning process
/// and passed to whatever needs database access; there is no global state.

use crate::config::Config;
use crate::core::db::cache::StatementCache;
use crate::core::{DbError, Result};
use rusqlite::Connection;
use tracing::info;

/// Owns the configuration, the lazily-established connection, and the
/// statement cache tied to that connection's lifetime.
///
/// Usage is single-threaded; callers needing concurrency wrap the manager in
/// a mutex or instantiate one per thread.
#[derive(Debug)]
pub struct ConnectionManager {
    config: Config,
    connection: Option<Connection>,
    cache: StatementCache,
}

impl ConnectionManager {
    /// Creates a manager from an immutable configuration. No connection is
    /// opened until the first call that needs one.
    pub fn new(config: Config) -> Self {
        ConnectionManager {
            config,
            connection: None,
            cache: StatementCache::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the live connection, establishing it on first use.
    ///
    /// Idempotent: an already-open connection is returned as-is. After a
    /// teardown the next call opens a fresh one (re-entrant lazy init).
    pub fn connection(&mut self) -> Result<&Connection> {
        if self.connection.is_none() {
            self.connect()?;
        }
        self.connection
            .as_ref()
            .ok_or_else(|| DbError::Connection("connection unavailable".to_string()))
    }

    /// Registers `final_sql` in the statement cache (compiling it on first
    /// sight) and returns its cache key together with the compiled handle.
    pub fn statement(&mut self, final_sql: &str) -> Result<(u64, rusqlite::CachedStatement<'_>)> {
        if self.connection.is_none() {
            self.connect()?;
        }
        let conn = self
            .connection
            .as_ref()
            .ok_or_else(|| DbError::Connection("connection unavailable".to_string()))?;

        let key = self.cache.register(conn, final_sql)?;
        let stmt = conn
            .prepare_cached(final_sql)
            .map_err(|e| DbError::Prepare(e.to_string()))?;
        Ok((key, stmt))
    }

    /// Releases the connection and drops every cached statement.
    ///
    /// The next `connection()` call re-establishes a fresh connection with an
    /// empty cache, behaving exactly like a newly constructed manager.
    pub fn teardown(&mut self) {
        self.cache.clear();
        if self.connection.take().is_some() {
            info!(database = %self.config.database, "database connection released");
        }
    }

    /// Checks whether a connection is currently established.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Number of distinct statements compiled on the current connection.
    pub fn cached_statement_count(&self) -> usize {
        self.cache.len()
    }

    fn connect(&mut self) -> Result<()> {
        let conn = Connection::open(&self.config.database)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| DbError::Connection(e.to_string()))?;

        if self.config.force_encoding {
            if let Some(encoding) = &self.config.encoding {
                conn.pragma_update(None, "encoding", encoding.as_str())
                    .map_err(|e| DbError::Connection(e.to_string()))?;
            }
        }

        conn.set_prepared_statement_cache_capacity(self.cache.capacity());

        info!(database = %self.config.database, "database connection established");
        self.connection = Some(conn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> Config {
        Config::new(":memory:")
    }

    #[test]
    fn test_connection_is_lazy() {
        let mut manager = ConnectionManager::new(memory_config());
        assert!(!manager.is_connected());

        manager.connection().unwrap();
        assert!(manager.is_connected());
    }

    #[test]
    fn test_connection_is_idempotent() {
        let mut manager = ConnectionManager::new(memory_config());

        manager
            .connection()
            .unwrap()
            .execute_batch("CREATE TABLE t (id INTEGER)")
            .unwrap();
        // Second call must hand back the same connection, so the table is
        // still visible.
        let count: i64 = manager
            .connection()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 't'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_connect_failure_is_connection_error() {
        let mut manager = ConnectionManager::new(Config::new("/nonexistent/path/database.db"));
        match manager.connection() {
            Err(DbError::Connection(_)) => {}
            other => panic!("Expected Connection error, got {other:?}"),
        }
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_teardown_clears_connection_and_cache() {
        let mut manager = ConnectionManager::new(memory_config());
        manager
            .connection()
            .unwrap()
            .execute_batch("CREATE TABLE t (id INTEGER)")
            .unwrap();
        manager.statement("SELECT * FROM t").unwrap();
        assert_eq!(manager.cached_statement_count(), 1);

        manager.teardown();
        assert!(!manager.is_connected());
        assert_eq!(manager.cached_statement_count(), 0);

        // Re-entrant lazy init: next use opens a fresh connection.
        manager.connection().unwrap();
        assert!(manager.is_connected());
    }

    #[test]
    fn test_statement_registers_once() {
        let mut manager = ConnectionManager::new(memory_config());
        manager
            .connection()
            .unwrap()
            .execute_batch("CREATE TABLE t (id INTEGER)")
            .unwrap();

        let (first_key, _) = manager.statement("SELECT id FROM t").unwrap();
        let (second_key, _) = manager.statement("SELECT id FROM t").unwrap();
        assert_eq!(first_key, second_key);
        assert_eq!(manager.cached_statement_count(), 1);
    }

    #[test]
    fn test_forced_encoding_applied_on_connect() {
        let mut config = memory_config();
        config.encoding = Some("UTF-8".to_string());
        config.force_encoding = true;

        let mut manager = ConnectionManager::new(config);
        let encoding: String = manager
            .connection()
            .unwrap()
            .query_row("PRAGMA encoding", [], |row| row.get(0))
            .unwrap();
        assert_eq!(encoding, "UTF-8");
    }
}

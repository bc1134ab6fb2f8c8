/// Statement Cache Module
///
/// Compiled statements are deduplicated by a content hash of the final
/// (post-templating) SQL text. The compiled handles themselves live in the
/// driver's prepared-statement cache on the connection; this module keeps the
/// authoritative key registry on top of it and guarantees create-or-reuse
/// semantics for the whole lifetime of the connection.

use crate::core::{DbError, Result};
use rusqlite::Connection;
use std::collections::hash_map::{DefaultHasher, Entry};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tracing::debug;

/// Initial driver-side cache capacity; grown before it can ever evict.
const INITIAL_CAPACITY: usize = 64;

/// Record of a compiled statement: the cache key and the exact SQL text that
/// produced it. Identifies the driver-side handle without owning it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedStatement {
    /// Content hash of the final SQL text
    pub key: u64,
    /// The final SQL text itself
    pub sql: String,
}

/// Computes the cache key for a piece of final SQL text.
pub fn statement_key(final_sql: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    final_sql.hash(&mut hasher);
    hasher.finish()
}

/// Registry of every statement compiled on the current connection.
///
/// Entries are created on first occurrence of a given final SQL text and are
/// never evicted or invalidated before teardown; a schema change that would
/// require re-preparation requires a full teardown.
#[derive(Debug)]
pub struct StatementCache {
    entries: HashMap<u64, CachedStatement>,
    capacity: usize,
}

impl Default for StatementCache {
    fn default() -> Self {
        StatementCache::new()
    }
}

impl StatementCache {
    pub fn new() -> Self {
        StatementCache {
            entries: HashMap::new(),
            capacity: INITIAL_CAPACITY,
        }
    }

    /// Returns the cache key for `final_sql`, compiling the statement on the
    /// given connection if this text has not been seen before.
    ///
    /// The first occurrence compiles immediately so that a broken statement
    /// surfaces as `DbError::Prepare` here, not later at execution time.
    /// Subsequent occurrences are pure lookups.
    pub fn register(&mut self, conn: &Connection, final_sql: &str) -> Result<u64> {
        let key = statement_key(final_sql);
        match self.entries.entry(key) {
            Entry::Occupied(existing) => {
                // A key always corresponds to exactly the text that produced it.
                debug_assert_eq!(existing.get().sql, final_sql);
                Ok(key)
            }
            Entry::Vacant(slot) => {
                conn.prepare_cached(final_sql)
                    .map_err(|e| DbError::Prepare(e.to_string()))?;
                slot.insert(CachedStatement {
                    key,
                    sql: final_sql.to_string(),
                });
                if self.entries.len() >= self.capacity {
                    // Stay ahead of the driver-side LRU so nothing is evicted.
                    self.capacity *= 2;
                    conn.set_prepared_statement_cache_capacity(self.capacity);
                }
                debug!(key, "compiled and cached statement");
                Ok(key)
            }
        }
    }

    /// Looks up the record for a previously registered key.
    pub fn get(&self, key: u64) -> Option<&CachedStatement> {
        self.entries.get(&key)
    }

    /// Number of distinct statements compiled on the current connection.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Driver-side cache capacity to request on a fresh connection.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every entry. Only called on teardown, when the connection that
    /// compiled the statements is going away too.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.capacity = INITIAL_CAPACITY;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE chat_sessions (id INTEGER PRIMARY KEY, state TEXT);")
            .unwrap();
        conn
    }

    #[test]
    fn test_identical_text_reuses_entry() {
        let conn = test_conn();
        let mut cache = StatementCache::new();

        let first = cache
            .register(&conn, "SELECT * FROM chat_sessions")
            .unwrap();
        let second = cache
            .register(&conn, "SELECT * FROM chat_sessions")
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_text_gets_distinct_entries() {
        let conn = test_conn();
        let mut cache = StatementCache::new();

        cache
            .register(&conn, "SELECT id FROM chat_sessions")
            .unwrap();
        cache
            .register(&conn, "SELECT state FROM chat_sessions")
            .unwrap();

        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_key_matches_content_hash() {
        let conn = test_conn();
        let mut cache = StatementCache::new();

        let sql = "SELECT id FROM chat_sessions WHERE state = ?";
        let key = cache.register(&conn, sql).unwrap();
        assert_eq!(key, statement_key(sql));
        assert_eq!(cache.get(key).unwrap().sql, sql);
    }

    #[test]
    fn test_broken_statement_is_prepare_error() {
        let conn = test_conn();
        let mut cache = StatementCache::new();

        let result = cache.register(&conn, "SELECT * FORM chat_sessions");
        match result.unwrap_err() {
            DbError::Prepare(msg) => assert!(msg.contains("syntax error")),
            other => panic!("Expected Prepare error, got {other:?}"),
        }
        // Nothing is cached for a statement that never compiled.
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_empties_cache() {
        let conn = test_conn();
        let mut cache = StatementCache::new();

        cache
            .register(&conn, "SELECT * FROM chat_sessions")
            .unwrap();
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_grows_past_initial() {
        let conn = test_conn();
        let mut cache = StatementCache::new();

        for i in 0..INITIAL_CAPACITY + 1 {
            let sql = format!("SELECT id FROM chat_sessions LIMIT {i}");
            cache.register(&conn, &sql).unwrap();
        }
        assert!(cache.capacity() > INITIAL_CAPACITY);
        assert_eq!(cache.len(), INITIAL_CAPACITY + 1);
    }
}

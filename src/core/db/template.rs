/// Table-Name Templating Module
///
/// Queries name logical tables with a `{identifier}` marker. Before a
/// statement is prepared or cached, every marker is replaced with the
/// configured prefix followed by the identifier, so the cache key always
/// reflects the fully resolved text.

use crate::core::{DbError, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static TABLE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("marker pattern is valid"));

/// Resolves `{identifier}` table markers in a SQL template to
/// `prefix + identifier`.
///
/// Pure and deterministic: the output depends only on the template and the
/// prefix, never on binding values or external state. Braces in the template
/// that do not form a well-formed marker are malformed syntax and yield
/// `DbError::Usage`; the prefix itself is concatenated verbatim, whatever
/// characters it contains.
///
/// # Examples
///
/// ```
/// use chatdb::core::db::resolve_table_names;
///
/// let sql = resolve_table_names("SELECT * FROM {sessions}", "chat_").unwrap();
/// assert_eq!(sql, "SELECT * FROM chat_sessions");
/// ```
pub fn resolve_table_names(sql: &str, prefix: &str) -> Result<String> {
    // Malformed-marker check runs against the template with well-formed
    // markers removed, so a brace-bearing prefix cannot trip it.
    let stripped = TABLE_MARKER.replace_all(sql, "");
    if stripped.contains('{') || stripped.contains('}') {
        return Err(DbError::Usage(format!(
            "malformed table marker syntax in query: {sql}"
        )));
    }

    // Closure replacement: literal prefix, no $-group expansion.
    let resolved = TABLE_MARKER.replace_all(sql, |caps: &Captures| {
        format!("{}{}", prefix, &caps[1])
    });
    Ok(resolved.into_owned())
}

/// Query Execution Module
///
/// This module provides the uniform query contract for the layer: one entry
/// point that resolves table markers, obtains the cached statement, binds
/// values, executes, and shapes the result per the caller's options. It also
/// tracks the most recently executed statement for introspection (last error,
/// affected-row count).

use crate::config::Config;
use crate::core::db::connection::ConnectionManager;
use crate::core::db::policy::ErrorPolicy;
use crate::core::db::template::resolve_table_names;
use crate::core::{DbError, Result};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Statement};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A single database value, typed by the driver's storage classes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    fn from_ref(value: ValueRef<'_>) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).to_string()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(t) => write!(f, "{t}"),
            Value::Blob(b) => write!(f, "<BLOB: {} bytes>", b.len()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Borrowed(ValueRef::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Integer(i64::from(b))
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

/// Binding values for one call: positional (ordered) or named (keyed),
/// mutually exclusive by construction. Named keys are accepted with or
/// without the leading `:`.
#[derive(Debug, Clone, Default)]
pub enum Bindings {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Bindings {
    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Bindings::Positional(values.into_iter().collect())
    }

    pub fn named<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Bindings::Named(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Whether a query yields no rows, exactly one row, or all matching rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnMode {
    /// Execute only; a successful call yields `ResultSet::Status(true)`
    #[default]
    None,
    /// Fetch exactly one row, or the absent-row marker if none matched
    One,
    /// Fetch the full ordered sequence of matching rows
    All,
}

impl FromStr for ReturnMode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ReturnMode::None),
            "one" => Ok(ReturnMode::One),
            "all" => Ok(ReturnMode::All),
            other => Err(DbError::Usage(format!("unrecognized return mode: {other}"))),
        }
    }
}

/// Indexing style of returned row data: by column name, by position, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchShape {
    /// Mapping from column name to value (default)
    #[default]
    Assoc,
    /// Ordered sequence indexed by column position
    Numeric,
    /// Values reachable under both column names and positions
    Both,
}

impl FromStr for FetchShape {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "assoc" => Ok(FetchShape::Assoc),
            "numeric" | "num" => Ok(FetchShape::Numeric),
            "both" => Ok(FetchShape::Both),
            other => Err(DbError::Usage(format!("unrecognized fetch shape: {other}"))),
        }
    }
}

/// Call-level options: return mode plus fetch shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions {
    pub return_mode: ReturnMode,
    pub fetch_shape: FetchShape,
}

impl QueryOptions {
    /// Fetch all matching rows with the default associative shape.
    pub fn rows() -> Self {
        QueryOptions {
            return_mode: ReturnMode::All,
            fetch_shape: FetchShape::default(),
        }
    }

    /// Fetch a single row with the default associative shape.
    pub fn row() -> Self {
        QueryOptions {
            return_mode: ReturnMode::One,
            fetch_shape: FetchShape::default(),
        }
    }

    pub fn with_shape(mut self, shape: FetchShape) -> Self {
        self.fetch_shape = shape;
        self
    }

    /// Parses textual option values, rejecting unrecognized ones with
    /// `DbError::Usage` before any database work happens.
    pub fn parse(return_mode: &str, fetch_shape: &str) -> Result<Self> {
        Ok(QueryOptions {
            return_mode: return_mode.parse()?,
            fetch_shape: fetch_shape.parse()?,
        })
    }
}

/// One row of results, shaped per the call's fetch shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Assoc(HashMap<String, Value>),
    Numeric(Vec<Value>),
    Both { names: Vec<String>, values: Vec<Value> },
}

impl Row {
    fn shaped(shape: FetchShape, columns: &[String], values: Vec<Value>) -> Row {
        match shape {
            FetchShape::Assoc => Row::Assoc(columns.iter().cloned().zip(values).collect()),
            FetchShape::Numeric => Row::Numeric(values),
            FetchShape::Both => Row::Both {
                names: columns.to_vec(),
                values,
            },
        }
    }

    /// Looks a value up by column name. `None` for numeric-shaped rows.
    pub fn get(&self, column: &str) -> Option<&Value> {
        match self {
            Row::Assoc(map) => map.get(column),
            Row::Numeric(_) => None,
            Row::Both { names, values } => names
                .iter()
                .position(|name| name == column)
                .and_then(|i| values.get(i)),
        }
    }

    /// Looks a value up by column position. `None` for assoc-shaped rows.
    pub fn at(&self, index: usize) -> Option<&Value> {
        match self {
            Row::Assoc(_) => None,
            Row::Numeric(values) => values.get(index),
            Row::Both { values, .. } => values.get(index),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Row::Assoc(map) => map.len(),
            Row::Numeric(values) => values.len(),
            Row::Both { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of one query call, shaped per the call's return mode.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultSet {
    /// `ReturnMode::None`: the success flag
    Status(bool),
    /// `ReturnMode::One`: the row, or the absent-row marker
    One(Option<Row>),
    /// `ReturnMode::All`: the ordered sequence of matching rows
    All(Vec<Row>),
}

/// Record of the most recently executed statement. Identifies the cached
/// statement by key; does not own it.
#[derive(Debug, Clone)]
struct LastStatement {
    key: u64,
    affected: usize,
    error: Option<String>,
}

enum Outcome {
    Affected(usize),
    Rows(Vec<Row>),
}

/// Orchestrates every query: resolve table markers, obtain the cached
/// statement, bind, execute, shape the result, and route failures through
/// the error policy.
#[derive(Debug)]
pub struct QueryExecutor {
    manager: ConnectionManager,
    policy: ErrorPolicy,
    last: Option<LastStatement>,
}

impl QueryExecutor {
    /// Builds an executor from an immutable configuration. The error policy
    /// is fixed here, once, from `Config::throw_on_error`.
    pub fn new(config: Config) -> Self {
        let policy = ErrorPolicy::from_config(config.throw_on_error);
        QueryExecutor {
            manager: ConnectionManager::new(config),
            policy,
            last: None,
        }
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Number of distinct statements compiled on the current connection.
    pub fn cached_statement_count(&self) -> usize {
        self.manager.cached_statement_count()
    }

    /// Executes one query against the shared connection.
    ///
    /// The template's `{table}` markers are resolved first, then the final
    /// text is looked up in (or added to) the statement cache, bindings are
    /// validated against the statement's placeholder style, and the result is
    /// shaped per `options`. Failures are routed through the error policy:
    /// under `Throw` they come back as typed errors, under `Terminate` this
    /// call reports and halts instead of returning.
    pub fn query(
        &mut self,
        sql: &str,
        bindings: Bindings,
        options: QueryOptions,
    ) -> Result<ResultSet> {
        match self.run_query(sql, &bindings, options) {
            Ok(result) => Ok(result),
            Err(err) => self.policy.check(err),
        }
    }

    /// Executes a statement for its side effects (`ReturnMode::None`),
    /// yielding the success flag.
    pub fn execute(&mut self, sql: &str, bindings: Bindings) -> Result<bool> {
        match self.query(sql, bindings, QueryOptions::default())? {
            ResultSet::Status(ok) => Ok(ok),
            _ => Ok(true),
        }
    }

    /// Driver diagnostic for the most recently executed statement.
    ///
    /// `None` until a statement has run. Afterwards: the captured diagnostic
    /// if the statement failed, or the driver's clean-state message if it
    /// succeeded.
    pub fn last_error_info(&self) -> Option<String> {
        self.last.as_ref().map(|last| {
            last.error
                .clone()
                .unwrap_or_else(|| "not an error".to_string())
        })
    }

    /// Row count mutated by the most recently executed statement, or `None`
    /// if no statement has run yet. Row-returning statements report 0.
    pub fn affected_row_count(&self) -> Option<usize> {
        self.last.as_ref().map(|last| last.affected)
    }

    /// Identifier generated by the most recent insert on the current
    /// connection.
    pub fn last_inserted_id(&mut self) -> Result<i64> {
        match self.manager.connection() {
            Ok(conn) => Ok(conn.last_insert_rowid()),
            Err(err) => self.policy.check(err),
        }
    }

    /// Cache key of the most recently executed statement, if any.
    pub fn last_statement_key(&self) -> Option<u64> {
        self.last.as_ref().map(|last| last.key)
    }

    /// Releases the connection, the statement cache, and the last-statement
    /// record. The next query transparently re-establishes everything.
    pub fn teardown(&mut self) {
        self.last = None;
        self.manager.teardown();
    }

    fn run_query(
        &mut self,
        sql: &str,
        bindings: &Bindings,
        options: QueryOptions,
    ) -> Result<ResultSet> {
        let final_sql = resolve_table_names(sql, &self.manager.config().table_prefix)?;
        let (key, mut stmt) = self.manager.statement(&final_sql)?;

        check_binding_style(&stmt, bindings)?;

        let outcome = match options.return_mode {
            ReturnMode::None => {
                if stmt.column_count() > 0 {
                    // Row-returning statement executed for effect only: step
                    // through it fully and discard the rows.
                    run_rows(&mut stmt, bindings, FetchShape::Numeric, None)
                        .map(|_| Outcome::Affected(0))
                } else {
                    run_execute(&mut stmt, bindings).map(Outcome::Affected)
                }
            }
            ReturnMode::One => {
                run_rows(&mut stmt, bindings, options.fetch_shape, Some(1)).map(Outcome::Rows)
            }
            ReturnMode::All => {
                run_rows(&mut stmt, bindings, options.fetch_shape, None).map(Outcome::Rows)
            }
        };
        drop(stmt);

        match outcome {
            Ok(Outcome::Affected(affected)) => {
                self.last = Some(LastStatement {
                    key,
                    affected,
                    error: None,
                });
                Ok(ResultSet::Status(true))
            }
            Ok(Outcome::Rows(rows)) => {
                self.last = Some(LastStatement {
                    key,
                    affected: 0,
                    error: None,
                });
                Ok(match options.return_mode {
                    ReturnMode::One => ResultSet::One(rows.into_iter().next()),
                    _ => ResultSet::All(rows),
                })
            }
            Err(e) => {
                let err = classify_driver_error(e);
                if let DbError::Execute(msg) = &err {
                    self.last = Some(LastStatement {
                        key,
                        affected: 0,
                        error: Some(msg.clone()),
                    });
                }
                Err(err)
            }
        }
    }
}

/// Validates the binding style against the statement's placeholders before
/// anything executes: named values for named placeholders, positional values
/// for positional ones, arity matching on both.
fn check_binding_style(stmt: &Statement<'_>, bindings: &Bindings) -> Result<()> {
    let expected = stmt.parameter_count();
    let named_style = (1..=expected).any(|i| {
        stmt.parameter_name(i)
            .map_or(false, |n| n.starts_with(':') || n.starts_with('@') || n.starts_with('$'))
    });

    match bindings {
        Bindings::None => {
            if expected == 0 {
                Ok(())
            } else {
                Err(DbError::Usage(format!(
                    "statement expects {expected} parameters but no bindings were supplied"
                )))
            }
        }
        Bindings::Positional(values) => {
            if named_style {
                Err(DbError::Usage(
                    "positional bindings supplied for a statement with named placeholders"
                        .to_string(),
                ))
            } else if values.len() != expected {
                Err(DbError::Usage(format!(
                    "statement expects {expected} parameters, got {}",
                    values.len()
                )))
            } else {
                Ok(())
            }
        }
        Bindings::Named(pairs) => {
            if pairs.is_empty() && expected == 0 {
                Ok(())
            } else if expected == 0 {
                Err(DbError::Usage(
                    "named bindings supplied for a statement without parameters".to_string(),
                ))
            } else if !named_style {
                Err(DbError::Usage(
                    "named bindings supplied for a statement with positional placeholders"
                        .to_string(),
                ))
            } else if pairs.len() != expected {
                Err(DbError::Usage(format!(
                    "statement expects {expected} named parameters, got {}",
                    pairs.len()
                )))
            } else {
                Ok(())
            }
        }
    }
}

fn normalize_param_name(name: &str) -> String {
    if name.starts_with(':') || name.starts_with('@') || name.starts_with('$') {
        name.to_string()
    } else {
        format!(":{name}")
    }
}

fn run_execute(stmt: &mut Statement<'_>, bindings: &Bindings) -> rusqlite::Result<usize> {
    match bindings {
        Bindings::None => stmt.execute([]),
        Bindings::Positional(values) => stmt.execute(params_from_iter(values.iter())),
        Bindings::Named(pairs) => {
            let names: Vec<String> = pairs.iter().map(|(n, _)| normalize_param_name(n)).collect();
            let refs: Vec<(&str, &dyn ToSql)> = names
                .iter()
                .map(String::as_str)
                .zip(pairs.iter().map(|(_, v)| v as &dyn ToSql))
                .collect();
            stmt.execute(refs.as_slice())
        }
    }
}

fn run_rows(
    stmt: &mut Statement<'_>,
    bindings: &Bindings,
    shape: FetchShape,
    limit: Option<usize>,
) -> rusqlite::Result<Vec<Row>> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let column_count = stmt.column_count();

    let mut rows = match bindings {
        Bindings::None => stmt.query([]),
        Bindings::Positional(values) => stmt.query(params_from_iter(values.iter())),
        Bindings::Named(pairs) => {
            let names: Vec<String> = pairs.iter().map(|(n, _)| normalize_param_name(n)).collect();
            let refs: Vec<(&str, &dyn ToSql)> = names
                .iter()
                .map(String::as_str)
                .zip(pairs.iter().map(|(_, v)| v as &dyn ToSql))
                .collect();
            stmt.query(refs.as_slice())
        }
    }?;

    let mut shaped = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(Value::from_ref(row.get_ref(i)?));
        }
        shaped.push(Row::shaped(shape, &columns, values));
        if limit.is_some_and(|n| shaped.len() >= n) {
            break;
        }
    }
    Ok(shaped)
}

/// Binding failures surface from the driver before any execution happens;
/// everything else is an execution failure carrying the driver diagnostic.
fn classify_driver_error(e: rusqlite::Error) -> DbError {
    match e {
        rusqlite::Error::InvalidParameterName(_)
        | rusqlite::Error::InvalidParameterCount(_, _) => DbError::Usage(e.to_string()),
        other => DbError::Execute(other.to_string()),
    }
}

//! Database access: connection factory, record sets and the SQLite backend.
//!
//! Handlers never talk to a driver directly. They resolve a
//! [`ConnectionTarget`] from the configuration and the workbook settings,
//! ask the shared [`ConnectionFactory`] for a fresh [`Connection`], and drop
//! it at the end of the request.

use crate::cell::CellValue;
use crate::config::DatabaseConfig;
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

lazy_static! {
    static ref IDENT_REGEX: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database setting missing: {0}")]
    MissingField(&'static str),
    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error("schema database not found: {0}")]
    SchemaNotFound(PathBuf),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// A single SQL parameter or result value.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<&CellValue> for SqlValue {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Empty => SqlValue::Null,
            CellValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                SqlValue::Integer(*n as i64)
            }
            CellValue::Number(n) => SqlValue::Real(*n),
            CellValue::Text(s) if s.trim().is_empty() => SqlValue::Null,
            CellValue::Text(s) => SqlValue::Text(s.clone()),
        }
    }
}

impl From<SqlValue> for CellValue {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => CellValue::Empty,
            SqlValue::Integer(i) => CellValue::Number(i as f64),
            SqlValue::Real(f) => CellValue::Number(f),
            SqlValue::Text(s) => CellValue::text(s),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Integer(i)
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(SqliteValue::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(SqliteValue::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(SqliteValue::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Ordered rows of named columns.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl RecordSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header row followed by the data rows, as cell values.
    pub fn to_cells(&self) -> Vec<Vec<CellValue>> {
        let header = self
            .columns
            .iter()
            .map(|c| CellValue::text(c.as_str()))
            .collect();
        std::iter::once(header)
            .chain(
                self.rows
                    .iter()
                    .map(|row| row.iter().cloned().map(CellValue::from).collect()),
            )
            .collect()
    }
}

/// Checks that a schema/table/view name is a plain identifier.
pub fn validate_identifier(name: &str) -> Result<&str, DbError> {
    if IDENT_REGEX.is_match(name) {
        Ok(name)
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

/// Double-quotes an arbitrary column name.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A schema-qualified table or view name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: &str, name: &str) -> Result<Self, DbError> {
        Ok(TableName {
            schema: validate_identifier(schema.trim())?.to_string(),
            name: validate_identifier(name.trim())?.to_string(),
        })
    }

    /// Parses `schema.table`, or a bare `table` in the `main` schema.
    pub fn parse(qualified: &str) -> Result<Self, DbError> {
        match qualified.split_once('.') {
            Some((schema, name)) => Self::new(schema, name),
            None => Self::new("main", qualified),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\".\"{}\"", self.schema, self.name)
    }
}

/// An open database connection, owned by one request.
pub trait Connection: Send {
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RecordSet, DbError>;

    /// Runs a statement and returns the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize, DbError>;

    fn execute_batch(&mut self, sql: &str) -> Result<(), DbError>;

    fn begin(&mut self) -> Result<(), DbError> {
        self.execute_batch("BEGIN")
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.execute_batch("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.execute_batch("ROLLBACK")
    }
}

/// Where a request's connection points: the database plus the schema the
/// workbook settings name.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionTarget {
    pub database: PathBuf,
    pub schema: String,
    pub schema_dir: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

impl ConnectionTarget {
    pub fn resolve(config: &DatabaseConfig, schema: &str) -> Result<Self, DbError> {
        let database = config
            .database
            .clone()
            .ok_or(DbError::MissingField("SQL_DATABASE"))?;
        let schema = schema.trim();
        if schema.is_empty() {
            return Err(DbError::MissingField("DatabaseSchema"));
        }
        validate_identifier(schema)?;

        Ok(ConnectionTarget {
            database,
            schema: schema.to_string(),
            schema_dir: config.schema_dir(),
            busy_timeout_ms: config.busy_timeout_ms,
        })
    }
}

/// Builds connections; shared across requests, so it holds no connection state.
pub trait ConnectionFactory: Send + Sync {
    fn connect(&self, target: &ConnectionTarget) -> Result<Box<dyn Connection>, DbError>;
}

/// SQLite backend.
///
/// A schema other than `main`/`temp` is served by attaching
/// `<schema_dir>/<schema>.db` under that name, which lets `schema.view`
/// references resolve the same way they do on a server database.
#[derive(Clone, Debug, Default)]
pub struct SqliteFactory;

impl ConnectionFactory for SqliteFactory {
    fn connect(&self, target: &ConnectionTarget) -> Result<Box<dyn Connection>, DbError> {
        let conn = rusqlite::Connection::open(&target.database)?;
        conn.busy_timeout(Duration::from_millis(target.busy_timeout_ms))?;

        let schema = validate_identifier(&target.schema)?;
        if !schema.eq_ignore_ascii_case("main") && !schema.eq_ignore_ascii_case("temp") {
            let dir = target
                .schema_dir
                .clone()
                .ok_or(DbError::MissingField("SQL_SCHEMA_DIR"))?;
            let path = dir.join(format!("{schema}.db"));
            if !path.exists() {
                return Err(DbError::SchemaNotFound(path));
            }
            conn.execute(
                &format!("ATTACH DATABASE ?1 AS {}", quote_ident(schema)),
                [path.to_string_lossy().as_ref()],
            )?;
        }
        log::debug!(
            "connected to {} (schema {})",
            target.database.display(),
            target.schema
        );
        Ok(Box::new(SqliteConnection { conn }))
    }
}

pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    pub fn new(conn: rusqlite::Connection) -> Self {
        SqliteConnection { conn }
    }
}

impl Connection for SqliteConnection {
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RecordSet, DbError> {
        log::debug!("query: {sql}");
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(match row.get_ref(i)? {
                    ValueRef::Null => SqlValue::Null,
                    ValueRef::Integer(v) => SqlValue::Integer(v),
                    ValueRef::Real(v) => SqlValue::Real(v),
                    ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
                    ValueRef::Blob(v) => SqlValue::Text(format!("<{} bytes>", v.len())),
                });
            }
            rows.push(values);
        }
        Ok(RecordSet { columns, rows })
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize, DbError> {
        log::debug!("execute: {sql}");
        Ok(self
            .conn
            .execute(sql, rusqlite::params_from_iter(params.iter()))?)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        Ok(self.conn.execute_batch(sql)?)
    }
}

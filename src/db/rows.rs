//! Narrow row-CRUD surface over the relational store.
//!
//! Handlers never write SQL; they go through `select_where` / `insert_row` /
//! `update_row` / `delete_row` with explicit column/value pairs. Primary key
//! columns are discovered per table on first use and cached for the life of
//! the process.

use crate::db::DbPool;
use crate::errors::{Error, Result};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::trace;

/// A dynamically typed SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Null,
}

impl SqlValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Text(s) => ToSqlOutput::Owned(Value::Text(s.clone())),
            Self::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            Self::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            Self::Null => ToSqlOutput::Owned(Value::Null),
        })
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(f) => Self::Real(f),
            ValueRef::Text(bytes) => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
            // No table here stores blobs; treat one as absent rather than
            // inventing an encoding.
            ValueRef::Blob(_) => Self::Null,
        }
    }
}

pub type Row = HashMap<String, SqlValue>;

pub struct RowStore {
    pool: DbPool,
    /// table name -> primary key columns, in key order.
    pk_cache: Mutex<HashMap<String, Vec<String>>>,
}

/// Table and column names come from handler code, never from users, but a
/// typo must fail loudly instead of splicing garbage into SQL.
fn check_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(Error::Database(format!("invalid SQL identifier {name:?}")))
    }
}

impl RowStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            pk_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Primary key columns of a table, discovered on first use.
    pub fn primary_keys(&self, table: &str) -> Result<Vec<String>> {
        check_identifier(table)?;
        {
            let cache = self.pk_cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(keys) = cache.get(table) {
                return Ok(keys.clone());
            }
        }
        let keys = {
            let conn = self.pool.lock().unwrap_or_else(|e| e.into_inner());
            let mut stmt = conn.prepare(
                "SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk",
            )?;
            let keys: Vec<String> = stmt
                .query_map([table], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<_>>()?;
            keys
        };
        if keys.is_empty() {
            return Err(Error::Database(format!(
                "table {table:?} is unknown or has no primary key"
            )));
        }
        self.pk_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(table.to_string(), keys.clone());
        trace!(table, primary_keys = ?keys, "primary key discovered");
        Ok(keys)
    }

    pub fn select_where(
        &self,
        table: &str,
        criteria: &[(&str, SqlValue)],
        limit: Option<u32>,
    ) -> Result<Vec<Row>> {
        check_identifier(table)?;
        for (column, _) in criteria {
            check_identifier(column)?;
        }
        let mut sql = format!("SELECT * FROM {table}");
        if !criteria.is_empty() {
            let clauses: Vec<String> = criteria
                .iter()
                .enumerate()
                .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let values: Vec<&SqlValue> = criteria.iter().map(|(_, v)| v).collect();
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values), |row| {
                let mut out = Row::new();
                for (i, column) in columns.iter().enumerate() {
                    out.insert(column.clone(), SqlValue::from(row.get_ref(i)?));
                }
                Ok(out)
            })?
            .collect::<rusqlite::Result<Vec<Row>>>()?;
        Ok(rows)
    }

    /// Insert one row; returns the new rowid.
    pub fn insert_row(&self, table: &str, fields: &[(&str, SqlValue)]) -> Result<i64> {
        check_identifier(table)?;
        if fields.is_empty() {
            return Err(Error::Database("insert_row needs at least one field".into()));
        }
        for (column, _) in fields {
            check_identifier(column)?;
        }
        let columns: Vec<&str> = fields.iter().map(|(c, _)| *c).collect();
        let placeholders: Vec<String> = (1..=fields.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        let values: Vec<&SqlValue> = fields.iter().map(|(_, v)| v).collect();

        let conn = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(conn.last_insert_rowid())
    }

    /// Update one row addressed by its full primary key. Returns the number
    /// of rows changed (0 or 1).
    pub fn update_row(
        &self,
        table: &str,
        keys: &[(&str, SqlValue)],
        fields: &[(&str, SqlValue)],
    ) -> Result<usize> {
        self.check_key_columns(table, keys)?;
        if fields.is_empty() {
            return Err(Error::Database("update_row needs at least one field".into()));
        }
        for (column, _) in fields {
            check_identifier(column)?;
        }
        let set_clauses: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
            .collect();
        let where_clauses: Vec<String> = keys
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{column} = ?{}", fields.len() + i + 1))
            .collect();
        let sql = format!(
            "UPDATE {table} SET {} WHERE {}",
            set_clauses.join(", "),
            where_clauses.join(" AND ")
        );
        let values: Vec<&SqlValue> = fields
            .iter()
            .map(|(_, v)| v)
            .chain(keys.iter().map(|(_, v)| v))
            .collect();

        let conn = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        Ok(conn.execute(&sql, rusqlite::params_from_iter(values))?)
    }

    /// Delete one row addressed by its full primary key. Returns the number
    /// of rows removed (0 or 1).
    pub fn delete_row(&self, table: &str, keys: &[(&str, SqlValue)]) -> Result<usize> {
        self.check_key_columns(table, keys)?;
        let where_clauses: Vec<String> = keys
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
            .collect();
        let sql = format!("DELETE FROM {table} WHERE {}", where_clauses.join(" AND "));
        let values: Vec<&SqlValue> = keys.iter().map(|(_, v)| v).collect();

        let conn = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        Ok(conn.execute(&sql, rusqlite::params_from_iter(values))?)
    }

    /// The provided key columns must be exactly the table's primary key.
    fn check_key_columns(&self, table: &str, keys: &[(&str, SqlValue)]) -> Result<()> {
        let expected = self.primary_keys(table)?;
        let mut given: Vec<&str> = keys.iter().map(|(c, _)| *c).collect();
        given.sort_unstable();
        let mut wanted: Vec<&str> = expected.iter().map(String::as_str).collect();
        wanted.sort_unstable();
        if given != wanted {
            return Err(Error::Database(format!(
                "key columns {given:?} do not match primary key {expected:?} of {table:?}"
            )));
        }
        Ok(())
    }
}

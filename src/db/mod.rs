pub mod rows;
pub mod schema;

pub use rows::{Row, RowStore, SqlValue};

use crate::errors::{Error, Result};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub type DbPool = Arc<Mutex<Connection>>;

pub fn init_db(db_path: &str) -> Result<DbPool> {
    debug!("Initializing database connection to: {}", db_path);
    let conn = Connection::open(db_path)
        .map_err(|e| Error::Database(format!("Failed to open database at {}: {}", db_path, e)))?;

    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| Error::Database(format!("Failed to enable foreign keys: {}", e)))?;

    info!("Database connection opened. Ensuring tables are created...");
    schema::create_tables(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

#[cfg(test)]
pub(crate) fn init_memory_db() -> Result<DbPool> {
    let conn = Connection::open_in_memory()?;
    schema::create_tables(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

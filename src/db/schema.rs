use crate::errors::Result;
use rusqlite::Connection;
use tracing::debug;

/// Create the guild business tables if they do not exist yet.
pub fn create_tables(conn: &Connection) -> Result<()> {
    debug!("Executing CREATE TABLE statements if tables do not exist.");
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS orders (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            item         TEXT NOT NULL,
            quantity     INTEGER NOT NULL DEFAULT 1,
            notes        TEXT,
            requester_id TEXT NOT NULL,
            status       TEXT NOT NULL DEFAULT 'open',
            created_at   TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS claims (
            order_id    INTEGER NOT NULL REFERENCES orders(id),
            supplier_id TEXT NOT NULL,
            claimed_at  TEXT NOT NULL,
            PRIMARY KEY (order_id, supplier_id)
        );",
    )?;
    Ok(())
}

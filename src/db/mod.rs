pub mod schema;
pub mod writer;
pub mod query;

use anyhow::Result;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

pub fn open_or_create<P: AsRef<Path>>(db_path: P) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    schema::apply_pragmas(&conn)?;
    schema::apply_schema(&conn)?;
    Ok(conn)
}

/// Pool of WAL-mode connections; the schema is applied once through the first one.
pub fn create_pool<P: AsRef<Path>>(db_path: P, size: u32) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path.as_ref()).with_init(|c| {
        schema::apply_connection_pragmas(c)
    });
    let pool = r2d2::Pool::builder().max_size(size).build(manager)?;
    {
        let conn = pool.get()?;
        schema::apply_pragmas(&conn)?;
        schema::apply_schema(&conn)?;
    }
    Ok(pool)
}

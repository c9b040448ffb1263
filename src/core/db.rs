use crate::core::error;
use rusqlite::Connection;

/// Open a SQLite connection the way every Contrail database expects it:
/// a short busy timeout so contention surfaces as an error instead of a
/// hang, WAL journaling, foreign keys on.
pub fn db_connect(db_path: &str) -> Result<Connection, error::ContrailError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(error::ContrailError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::ContrailError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::ContrailError::RusqliteError)?;
    Ok(conn)
}

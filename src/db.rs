use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "coursehub.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    // One row per named collection; `records` holds the whole JSON array.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS collections(
            kind TEXT PRIMARY KEY,
            records TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    // Workspaces created before conditional writes have no version column.
    ensure_collections_version(conn)?;
    Ok(())
}

fn ensure_collections_version(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "collections", "version")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE collections ADD COLUMN version INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

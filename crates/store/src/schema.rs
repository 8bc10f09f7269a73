use rusqlite::Connection;

use rants_domain::error::Result;

use crate::store::sql_err;

// Schema version (increment when changing table definitions).
pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(sql_err)?;

    if current_version != 0 && current_version != SCHEMA_VERSION {
        return Err(rants_domain::error::Error::Storage(format!(
            "database schema version {current_version} is not supported (expected {SCHEMA_VERSION})"
        )));
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            parent_id TEXT,
            tenant_id TEXT NOT NULL,
            depth INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            deadline_at TEXT NOT NULL,
            status TEXT NOT NULL,
            system TEXT,
            user_input TEXT NOT NULL,
            tool_schema_digest TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS steps (
            session_id TEXT NOT NULL,
            step_index INTEGER NOT NULL,
            generator_output TEXT NOT NULL,
            tool_intent TEXT,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            PRIMARY KEY (session_id, step_index),
            FOREIGN KEY (session_id) REFERENCES sessions(id)
        );

        CREATE TABLE IF NOT EXISTS tool_calls (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            step_index INTEGER NOT NULL,
            call_index INTEGER NOT NULL,
            tool TEXT NOT NULL,
            parameters TEXT NOT NULL,
            FOREIGN KEY (session_id) REFERENCES sessions(id)
        );

        CREATE TABLE IF NOT EXISTS tool_results (
            call_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            step_index INTEGER NOT NULL,
            result_index INTEGER NOT NULL,
            ok INTEGER NOT NULL,
            output TEXT NOT NULL,
            error_kind TEXT,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            bytes_truncated INTEGER NOT NULL,
            FOREIGN KEY (call_id) REFERENCES tool_calls(id)
        );

        CREATE TABLE IF NOT EXISTS responses (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            model TEXT NOT NULL,
            body TEXT NOT NULL,
            FOREIGN KEY (session_id) REFERENCES sessions(id)
        );

        CREATE TABLE IF NOT EXISTS audit (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            step_index INTEGER NOT NULL,
            call_id TEXT NOT NULL,
            tool TEXT NOT NULL,
            ok INTEGER NOT NULL,
            error_kind TEXT,
            timestamp TEXT NOT NULL,
            size_before INTEGER NOT NULL,
            size_after INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_tenant ON sessions(tenant_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_parent ON sessions(parent_id);
        CREATE INDEX IF NOT EXISTS idx_steps_session ON steps(session_id, step_index);
        CREATE INDEX IF NOT EXISTS idx_calls_step ON tool_calls(session_id, step_index, call_index);
        CREATE INDEX IF NOT EXISTS idx_results_step ON tool_results(session_id, step_index, result_index);
        CREATE INDEX IF NOT EXISTS idx_audit_session ON audit(session_id, step_index);
        CREATE INDEX IF NOT EXISTS idx_responses_tenant ON responses(tenant_id);
        "#,
    )
    .map_err(sql_err)?;

    conn.execute(&format!("PRAGMA user_version = {SCHEMA_VERSION}"), [])
        .map_err(sql_err)?;

    Ok(())
}

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use rants_domain::error::{Error, Result, ToolErrorKind};
use rants_domain::message::{ToolCall, ToolResult};
use rants_domain::response::ResponseObject;
use rants_domain::session::{
    AuditEvent, CanonicalTranscript, RecursiveSession, SessionStatus, Step, UserInput,
};

use crate::schema;

pub(crate) fn sql_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("malformed timestamp '{raw}': {e}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Storage(format!("malformed uuid '{raw}': {e}")))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TranscriptStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Embedded-SQLite store for sessions, transcripts, responses, and audit.
///
/// The connection is serialized behind a mutex; callers hold it only for the
/// duration of one statement or transaction. Concurrent sessions of the same
/// tenant are independent rows and never contend beyond that.
pub struct TranscriptStore {
    conn: Mutex<Connection>,
}

impl TranscriptStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(|e| {
            Error::Storage(format!("opening database {}: {e}", db_path.display()))
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(sql_err)?;
        schema::init_schema(&conn)?;
        tracing::info!(path = %db_path.display(), "transcript store ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── Sessions ──────────────────────────────────────────────────

    /// Insert a new session row together with its transcript header.
    pub fn create_session(
        &self,
        session: &RecursiveSession,
        transcript: &CanonicalTranscript,
    ) -> Result<()> {
        let user_json = serde_json::to_string(&transcript.user)?;
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO sessions
                (id, parent_id, tenant_id, depth, created_at, deadline_at, status,
                 system, user_input, tool_schema_digest)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                session.id.to_string(),
                session.parent_id.map(|p| p.to_string()),
                session.tenant_id,
                session.depth,
                session.created_at.to_rfc3339(),
                session.deadline_at.to_rfc3339(),
                session.status.as_str(),
                transcript.system,
                user_json,
                transcript.tool_schema_digest,
            ],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    /// Update a terminated session's status. Sessions are immutable after
    /// termination except for this field.
    pub fn update_status(&self, session_id: Uuid, status: SessionStatus) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE sessions SET status = ?2 WHERE id = ?1",
                params![session_id.to_string(), status.as_str()],
            )
            .map_err(sql_err)?;
        if changed == 0 {
            return Err(Error::NotFound(format!("session {session_id}")));
        }
        Ok(())
    }

    /// Load a session and its full transcript, scoped by tenant.
    /// A tenant mismatch is indistinguishable from an unknown id.
    pub fn load_session(
        &self,
        session_id: Uuid,
        tenant_id: &str,
    ) -> Result<(RecursiveSession, CanonicalTranscript)> {
        let conn = self.conn.lock();

        let row = conn
            .query_row(
                r#"
                SELECT parent_id, depth, created_at, deadline_at, status,
                       system, user_input, tool_schema_digest
                FROM sessions WHERE id = ?1 AND tenant_id = ?2
                "#,
                params![session_id.to_string(), tenant_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()
            .map_err(sql_err)?
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;

        let (parent_raw, depth, created_raw, deadline_raw, status_raw, system, user_raw, digest) =
            row;

        let session = RecursiveSession {
            id: session_id,
            parent_id: parent_raw.map(|p| parse_uuid(&p)).transpose()?,
            tenant_id: tenant_id.to_string(),
            depth,
            created_at: parse_ts(&created_raw)?,
            deadline_at: parse_ts(&deadline_raw)?,
            status: SessionStatus::parse(&status_raw)
                .ok_or_else(|| Error::Storage(format!("unknown session status '{status_raw}'")))?,
        };

        let user: UserInput = serde_json::from_str(&user_raw)?;
        let mut transcript = CanonicalTranscript::new(system, user, digest);
        transcript.steps = load_steps(&conn, session_id)?;

        Ok((session, transcript))
    }

    /// Child sessions of `parent_id`, ordered by creation time. Children
    /// hold only this id reference to their parent; this resolves the tree
    /// edge on lookup.
    pub fn children(&self, parent_id: Uuid) -> Result<Vec<RecursiveSession>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, tenant_id, depth, created_at, deadline_at, status
                FROM sessions WHERE parent_id = ?1 ORDER BY created_at
                "#,
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![parent_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(sql_err)?;

        let mut children = Vec::new();
        for row in rows {
            let (id_raw, tenant_id, depth, created_raw, deadline_raw, status_raw) =
                row.map_err(sql_err)?;
            children.push(RecursiveSession {
                id: parse_uuid(&id_raw)?,
                parent_id: Some(parent_id),
                tenant_id,
                depth,
                created_at: parse_ts(&created_raw)?,
                deadline_at: parse_ts(&deadline_raw)?,
                status: SessionStatus::parse(&status_raw).ok_or_else(|| {
                    Error::Storage(format!("unknown session status '{status_raw}'"))
                })?,
            });
        }
        Ok(children)
    }

    // ── Steps ─────────────────────────────────────────────────────

    /// Append a started step together with its (already compiled) tool
    /// calls. The expected `step_index` is verified inside the transaction:
    /// a gap or duplicate is *ConcurrentModification*.
    pub fn append_step(&self, session_id: Uuid, step_index: u32, step: &Step) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(sql_err)?;

        let next: u32 = tx
            .query_row(
                "SELECT COALESCE(MAX(step_index) + 1, 0) FROM steps WHERE session_id = ?1",
                params![session_id.to_string()],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        if next != step_index {
            return Err(Error::ConcurrentModification(format!(
                "session {session_id}: expected step index {next}, got {step_index}"
            )));
        }

        tx.execute(
            r#"
            INSERT INTO steps
                (session_id, step_index, generator_output, tool_intent, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                session_id.to_string(),
                step_index,
                step.generator_output,
                step.tool_intent,
                step.started_at.to_rfc3339(),
                step.finished_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(sql_err)?;

        for (call_index, call) in step.tool_calls.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO tool_calls (id, session_id, step_index, call_index, tool, parameters)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    call.id.to_string(),
                    session_id.to_string(),
                    step_index,
                    call_index as u32,
                    call.tool,
                    call.parameters.to_string(),
                ],
            )
            .map_err(sql_err)?;
        }

        tx.commit().map_err(sql_err)
    }

    /// Finalize a step: write its results (one per call, declared order) and
    /// stamp `finished_at`, in one transaction.
    pub fn finalize_step(
        &self,
        session_id: Uuid,
        step_index: u32,
        results: &[ToolResult],
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(sql_err)?;

        let open: Option<Option<String>> = tx
            .query_row(
                "SELECT finished_at FROM steps WHERE session_id = ?1 AND step_index = ?2",
                params![session_id.to_string(), step_index],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err)?;
        match open {
            None => {
                return Err(Error::ConcurrentModification(format!(
                    "session {session_id}: finalizing missing step {step_index}"
                )))
            }
            Some(Some(_)) => {
                return Err(Error::ConcurrentModification(format!(
                    "session {session_id}: step {step_index} already finalized"
                )))
            }
            Some(None) => {}
        }

        for (result_index, result) in results.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO tool_results
                    (call_id, session_id, step_index, result_index, ok, output,
                     error_kind, started_at, finished_at, bytes_truncated)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    result.call_id.to_string(),
                    session_id.to_string(),
                    step_index,
                    result_index as u32,
                    result.ok,
                    result.output,
                    result.error_kind.map(|k| k.as_str()),
                    result.started_at.to_rfc3339(),
                    result.finished_at.to_rfc3339(),
                    result.bytes_truncated,
                ],
            )
            .map_err(sql_err)?;
        }

        tx.execute(
            "UPDATE steps SET finished_at = ?3 WHERE session_id = ?1 AND step_index = ?2",
            params![
                session_id.to_string(),
                step_index,
                finished_at.to_rfc3339()
            ],
        )
        .map_err(sql_err)?;

        tx.commit().map_err(sql_err)
    }

    // ── Responses ─────────────────────────────────────────────────

    pub fn persist_response(
        &self,
        response: &ResponseObject,
        tenant_id: &str,
        session_id: Uuid,
    ) -> Result<()> {
        let body = serde_json::to_string(response)?;
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO responses (id, tenant_id, session_id, created_at, model, body)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                response.id,
                tenant_id,
                session_id.to_string(),
                response.created_at,
                response.model,
                body,
            ],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    /// Look up a stored response by id, scoped by tenant. Returns the
    /// response and the session that produced it.
    pub fn lookup_response(
        &self,
        response_id: &str,
        tenant_id: &str,
    ) -> Result<(ResponseObject, Uuid)> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT body, session_id FROM responses WHERE id = ?1 AND tenant_id = ?2",
                params![response_id, tenant_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(sql_err)?
            .ok_or_else(|| Error::NotFound(format!("response {response_id}")))?;

        let response: ResponseObject = serde_json::from_str(&row.0)?;
        Ok((response, parse_uuid(&row.1)?))
    }

    // ── Audit ─────────────────────────────────────────────────────

    pub fn record_audit(&self, event: &AuditEvent) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO audit
                (tenant_id, session_id, step_index, call_id, tool, ok, error_kind,
                 timestamp, size_before, size_after)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                event.tenant_id,
                event.session_id.to_string(),
                event.step_index,
                event.call_id.to_string(),
                event.tool,
                event.ok,
                event.error_kind.map(|k| k.as_str()),
                event.timestamp.to_rfc3339(),
                event.size_before,
                event.size_after,
            ],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    /// Audit events for one session, ordered by `(step_index, insertion)`.
    pub fn audit_for_session(&self, session_id: Uuid) -> Result<Vec<AuditEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT tenant_id, step_index, call_id, tool, ok, error_kind,
                       timestamp, size_before, size_after
                FROM audit WHERE session_id = ?1
                ORDER BY step_index, seq
                "#,
            )
            .map_err(sql_err)?;

        let rows = stmt
            .query_map(params![session_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, u64>(7)?,
                    row.get::<_, u64>(8)?,
                ))
            })
            .map_err(sql_err)?;

        let mut events = Vec::new();
        for row in rows {
            let (tenant_id, step_index, call_raw, tool, ok, kind_raw, ts_raw, before, after) =
                row.map_err(sql_err)?;
            events.push(AuditEvent {
                tenant_id,
                session_id,
                step_index,
                call_id: parse_uuid(&call_raw)?,
                tool,
                ok,
                error_kind: kind_raw.as_deref().and_then(ToolErrorKind::parse),
                timestamp: parse_ts(&ts_raw)?,
                size_before: before,
                size_after: after,
            });
        }
        Ok(events)
    }
}

// ── Step loading ────────────────────────────────────────────────────

fn load_steps(conn: &Connection, session_id: Uuid) -> Result<Vec<Step>> {
    let sid = session_id.to_string();

    let mut stmt = conn
        .prepare(
            r#"
            SELECT step_index, generator_output, tool_intent, started_at, finished_at
            FROM steps WHERE session_id = ?1 ORDER BY step_index
            "#,
        )
        .map_err(sql_err)?;
    let step_rows = stmt
        .query_map(params![sid], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })
        .map_err(sql_err)?;

    let mut steps = Vec::new();
    let mut indices = Vec::new();
    for row in step_rows {
        let (index, output, intent, started_raw, finished_raw) = row.map_err(sql_err)?;
        indices.push(index);
        steps.push(Step {
            generator_output: output,
            tool_intent: intent,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            started_at: parse_ts(&started_raw)?,
            finished_at: finished_raw.as_deref().map(parse_ts).transpose()?,
        });
    }

    for (slot, index) in indices.iter().enumerate() {
        steps[slot].tool_calls = load_calls(conn, &sid, *index)?;
        steps[slot].tool_results = load_results(conn, &sid, *index)?;
    }

    Ok(steps)
}

fn load_calls(conn: &Connection, session_id: &str, step_index: u32) -> Result<Vec<ToolCall>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, tool, parameters FROM tool_calls
            WHERE session_id = ?1 AND step_index = ?2 ORDER BY call_index
            "#,
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![session_id, step_index], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(sql_err)?;

    let mut calls = Vec::new();
    for row in rows {
        let (id_raw, tool, params_raw) = row.map_err(sql_err)?;
        calls.push(ToolCall {
            id: parse_uuid(&id_raw)?,
            tool,
            parameters: serde_json::from_str(&params_raw)?,
        });
    }
    Ok(calls)
}

fn load_results(conn: &Connection, session_id: &str, step_index: u32) -> Result<Vec<ToolResult>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT call_id, ok, output, error_kind, started_at, finished_at, bytes_truncated
            FROM tool_results
            WHERE session_id = ?1 AND step_index = ?2 ORDER BY result_index
            "#,
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![session_id, step_index], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, u64>(6)?,
            ))
        })
        .map_err(sql_err)?;

    let mut results = Vec::new();
    for row in rows {
        let (call_raw, ok, output, kind_raw, started_raw, finished_raw, truncated) =
            row.map_err(sql_err)?;
        results.push(ToolResult {
            call_id: parse_uuid(&call_raw)?,
            ok,
            output,
            error_kind: kind_raw.as_deref().and_then(ToolErrorKind::parse),
            started_at: parse_ts(&started_raw)?,
            finished_at: parse_ts(&finished_raw)?,
            bytes_truncated: truncated,
        });
    }
    Ok(results)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

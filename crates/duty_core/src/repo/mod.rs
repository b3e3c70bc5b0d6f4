use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::domain::{Actor, Incident, IncidentAction, IncidentStatus, NewIncident};
use crate::error::AppError;
use crate::validate::{ensure_transition, require_comment};

/// One audit-trail entry; rows are append-only and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentComment {
    pub id: i64,
    pub incident_id: i64,
    pub action: String,
    pub author_username: String,
    pub author_user_id: Option<i64>,
    pub comment: String,
    pub created_at: String,
}

const INCIDENT_COLUMNS: &str = r#"
      id, event_id, event, node, "trigger", severity, details, status,
      assigned_to_username, assigned_to_user_id,
      closed_by_username, closed_by_user_id, closed_at,
      chat_id, message_id, thread_id,
      created_at, updated_at
"#;

fn now_rfc3339() -> Result<String, AppError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| AppError::wrap("TIME_FORMAT_FAILED", "Failed to format current time", e))
}

fn map_incident(row: &rusqlite::Row<'_>) -> rusqlite::Result<Incident> {
    let status_raw: String = row.get(7)?;
    let status = IncidentStatus::parse(&status_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

    Ok(Incident {
        id: row.get(0)?,
        event_id: row.get(1)?,
        event: row.get(2)?,
        node: row.get(3)?,
        trigger: row.get(4)?,
        severity: row.get(5)?,
        details: row.get(6)?,
        status,
        assigned_to_username: row.get(8)?,
        assigned_to_user_id: row.get(9)?,
        closed_by_username: row.get(10)?,
        closed_by_user_id: row.get(11)?,
        closed_at: row.get(12)?,
        chat_id: row.get(13)?,
        message_id: row.get(14)?,
        thread_id: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

pub fn create_incident(conn: &Connection, new: &NewIncident) -> Result<Incident, AppError> {
    let now = now_rfc3339()?;

    conn.execute(
        r#"
      INSERT INTO incidents (event_id, event, node, "trigger", severity, details,
                             status, created_at, updated_at)
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'open', ?7, ?7)
      "#,
        params![
            new.event_id,
            new.event,
            new.node,
            new.trigger,
            new.severity,
            new.details,
            now
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::wrap(
                "INCIDENT_DUPLICATE_EVENT",
                "An incident for this event id already exists",
                e,
            )
        } else {
            AppError::wrap("DB_INSERT_FAILED", "Failed to create incident", e)
        }
    })?;

    get_incident(conn, conn.last_insert_rowid())
}

pub fn get_incident(conn: &Connection, id: i64) -> Result<Incident, AppError> {
    conn.query_row(
        &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = ?1"),
        [id],
        map_incident,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            AppError::new("DB_NOT_FOUND", "Incident not found")
                .with_details(format!("incident_id={id}"))
        }
        other => AppError::wrap("DB_QUERY_FAILED", "Failed to query incident", other),
    })
}

pub fn find_by_event_id(conn: &Connection, event_id: &str) -> Result<Option<Incident>, AppError> {
    conn.query_row(
        &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE event_id = ?1"),
        [event_id],
        map_incident,
    )
    .optional()
    .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to query incident by event id", e))
}

pub fn list_incidents(
    conn: &Connection,
    status: Option<IncidentStatus>,
) -> Result<Vec<Incident>, AppError> {
    let (sql, args) = match status {
        Some(s) => (
            format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE status = ?1 ORDER BY id ASC"),
            vec![s.as_str().to_string()],
        ),
        None => (
            format!("SELECT {INCIDENT_COLUMNS} FROM incidents ORDER BY id ASC"),
            Vec::new(),
        ),
    };

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to prepare incidents query", e))?;

    let rows = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), map_incident)
        .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to query incidents", e))?;

    let mut out = Vec::new();
    for r in rows {
        out.push(
            r.map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to decode incident row", e))?,
        );
    }

    Ok(out)
}

pub fn count_incidents(conn: &Connection) -> Result<i64, AppError> {
    conn.query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))
        .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to count incidents", e))
}

/// Record where the alert was posted so later mutations can edit it in place.
pub fn set_message_ref(
    conn: &Connection,
    incident_id: i64,
    chat_id: i64,
    message_id: i64,
    thread_id: Option<i64>,
) -> Result<(), AppError> {
    let now = now_rfc3339()?;
    let changed = conn
        .execute(
            "UPDATE incidents SET chat_id = ?1, message_id = ?2, thread_id = ?3, updated_at = ?4
             WHERE id = ?5",
            params![chat_id, message_id, thread_id, now, incident_id],
        )
        .map_err(|e| AppError::wrap("DB_UPDATE_FAILED", "Failed to store message reference", e))?;

    if changed == 0 {
        return Err(AppError::new("DB_NOT_FOUND", "Incident not found")
            .with_details(format!("incident_id={incident_id}")));
    }
    Ok(())
}

fn insert_comment(
    tx: &rusqlite::Transaction<'_>,
    incident_id: i64,
    action: &str,
    author: &Actor,
    comment: &str,
    now: &str,
) -> Result<(), AppError> {
    tx.execute(
        "INSERT INTO incident_comments (incident_id, action, author_username, author_user_id,
                                        comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            incident_id,
            action,
            author.username,
            author.user_id,
            comment,
            now
        ],
    )
    .map_err(|e| AppError::wrap("DB_INSERT_FAILED", "Failed to record audit comment", e))?;
    Ok(())
}

/// Apply a lifecycle transition (take/close/reject/reopen) with its mandatory
/// comment, recording the actor and timestamp in the audit trail.
///
/// The status update and the audit insert share one transaction, and the
/// UPDATE re-checks the observed status in its WHERE clause so a concurrent
/// button press cannot double-apply the transition.
pub fn apply_transition(
    conn: &mut Connection,
    incident_id: i64,
    action: IncidentAction,
    actor: &Actor,
    comment: &str,
) -> Result<Incident, AppError> {
    require_comment(action, comment)?;

    let now = now_rfc3339()?;
    let tx = conn
        .transaction()
        .map_err(|e| AppError::wrap("DB_TX_FAILED", "Failed to start transition transaction", e))?;

    let current = tx
        .query_row(
            &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = ?1"),
            [incident_id],
            map_incident,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                AppError::new("DB_NOT_FOUND", "Incident not found")
                    .with_details(format!("incident_id={incident_id}"))
            }
            other => AppError::wrap("DB_QUERY_FAILED", "Failed to query incident", other),
        })?;

    ensure_transition(current.status, action)?;

    let changed = match action {
        IncidentAction::Take => tx.execute(
            "UPDATE incidents
             SET status = 'in_progress', assigned_to_username = ?1, assigned_to_user_id = ?2,
                 updated_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                actor.username,
                actor.user_id,
                now,
                incident_id,
                current.status.as_str()
            ],
        ),
        IncidentAction::Close | IncidentAction::Reject => tx.execute(
            "UPDATE incidents
             SET status = ?1, closed_by_username = ?2, closed_by_user_id = ?3, closed_at = ?4,
                 updated_at = ?4
             WHERE id = ?5 AND status = ?6",
            params![
                action.target_status().as_str(),
                actor.username,
                actor.user_id,
                now,
                incident_id,
                current.status.as_str()
            ],
        ),
        IncidentAction::Reopen => tx.execute(
            "UPDATE incidents
             SET status = 'open', assigned_to_username = NULL, assigned_to_user_id = NULL,
                 closed_by_username = NULL, closed_by_user_id = NULL, closed_at = NULL,
                 updated_at = ?1
             WHERE id = ?2 AND status = ?3",
            params![now, incident_id, current.status.as_str()],
        ),
        IncidentAction::Reassign => {
            return Err(AppError::new(
                "TRANSITION_INVALID",
                "Reassignment goes through reassign_incident",
            ));
        }
    }
    .map_err(|e| AppError::wrap("DB_UPDATE_FAILED", "Failed to update incident status", e))?;

    if changed != 1 {
        return Err(AppError::new(
            "TRANSITION_CONFLICT",
            "Incident was modified concurrently",
        )
        .with_details(format!("incident_id={incident_id}"))
        .with_retryable(true));
    }

    insert_comment(&tx, incident_id, action.as_str(), actor, comment, &now)?;

    tx.commit()
        .map_err(|e| AppError::wrap("DB_TX_FAILED", "Failed to commit transition", e))?;

    get_incident(conn, incident_id)
}

/// Change the assignee of an in-progress incident, auditing the handover.
pub fn reassign_incident(
    conn: &mut Connection,
    incident_id: i64,
    new_assignee: &Actor,
    note: &str,
) -> Result<Incident, AppError> {
    let now = now_rfc3339()?;
    let tx = conn
        .transaction()
        .map_err(|e| AppError::wrap("DB_TX_FAILED", "Failed to start reassign transaction", e))?;

    let current = tx
        .query_row(
            "SELECT status FROM incidents WHERE id = ?1",
            [incident_id],
            |row| row.get::<_, String>(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                AppError::new("DB_NOT_FOUND", "Incident not found")
                    .with_details(format!("incident_id={incident_id}"))
            }
            other => AppError::wrap("DB_QUERY_FAILED", "Failed to query incident", other),
        })?;
    let current = IncidentStatus::parse(&current)?;

    ensure_transition(current, IncidentAction::Reassign)?;

    let changed = tx
        .execute(
            "UPDATE incidents
             SET assigned_to_username = ?1, assigned_to_user_id = ?2, updated_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                new_assignee.username,
                new_assignee.user_id,
                now,
                incident_id,
                current.as_str()
            ],
        )
        .map_err(|e| AppError::wrap("DB_UPDATE_FAILED", "Failed to reassign incident", e))?;

    if changed != 1 {
        return Err(AppError::new(
            "TRANSITION_CONFLICT",
            "Incident was modified concurrently",
        )
        .with_details(format!("incident_id={incident_id}"))
        .with_retryable(true));
    }

    insert_comment(
        &tx,
        incident_id,
        IncidentAction::Reassign.as_str(),
        new_assignee,
        note,
        &now,
    )?;

    tx.commit()
        .map_err(|e| AppError::wrap("DB_TX_FAILED", "Failed to commit reassign", e))?;

    get_incident(conn, incident_id)
}

pub fn list_comments(
    conn: &Connection,
    incident_id: i64,
) -> Result<Vec<IncidentComment>, AppError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, incident_id, action, author_username, author_user_id, comment, created_at
             FROM incident_comments
             WHERE incident_id = ?1
             ORDER BY id ASC",
        )
        .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to prepare comments query", e))?;

    let rows = stmt
        .query_map([incident_id], |row| {
            Ok(IncidentComment {
                id: row.get(0)?,
                incident_id: row.get(1)?,
                action: row.get(2)?,
                author_username: row.get(3)?,
                author_user_id: row.get(4)?,
                comment: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to query comments", e))?;

    let mut out = Vec::new();
    for r in rows {
        out.push(
            r.map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to decode comment row", e))?,
        );
    }

    Ok(out)
}

//! Session registry: start, close and look up terms.
//!
//! The active session row doubles as the rollover's mutual-exclusion token.
//! A partial unique index allows at most one row with `state = 'active'`, and
//! `close` only succeeds against the exact `version` that was read, so a
//! racing second close finds nothing to close.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::error::{RolloverError, RolloverStep, StoreError, StoreResult};
use super::model::{ProcessedCounts, Session, SessionType};
use super::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Idle,
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    Close,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Active => "active",
            SessionPhase::Closed => "closed",
        }
    }

    fn from_db(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(SessionPhase::Active),
            "closed" => Some(SessionPhase::Closed),
            _ => None,
        }
    }
}

/// The only legal transitions: `Idle --Start--> Active --Close--> Closed`.
pub fn phase_after(current: SessionPhase, event: SessionEvent) -> Option<SessionPhase> {
    match (current, event) {
        (SessionPhase::Idle, SessionEvent::Start) => Some(SessionPhase::Active),
        (SessionPhase::Active, SessionEvent::Close) => Some(SessionPhase::Closed),
        _ => None,
    }
}

const SESSION_COLUMNS: &str = "id, session_type, year, start_date, end_date, state, version,
     processed_counts, archived_snapshot";

fn session_from_row(r: &Row<'_>) -> rusqlite::Result<Session> {
    let state: String = r.get(5)?;
    let phase = SessionPhase::from_db(&state).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown session state: {}", state).into(),
        )
    })?;
    Ok(Session {
        id: r.get(0)?,
        session_type: store::session_type_col(r, 1)?,
        year: r.get(2)?,
        start_date: r.get(3)?,
        end_date: r.get(4)?,
        phase,
        version: r.get(6)?,
        processed: store::opt_json_col(r, 7)?,
        archived_snapshot: store::opt_json_col(r, 8)?,
    })
}

pub fn get_active(conn: &Connection) -> StoreResult<Option<Session>> {
    let sql = format!(
        "SELECT {} FROM sessions WHERE state = 'active'",
        SESSION_COLUMNS
    );
    Ok(conn.query_row(&sql, [], session_from_row).optional()?)
}

pub fn get(conn: &Connection, session_id: &str) -> StoreResult<Option<Session>> {
    let sql = format!("SELECT {} FROM sessions WHERE id = ?", SESSION_COLUMNS);
    Ok(conn
        .query_row(&sql, [session_id], session_from_row)
        .optional()?)
}

/// All sessions, newest first.
pub fn list(conn: &Connection) -> StoreResult<Vec<Session>> {
    let sql = format!(
        "SELECT {} FROM sessions ORDER BY start_date DESC, rowid DESC",
        SESSION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], session_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Registry-level phase: `Active` while a session is open, otherwise `Idle`.
pub fn status(conn: &Connection) -> StoreResult<(SessionPhase, Option<Session>)> {
    let active = get_active(conn)?;
    let phase = if active.is_some() {
        SessionPhase::Active
    } else {
        SessionPhase::Idle
    };
    Ok((phase, active))
}

pub fn start(
    conn: &Connection,
    session_type: SessionType,
    year: i32,
    now: DateTime<Utc>,
) -> Result<Session, RolloverError> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(StoreError::from)?;

    let (current, _) = status(&tx)?;
    if phase_after(current, SessionEvent::Start).is_none() {
        return Err(RolloverError::AlreadyActiveSession);
    }

    let session = Session {
        id: Uuid::new_v4().to_string(),
        session_type,
        year,
        start_date: now,
        end_date: None,
        phase: SessionPhase::Active,
        version: 0,
        processed: None,
        archived_snapshot: None,
    };
    let inserted = tx.execute(
        "INSERT INTO sessions(id, session_type, year, start_date, state, version)
         VALUES(?, ?, ?, ?, 'active', 0)",
        rusqlite::params![session.id, session_type.as_str(), year, now],
    );
    if let Err(e) = inserted {
        if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
            return Err(RolloverError::AlreadyActiveSession);
        }
        return Err(StoreError::from(e).into());
    }
    store::append_activity(
        &tx,
        &session.id,
        now,
        "session_started",
        &format!("{} {} session started", session_type.as_str(), year),
    )?;
    tx.commit().map_err(StoreError::from)?;

    info!(
        session_id = %session.id,
        session_type = session_type.as_str(),
        year,
        "session started"
    );
    Ok(session)
}

/// Flips the session to closed inside the caller's rollover transaction.
pub(crate) fn close(
    tx: &Connection,
    session: &Session,
    counts: &ProcessedCounts,
    archived_snapshot: &str,
    now: DateTime<Utc>,
) -> Result<(), RolloverError> {
    let next = phase_after(session.phase, SessionEvent::Close)
        .ok_or(RolloverError::NoActiveSession)?;

    let counts_json = serde_json::to_string(counts)
        .map_err(|e| RolloverError::abort(RolloverStep::CloseSession, e))?;
    let updated = tx
        .execute(
            "UPDATE sessions
             SET state = ?, end_date = ?, version = version + 1,
                 processed_counts = ?, archived_snapshot = ?
             WHERE id = ? AND state = 'active' AND version = ?",
            rusqlite::params![
                next.as_str(),
                now,
                counts_json,
                archived_snapshot,
                session.id,
                session.version
            ],
        )
        .map_err(|e| RolloverError::abort(RolloverStep::CloseSession, e))?;
    if updated != 1 {
        return Err(RolloverError::NoActiveSession);
    }

    store::append_activity(
        tx,
        &session.id,
        now,
        "session_closed",
        &format!(
            "{} {} session closed: {} graduated, {} continuing",
            session.session_type.as_str(),
            session.year,
            counts.graduated,
            counts.continuing
        ),
    )
    .map_err(|e| RolloverError::abort(RolloverStep::CloseSession, e))?;
    Ok(())
}

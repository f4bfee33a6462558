use crate::backup;
use crate::engine::model::SessionType;
use crate::engine::{self, registry, RolloverError};
use crate::ipc::error::{err, ok, rollover_err, rollover_error_body};
use crate::ipc::handlers::setup::load_rollover_settings;
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

fn handle_session_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match registry::status(conn) {
        Ok((phase, session)) => ok(
            &req.id,
            json!({ "phase": phase.as_str(), "session": session }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_session_start(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let raw_type = match required_str(req, "sessionType") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(session_type) = SessionType::parse(&raw_type) else {
        return err(
            &req.id,
            "bad_params",
            "sessionType must be one of: Spring, Fall",
            Some(json!({ "sessionType": raw_type })),
        );
    };
    let year = match req.params.get("year").and_then(|v| v.as_i64()) {
        Some(y) if (1900..=9999).contains(&y) => y as i32,
        Some(_) => return err(&req.id, "bad_params", "year must be in 1900..=9999", None),
        None => return err(&req.id, "bad_params", "missing year", None),
    };

    match registry::start(conn, session_type, year, Utc::now()) {
        Ok(session) => ok(&req.id, json!({ "session": session })),
        Err(e) => rollover_err(&req.id, &e),
    }
}

fn handle_session_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match load_rollover_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut backup_path = None;
    if settings.backup_before_close {
        let active = match registry::get_active(conn) {
            Ok(Some(s)) => s,
            Ok(None) => return rollover_err(&req.id, &RolloverError::NoActiveSession),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let Some(workspace) = state.workspace.as_ref() else {
            return err(&req.id, "no_workspace", "select a workspace first", None);
        };
        let out = backup::pre_rollover_bundle_path(
            workspace,
            active.session_type.as_str(),
            active.year,
            Utc::now(),
        );
        if let Err(e) = backup::export_workspace_bundle(workspace, &out) {
            return rollover_err(&req.id, &RolloverError::Backup(e));
        }
        info!(path = %out.display(), "pre-rollover backup written");
        backup_path = Some(out.to_string_lossy().to_string());
    }

    let result = match engine::run_rollover(conn, &settings.options, Utc::now()) {
        Ok(v) => v,
        Err(e) => return rollover_err(&req.id, &e),
    };

    // The transition is committed from here on; a report failure is reported
    // next to the result and can be retried via reports.sessionRolloverModel.
    let mut payload = json!(result.summary);
    match engine::assemble(&result.summary) {
        Ok(report) => {
            payload["report"] = json!(report);
        }
        Err(e) => {
            let e = RolloverError::ReportGeneration(e);
            warn!(session_id = %result.summary.session_id, error = %e, "report assembly failed after commit");
            payload["report"] = serde_json::Value::Null;
            payload["reportError"] = rollover_error_body(&e);
        }
    }
    if let Some(path) = backup_path {
        payload["preRolloverBackup"] = json!(path);
    }
    ok(&req.id, payload)
}

fn handle_session_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match registry::list(conn) {
        Ok(sessions) => ok(&req.id, json!({ "sessions": sessions })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_session_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session_id = match required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let include_archive = req
        .params
        .get("includeArchive")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let session = match registry::get(conn, &session_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "session not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut payload = json!({ "session": session });
    if include_archive {
        payload["archivedSnapshot"] = session
            .archived_snapshot
            .clone()
            .unwrap_or(serde_json::Value::Null);
    }
    ok(&req.id, payload)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.status" => Some(handle_session_status(state, req)),
        "session.start" => Some(handle_session_start(state, req)),
        "session.close" => Some(handle_session_close(state, req)),
        "session.list" => Some(handle_session_list(state, req)),
        "session.get" => Some(handle_session_get(state, req)),
        _ => None,
    }
}

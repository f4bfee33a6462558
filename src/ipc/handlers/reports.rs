use crate::engine::archive;
use crate::engine::{self, registry, RolloverError, TransitionSummary};
use crate::ipc::error::{err, ok, rollover_err};
use crate::ipc::handlers::setup::load_report_settings;
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use serde_json::json;

/// Regenerates a closed session's report from its archive, without touching
/// any live entity.
fn handle_reports_session_rollover_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session_id = match required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match load_report_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let session = match registry::get(conn, &session_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "session not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let summary = match TransitionSummary::from_archived(&session) {
        Ok(v) => v,
        Err(e) => return rollover_err(&req.id, &RolloverError::ReportGeneration(e)),
    };
    let report = match engine::assemble(&summary) {
        Ok(v) => v,
        Err(e) => return rollover_err(&req.id, &RolloverError::ReportGeneration(e)),
    };

    let mut payload = json!({
        "session": session,
        "summary": summary,
        "report": report,
    });
    if settings.show_generated_at {
        payload["generatedAt"] = json!(Utc::now().to_rfc3339());
    }
    if settings.include_degree_tracking {
        let tracking = session
            .archived_snapshot
            .as_ref()
            .and_then(|raw| archive::decode(raw).ok())
            .map(|a| a.statistics.degree_tracking)
            .unwrap_or_default();
        payload["degreeTracking"] = json!(tracking);
    }
    ok(&req.id, payload)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.sessionRolloverModel" => Some(handle_reports_session_rollover_model(state, req)),
        _ => None,
    }
}

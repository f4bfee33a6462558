use crate::db;
use crate::engine::executor::DEFAULT_BULK_CHUNK_SIZE;
use crate::engine::stats::{is_valid_date_format, DEFAULT_ASSIGNMENT_DATE_FORMAT};
use crate::engine::RolloverOptions;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Rollover,
    Reports,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "rollover" => Some(Self::Rollover),
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Rollover => "setup.rollover",
            Self::Reports => "setup.reports",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Rollover => json!({
            "bulkChunkSize": DEFAULT_BULK_CHUNK_SIZE,
            "backupBeforeClose": false,
            "assignmentDateFormat": DEFAULT_ASSIGNMENT_DATE_FORMAT
        }),
        SetupSection::Reports => json!({
            "showGeneratedAt": true,
            "includeDegreeTracking": false
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Rollover => match k.as_str() {
                "bulkChunkSize" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 5000)?));
                }
                "backupBeforeClose" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "assignmentDateFormat" => {
                    let s = parse_string_max(v, k, 32)?;
                    if s.is_empty() || !is_valid_date_format(&s) {
                        return Err(format!("{} is not a valid date format", k));
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown rollover field: {}", k)),
            },
            SetupSection::Reports => match k.as_str() {
                "showGeneratedAt" | "includeDegreeTracking" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown reports field: {}", k)),
            },
        }
    }
    Ok(())
}

/// Applies stored values key by key; a malformed key keeps its default
/// without discarding the valid ones next to it.
fn merge_stored(section: SetupSection, current: &mut Value, saved: &Map<String, Value>) {
    for (k, v) in saved {
        let mut single = Map::new();
        single.insert(k.clone(), v.clone());
        let _ = merge_section_patch(section, current, &single);
    }
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            merge_stored(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

#[derive(Debug, Clone)]
pub struct RolloverSettings {
    pub options: RolloverOptions,
    pub backup_before_close: bool,
}

pub fn load_rollover_settings(conn: &rusqlite::Connection) -> anyhow::Result<RolloverSettings> {
    let v = load_section(conn, SetupSection::Rollover)?;
    let defaults = RolloverOptions::default();
    Ok(RolloverSettings {
        options: RolloverOptions {
            bulk_chunk_size: v
                .get("bulkChunkSize")
                .and_then(|x| x.as_u64())
                .map(|n| n as usize)
                .unwrap_or(defaults.bulk_chunk_size),
            assignment_date_format: v
                .get("assignmentDateFormat")
                .and_then(|x| x.as_str())
                .map(str::to_string)
                .unwrap_or(defaults.assignment_date_format),
        },
        backup_before_close: v
            .get("backupBeforeClose")
            .and_then(|x| x.as_bool())
            .unwrap_or(false),
    })
}

#[derive(Debug, Clone, Copy)]
pub struct ReportSettings {
    pub show_generated_at: bool,
    pub include_degree_tracking: bool,
}

pub fn load_report_settings(conn: &rusqlite::Connection) -> anyhow::Result<ReportSettings> {
    let v = load_section(conn, SetupSection::Reports)?;
    Ok(ReportSettings {
        show_generated_at: v
            .get("showGeneratedAt")
            .and_then(|x| x.as_bool())
            .unwrap_or(true),
        include_degree_tracking: v
            .get("includeDegreeTracking")
            .and_then(|x| x.as_bool())
            .unwrap_or(false),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let rollover = match load_section(conn, SetupSection::Rollover) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let reports = match load_section(conn, SetupSection::Reports) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "rollover": rollover,
            "reports": reports
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    let mut result = json!({ "ok": true });
    result[section_raw] = current;
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

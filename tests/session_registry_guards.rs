use chrono::{DateTime, TimeZone, Utc};
use rolloverd::db;
use rolloverd::engine::model::{SessionType, Student};
use rolloverd::engine::{
    self, registry, store, ReportError, RolloverError, RolloverOptions, SessionPhase,
    TransitionSummary,
};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
}

#[test]
fn empty_workspace_is_idle() {
    let workspace = temp_dir("rolloverd-guards-idle");
    let conn = db::open_db(&workspace).expect("open db");

    let (phase, session) = registry::status(&conn).expect("status");
    assert_eq!(phase, SessionPhase::Idle);
    assert!(session.is_none());
    assert!(registry::list(&conn).expect("list").is_empty());

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn second_start_is_rejected() {
    let workspace = temp_dir("rolloverd-guards-start");
    let conn = db::open_db(&workspace).expect("open db");

    let first = registry::start(&conn, SessionType::Fall, 2025, at(2025, 8, 25)).expect("start");
    let err = registry::start(&conn, SessionType::Spring, 2026, at(2025, 9, 1))
        .expect_err("second start must fail");
    assert!(matches!(err, RolloverError::AlreadyActiveSession));
    assert_eq!(err.code(), "already_active_session");

    let sessions = registry::list(&conn).expect("list");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, first.id);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn store_rejects_a_second_active_row() {
    let workspace = temp_dir("rolloverd-guards-index");
    let conn = db::open_db(&workspace).expect("open db");
    registry::start(&conn, SessionType::Fall, 2025, at(2025, 8, 25)).expect("start");

    let res = conn.execute(
        "INSERT INTO sessions(id, session_type, year, start_date, state, version)
         VALUES('manual', 'Spring', 2026, '2026-01-10T00:00:00Z', 'active', 0)",
        [],
    );
    assert!(res.is_err());

    let active: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sessions WHERE state = 'active'",
            [],
            |r| r.get(0),
        )
        .expect("count");
    assert_eq!(active, 1);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn close_without_active_session_changes_nothing() {
    let workspace = temp_dir("rolloverd-guards-close");
    let conn = db::open_db(&workspace).expect("open db");
    store::insert_student(
        &conn,
        &Student {
            id: "s-1".into(),
            name: "Noor".into(),
            email: String::new(),
            registration_number: "R-1".into(),
            program: "OT".into(),
            section: "A".into(),
            semester: "8".into(),
            enrollment_year: Some(2021),
            enrollments: vec![],
            enrollment_count: 0,
            created_at: at(2021, 9, 1),
        },
    )
    .expect("insert student");

    let err = engine::run_rollover(&conn, &RolloverOptions::default(), at(2025, 12, 20))
        .expect_err("nothing to close");
    assert!(matches!(err, RolloverError::NoActiveSession));
    assert_eq!(err.step(), None);

    let students = store::list_students(&conn).expect("students");
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].semester, "8");
    assert_eq!(store::count_rows(&conn, "graduates").expect("count"), 0);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn double_close_runs_once() {
    let workspace = temp_dir("rolloverd-guards-double");
    let conn = db::open_db(&workspace).expect("open db");
    store::insert_student(
        &conn,
        &Student {
            id: "s-1".into(),
            name: "Ivo".into(),
            email: String::new(),
            registration_number: "R-1".into(),
            program: "OT".into(),
            section: "A".into(),
            semester: "4".into(),
            enrollment_year: Some(2023),
            enrollments: vec![],
            enrollment_count: 0,
            created_at: at(2023, 9, 1),
        },
    )
    .expect("insert student");
    let session = registry::start(&conn, SessionType::Fall, 2025, at(2025, 8, 25)).expect("start");

    engine::run_rollover(&conn, &RolloverOptions::default(), at(2025, 12, 20)).expect("first close");
    let err = engine::run_rollover(&conn, &RolloverOptions::default(), at(2025, 12, 21))
        .expect_err("second close");
    assert!(matches!(err, RolloverError::NoActiveSession));

    // Promoted exactly once.
    let students = store::list_students(&conn).expect("students");
    assert_eq!(students[0].semester, "5");
    let closed = registry::get(&conn, &session.id)
        .expect("get")
        .expect("session exists");
    assert_eq!(closed.version, 1);
    assert_eq!(closed.end_date, Some(at(2025, 12, 20)));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn report_of_open_session_is_refused() {
    let workspace = temp_dir("rolloverd-guards-report");
    let conn = db::open_db(&workspace).expect("open db");
    let session = registry::start(&conn, SessionType::Fall, 2025, at(2025, 8, 25)).expect("start");

    let err = TransitionSummary::from_archived(&session).expect_err("session still open");
    assert_eq!(err, ReportError::NotClosed(session.id.clone()));
    assert_eq!(err.to_string(), format!("session {} is not closed", session.id));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn damaged_session_columns_are_reported() {
    let workspace = temp_dir("rolloverd-guards-damaged");
    let conn = db::open_db(&workspace).expect("open db");
    let session = registry::start(&conn, SessionType::Fall, 2025, at(2025, 8, 25)).expect("start");
    engine::run_rollover(&conn, &RolloverOptions::default(), at(2025, 12, 20)).expect("close");

    // Unparseable text is a read error, not a missing archive.
    conn.execute(
        "UPDATE sessions SET archived_snapshot = '{truncated' WHERE id = ?",
        [&session.id],
    )
    .expect("damage archive");
    assert!(registry::get(&conn, &session.id).is_err());

    conn.execute(
        "UPDATE sessions SET archived_snapshot = NULL, processed_counts = 'nope' WHERE id = ?",
        [&session.id],
    )
    .expect("damage counts");
    assert!(registry::get(&conn, &session.id).is_err());

    // Well-formed JSON of the wrong shape reaches the report as a corrupt archive.
    conn.execute(
        "UPDATE sessions SET archived_snapshot = '{\"teachers\":42}', processed_counts = NULL
         WHERE id = ?",
        [&session.id],
    )
    .expect("reshape archive");
    let stored = registry::get(&conn, &session.id)
        .expect("get")
        .expect("session exists");
    let err = TransitionSummary::from_archived(&stored).expect_err("archive unreadable");
    assert!(matches!(err, ReportError::CorruptArchive(_)));

    let _ = std::fs::remove_dir_all(workspace);
}

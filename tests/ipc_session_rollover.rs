use chrono::{TimeZone, Utc};
use rolloverd::db;
use rolloverd::engine::model::{ClassGroup, ClassSection, Student, Teacher};
use rolloverd::engine::store;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rolloverd");
    let mut child = Command::new(exe)
        .env_remove("ROLLOVERD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rolloverd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

fn seed_workspace(workspace: &Path) {
    let conn = db::open_db(workspace).expect("open db");
    let created = Utc.with_ymd_and_hms(2022, 9, 1, 0, 0, 0).unwrap();
    for (id, name, semester) in [("s-a", "Student A", "8"), ("s-b", "Student B", "3")] {
        store::insert_student(
            &conn,
            &Student {
                id: id.into(),
                name: name.into(),
                email: String::new(),
                registration_number: format!("REG-{}", id),
                program: "SLP".into(),
                section: "A".into(),
                semester: semester.into(),
                enrollment_year: Some(2022),
                enrollments: vec![json!("c-1")],
                enrollment_count: 1,
                created_at: created,
            },
        )
        .expect("insert student");
    }
    store::insert_teacher(
        &conn,
        &Teacher {
            id: "t-1".into(),
            name: "Teacher".into(),
            email: "t@example.org".into(),
            is_approved: true,
            class_assignments: vec![],
        },
    )
    .expect("insert teacher");
    store::insert_class(
        &conn,
        &ClassGroup {
            id: "c-1".into(),
            class_name: "SLP 3 A".into(),
            program: "SLP".into(),
            semester: 3,
            sections: vec!["A".into()],
            subjects: vec![],
            activities: vec![],
            schedules: vec![],
        },
    )
    .expect("insert class");
    store::insert_class_section(
        &conn,
        &ClassSection {
            id: "u-1".into(),
            class_id: "c-1".into(),
            semester: 3,
            section: "A".into(),
            room: String::new(),
            assigned_teacher: Some("t-1".into()),
            assigned_at: None,
            students: vec!["s-b".into()],
            enrolled_students: 1,
        },
    )
    .expect("insert section");
}

fn field<'a>(report: &'a serde_json::Value, label: &str) -> Option<&'a str> {
    report
        .get("fields")
        .and_then(|v| v.as_array())
        .and_then(|fields| {
            fields
                .iter()
                .find(|f| f.get("label").and_then(|l| l.as_str()) == Some(label))
        })
        .and_then(|f| f.get("value"))
        .and_then(|v| v.as_str())
}

#[test]
fn session_lifecycle_over_ipc() {
    let workspace = temp_dir("rolloverd-ipc-session");
    seed_workspace(&workspace);

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let no_ws = request(&mut stdin, &mut reader, "0", "session.status", json!({}));
    assert_eq!(error_code(&no_ws), Some("no_workspace"));

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let status = request_ok(&mut stdin, &mut reader, "2", "session.status", json!({}));
    assert_eq!(status["phase"].as_str(), Some("idle"));
    assert!(status["session"].is_null());

    let close_idle = request(&mut stdin, &mut reader, "3", "session.close", json!({}));
    assert_eq!(error_code(&close_idle), Some("no_active_session"));

    let bad_type = request(
        &mut stdin,
        &mut reader,
        "4",
        "session.start",
        json!({ "sessionType": "Summer", "year": 2025 }),
    );
    assert_eq!(error_code(&bad_type), Some("bad_params"));

    let started = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "session.start",
        json!({ "sessionType": "fall", "year": 2025 }),
    );
    let session_id = started["session"]["id"]
        .as_str()
        .expect("session id")
        .to_string();
    assert_eq!(started["session"]["sessionType"].as_str(), Some("Fall"));
    assert_eq!(started["session"]["phase"].as_str(), Some("active"));

    let again = request(
        &mut stdin,
        &mut reader,
        "6",
        "session.start",
        json!({ "sessionType": "Spring", "year": 2026 }),
    );
    assert_eq!(error_code(&again), Some("already_active_session"));

    let health = request_ok(&mut stdin, &mut reader, "7", "health", json!({}));
    assert_eq!(health["sessionPhase"].as_str(), Some("active"));

    request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "setup.update",
        json!({ "section": "rollover", "patch": { "backupBeforeClose": true, "bulkChunkSize": 1 } }),
    );

    let closed = request_ok(&mut stdin, &mut reader, "9", "session.close", json!({}));
    assert_eq!(closed["sessionId"].as_str(), Some(session_id.as_str()));
    assert_eq!(closed["graduatedStudents"].as_u64(), Some(1));
    assert_eq!(closed["continuingStudents"].as_u64(), Some(1));
    assert_eq!(closed["studentsProcessed"].as_u64(), Some(2));
    assert_eq!(closed["subjectsCleared"].as_bool(), Some(true));
    let report = &closed["report"];
    assert_eq!(report["title"].as_str(), Some("Fall 2025 Session Rollover"));
    assert_eq!(field(report, "Graduated Students"), Some("1"));
    assert_eq!(
        report["graduates"]["rows"][0][0].as_str(),
        Some("Student A")
    );
    let backup_path = closed["preRolloverBackup"]
        .as_str()
        .expect("backup path reported");
    assert!(Path::new(backup_path).is_file());

    let close_again = request(&mut stdin, &mut reader, "10", "session.close", json!({}));
    assert_eq!(error_code(&close_again), Some("no_active_session"));

    let listed = request_ok(&mut stdin, &mut reader, "11", "session.list", json!({}));
    let sessions = listed["sessions"].as_array().expect("sessions array");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["phase"].as_str(), Some("closed"));
    assert_eq!(sessions[0]["processed"]["graduated"].as_u64(), Some(1));
    assert!(sessions[0].get("archivedSnapshot").is_none());

    let detail = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "session.get",
        json!({ "sessionId": session_id, "includeArchive": true }),
    );
    let archived = &detail["archivedSnapshot"];
    assert_eq!(archived["students"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(archived["graduates"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(
        archived["classSections"][0]["assignedTeacher"].as_str(),
        Some("t-1")
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "setup.update",
        json!({ "section": "reports", "patch": { "includeDegreeTracking": true } }),
    );
    let model = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "reports.sessionRolloverModel",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(model["report"], closed["report"]);
    assert!(model["generatedAt"].is_string());
    assert_eq!(model["degreeTracking"].as_array().map(|a| a.len()), Some(2));

    let missing = request(
        &mut stdin,
        &mut reader,
        "15",
        "reports.sessionRolloverModel",
        json!({ "sessionId": "does-not-exist" }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));

    let status = request_ok(&mut stdin, &mut reader, "16", "session.status", json!({}));
    assert_eq!(status["phase"].as_str(), Some("idle"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn setup_sections_validate_patches() {
    let workspace = temp_dir("rolloverd-ipc-setup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let defaults = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(defaults["rollover"]["bulkChunkSize"].as_u64(), Some(500));
    assert_eq!(defaults["rollover"]["backupBeforeClose"].as_bool(), Some(false));
    assert_eq!(
        defaults["rollover"]["assignmentDateFormat"].as_str(),
        Some("%Y-%m-%d")
    );
    assert_eq!(defaults["reports"]["showGeneratedAt"].as_bool(), Some(true));

    let zero_chunk = request(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "rollover", "patch": { "bulkChunkSize": 0 } }),
    );
    assert_eq!(error_code(&zero_chunk), Some("bad_params"));

    let unknown = request(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({ "section": "rollover", "patch": { "colour": "blue" } }),
    );
    assert_eq!(error_code(&unknown), Some("bad_params"));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "setup.update",
        json!({ "section": "rollover", "patch": { "assignmentDateFormat": "%d/%m/%Y" } }),
    );
    assert_eq!(
        updated["rollover"]["assignmentDateFormat"].as_str(),
        Some("%d/%m/%Y")
    );

    let reread = request_ok(&mut stdin, &mut reader, "6", "setup.get", json!({}));
    assert_eq!(
        reread["rollover"]["assignmentDateFormat"].as_str(),
        Some("%d/%m/%Y")
    );
    assert_eq!(reread["rollover"]["bulkChunkSize"].as_u64(), Some(500));

    let unknown_method = request(&mut stdin, &mut reader, "7", "students.list", json!({}));
    assert_eq!(error_code(&unknown_method), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn backup_export_and_import_over_ipc() {
    let workspace = temp_dir("rolloverd-ipc-backup");
    let restored = temp_dir("rolloverd-ipc-backup-restored");
    seed_workspace(&workspace);
    let bundle = workspace.join("exports").join("ws.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let export = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "backup.exportWorkspace",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(export["entryCount"].as_u64(), Some(2));
    assert!(bundle.is_file());

    let import = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "backup.importWorkspace",
        json!({ "inPath": bundle.to_string_lossy(), "workspacePath": restored.to_string_lossy() }),
    );
    assert_eq!(import["dbSha256"], export["dbSha256"]);

    let status = request_ok(&mut stdin, &mut reader, "4", "session.status", json!({}));
    assert_eq!(status["phase"].as_str(), Some("idle"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "5",
        "backup.importWorkspace",
        json!({ "inPath": workspace.join("nope.zip").to_string_lossy() }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));

    drop(stdin);
    let _ = child.wait();

    let conn = db::open_db(&restored).expect("open restored");
    assert_eq!(store::list_students(&conn).expect("students").len(), 2);

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(restored);
}

#[test]
fn failed_import_keeps_workspace_usable() {
    let workspace = temp_dir("rolloverd-ipc-bad-import");
    seed_workspace(&workspace);
    let not_a_zip = workspace.join("not-a-bundle.zip");
    std::fs::write(&not_a_zip, b"plain text, not a zip archive").expect("write bad bundle");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "session.start",
        json!({ "sessionType": "Spring", "year": 2026 }),
    );

    let bad = request(
        &mut stdin,
        &mut reader,
        "3",
        "backup.importWorkspace",
        json!({ "inPath": not_a_zip.to_string_lossy() }),
    );
    assert_eq!(error_code(&bad), Some("io_failed"));

    let status = request_ok(&mut stdin, &mut reader, "4", "session.status", json!({}));
    assert_eq!(status["phase"].as_str(), Some("active"));
    let health = request_ok(&mut stdin, &mut reader, "5", "health", json!({}));
    assert_eq!(health["sessionPhase"].as_str(), Some("active"));
    request_ok(&mut stdin, &mut reader, "6", "setup.get", json!({}));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

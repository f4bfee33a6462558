use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "rolloverd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            id TEXT PRIMARY KEY,
            session_type TEXT NOT NULL,
            year INTEGER NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT,
            state TEXT NOT NULL CHECK(state IN ('active', 'closed')),
            version INTEGER NOT NULL DEFAULT 0,
            processed_counts TEXT,
            archived_snapshot TEXT
        )",
        [],
    )?;
    // At most one active session, enforced by the store itself.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_single_active
         ON sessions(state) WHERE state = 'active'",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS session_activity(
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            at TEXT NOT NULL,
            kind TEXT NOT NULL,
            message TEXT NOT NULL,
            FOREIGN KEY(session_id) REFERENCES sessions(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_session_activity_session ON session_activity(session_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL DEFAULT '',
            registration_number TEXT NOT NULL DEFAULT '',
            program TEXT NOT NULL DEFAULT '',
            section TEXT NOT NULL DEFAULT '',
            semester TEXT NOT NULL DEFAULT '1',
            enrollment_year INTEGER,
            enrollments TEXT NOT NULL DEFAULT '[]',
            enrollment_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_semester_section ON students(semester, section)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS graduates(
            id TEXT PRIMARY KEY,
            original_student_id TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            registration_number TEXT NOT NULL,
            program TEXT NOT NULL,
            section TEXT NOT NULL,
            semester TEXT NOT NULL,
            enrollment_year INTEGER,
            enrollments TEXT NOT NULL,
            enrollment_count INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            graduation_year INTEGER NOT NULL,
            graduation_date TEXT NOT NULL,
            total_semesters INTEGER NOT NULL,
            degree_status TEXT NOT NULL,
            session_type TEXT NOT NULL,
            session_year INTEGER NOT NULL,
            session_id TEXT NOT NULL,
            FOREIGN KEY(session_id) REFERENCES sessions(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_graduates_session ON graduates(session_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            class_name TEXT NOT NULL,
            program TEXT NOT NULL,
            semester INTEGER NOT NULL,
            sections TEXT NOT NULL DEFAULT '[]',
            subjects TEXT NOT NULL DEFAULT '[]',
            activities TEXT NOT NULL DEFAULT '[]',
            schedules TEXT NOT NULL DEFAULT '[]'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_sections(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            semester INTEGER NOT NULL,
            section TEXT NOT NULL,
            room TEXT NOT NULL DEFAULT '',
            assigned_teacher TEXT,
            assigned_at TEXT,
            students TEXT NOT NULL DEFAULT '[]',
            enrolled_students INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_sections_class ON class_sections(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            is_approved INTEGER NOT NULL DEFAULT 0,
            class_assignments TEXT NOT NULL DEFAULT '[]'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS registration_requests(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            requested_at TEXT NOT NULL,
            payload TEXT NOT NULL DEFAULT '{}'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    // Workspaces created before schedules were tracked on classes.
    ensure_classes_schedules(&conn)?;

    Ok(conn)
}

fn ensure_classes_schedules(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "classes", "schedules")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE classes ADD COLUMN schedules TEXT NOT NULL DEFAULT '[]'",
        [],
    )?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| r.get(0))
        .optional()?;
    match raw {
        Some(text) => Ok(serde_json::from_str(&text).ok()),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, serde_json::to_string(value)?),
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

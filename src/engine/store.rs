//! Row mapping between the workspace database and the engine's entity types.
//!
//! Every function takes the connection explicitly; the executor passes its
//! open transaction (which derefs to `Connection`) so that reads and writes
//! all happen inside the same atomic unit.

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params_from_iter, Connection, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::StoreResult;
use super::model::{
    ActivityEntry, ClassGroup, ClassSection, Graduate, RegistrationRequest, SessionType, Student,
    Teacher,
};

/// Read-only copy of every entity the rollover touches, taken before mutation.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub teachers: Vec<Teacher>,
    pub students: Vec<Student>,
    pub classes: Vec<ClassGroup>,
    pub class_sections: Vec<ClassSection>,
    pub registration_requests: Vec<RegistrationRequest>,
    pub activity_log: Vec<ActivityEntry>,
}

pub fn read_snapshot(conn: &Connection, session_id: &str) -> StoreResult<Snapshot> {
    Ok(Snapshot {
        teachers: list_teachers(conn)?,
        students: list_students(conn)?,
        classes: list_classes(conn)?,
        class_sections: list_class_sections(conn)?,
        registration_requests: list_registration_requests(conn)?,
        activity_log: list_activity(conn, session_id)?,
    })
}

pub(super) fn json_col<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(super) fn opt_json_col<T: DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        serde_json::from_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(super) fn session_type_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<SessionType> {
    let raw: String = row.get(idx)?;
    SessionType::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown session type: {}", raw).into(),
        )
    })
}

fn to_json<T: Serialize>(value: &T) -> StoreResult<String> {
    Ok(serde_json::to_string(value)?)
}

pub fn list_students(conn: &Connection) -> StoreResult<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, email, registration_number, program, section, semester,
                enrollment_year, enrollments, enrollment_count, created_at
         FROM students
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Student {
                id: r.get(0)?,
                name: r.get(1)?,
                email: r.get(2)?,
                registration_number: r.get(3)?,
                program: r.get(4)?,
                section: r.get(5)?,
                semester: r.get(6)?,
                enrollment_year: r.get(7)?,
                enrollments: json_col(r, 8)?,
                enrollment_count: r.get(9)?,
                created_at: r.get(10)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_student(conn: &Connection, s: &Student) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO students(
            id, name, email, registration_number, program, section, semester,
            enrollment_year, enrollments, enrollment_count, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            s.id,
            s.name,
            s.email,
            s.registration_number,
            s.program,
            s.section,
            s.semester,
            s.enrollment_year,
            to_json(&s.enrollments)?,
            s.enrollment_count,
            s.created_at,
        ],
    )?;
    Ok(())
}

pub fn list_graduates(conn: &Connection) -> StoreResult<Vec<Graduate>> {
    let mut stmt = conn.prepare(
        "SELECT id, original_student_id, name, email, registration_number, program, section,
                semester, enrollment_year, enrollments, enrollment_count, created_at,
                graduation_year, graduation_date, total_semesters, degree_status,
                session_type, session_year, session_id
         FROM graduates
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Graduate {
                id: r.get(0)?,
                original_student_id: r.get(1)?,
                name: r.get(2)?,
                email: r.get(3)?,
                registration_number: r.get(4)?,
                program: r.get(5)?,
                section: r.get(6)?,
                semester: r.get(7)?,
                enrollment_year: r.get(8)?,
                enrollments: json_col(r, 9)?,
                enrollment_count: r.get(10)?,
                created_at: r.get(11)?,
                graduation_year: r.get(12)?,
                graduation_date: r.get(13)?,
                total_semesters: r.get(14)?,
                degree_status: r.get(15)?,
                session_type: session_type_col(r, 16)?,
                session_year: r.get(17)?,
                session_id: r.get(18)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_graduates(conn: &Connection, graduates: &[Graduate]) -> StoreResult<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO graduates(
            id, original_student_id, name, email, registration_number, program, section,
            semester, enrollment_year, enrollments, enrollment_count, created_at,
            graduation_year, graduation_date, total_semesters, degree_status,
            session_type, session_year, session_id
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    for g in graduates {
        stmt.execute(rusqlite::params![
            g.id,
            g.original_student_id,
            g.name,
            g.email,
            g.registration_number,
            g.program,
            g.section,
            g.semester,
            g.enrollment_year,
            to_json(&g.enrollments)?,
            g.enrollment_count,
            g.created_at,
            g.graduation_year,
            g.graduation_date,
            g.total_semesters,
            g.degree_status,
            g.session_type.as_str(),
            g.session_year,
            g.session_id,
        ])?;
    }
    Ok(graduates.len())
}

pub fn list_classes(conn: &Connection) -> StoreResult<Vec<ClassGroup>> {
    let mut stmt = conn.prepare(
        "SELECT id, class_name, program, semester, sections, subjects, activities, schedules
         FROM classes
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassGroup {
                id: r.get(0)?,
                class_name: r.get(1)?,
                program: r.get(2)?,
                semester: r.get(3)?,
                sections: json_col(r, 4)?,
                subjects: json_col(r, 5)?,
                activities: json_col(r, 6)?,
                schedules: json_col(r, 7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_class(conn: &Connection, c: &ClassGroup) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO classes(id, class_name, program, semester, sections, subjects, activities, schedules)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            c.id,
            c.class_name,
            c.program,
            c.semester,
            to_json(&c.sections)?,
            to_json(&c.subjects)?,
            to_json(&c.activities)?,
            to_json(&c.schedules)?,
        ],
    )?;
    Ok(())
}

pub fn list_class_sections(conn: &Connection) -> StoreResult<Vec<ClassSection>> {
    let mut stmt = conn.prepare(
        "SELECT id, class_id, semester, section, room, assigned_teacher, assigned_at,
                students, enrolled_students
         FROM class_sections
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassSection {
                id: r.get(0)?,
                class_id: r.get(1)?,
                semester: r.get(2)?,
                section: r.get(3)?,
                room: r.get(4)?,
                assigned_teacher: r.get(5)?,
                assigned_at: r.get(6)?,
                students: json_col(r, 7)?,
                enrolled_students: r.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_class_section(conn: &Connection, s: &ClassSection) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO class_sections(
            id, class_id, semester, section, room, assigned_teacher, assigned_at,
            students, enrolled_students
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            s.id,
            s.class_id,
            s.semester,
            s.section,
            s.room,
            s.assigned_teacher,
            s.assigned_at,
            to_json(&s.students)?,
            s.enrolled_students,
        ],
    )?;
    Ok(())
}

pub fn list_teachers(conn: &Connection) -> StoreResult<Vec<Teacher>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, email, is_approved, class_assignments
         FROM teachers
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([], |r| {
            let approved: i64 = r.get(3)?;
            Ok(Teacher {
                id: r.get(0)?,
                name: r.get(1)?,
                email: r.get(2)?,
                is_approved: approved != 0,
                class_assignments: json_col(r, 4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_teacher(conn: &Connection, t: &Teacher) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO teachers(id, name, email, is_approved, class_assignments)
         VALUES(?, ?, ?, ?, ?)",
        rusqlite::params![
            t.id,
            t.name,
            t.email,
            t.is_approved as i64,
            to_json(&t.class_assignments)?,
        ],
    )?;
    Ok(())
}

pub fn list_registration_requests(conn: &Connection) -> StoreResult<Vec<RegistrationRequest>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, email, role, requested_at, payload
         FROM registration_requests
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(RegistrationRequest {
                id: r.get(0)?,
                name: r.get(1)?,
                email: r.get(2)?,
                role: r.get(3)?,
                requested_at: r.get(4)?,
                payload: json_col(r, 5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_registration_request(conn: &Connection, r: &RegistrationRequest) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO registration_requests(id, name, email, role, requested_at, payload)
         VALUES(?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            r.id,
            r.name,
            r.email,
            r.role,
            r.requested_at,
            to_json(&r.payload)?,
        ],
    )?;
    Ok(())
}

pub fn list_activity(conn: &Connection, session_id: &str) -> StoreResult<Vec<ActivityEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, at, kind, message
         FROM session_activity
         WHERE session_id = ?
         ORDER BY at, rowid",
    )?;
    let rows = stmt
        .query_map([session_id], |r| {
            Ok(ActivityEntry {
                id: r.get(0)?,
                session_id: r.get(1)?,
                at: r.get(2)?,
                kind: r.get(3)?,
                message: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn append_activity(
    conn: &Connection,
    session_id: &str,
    at: DateTime<Utc>,
    kind: &str,
    message: &str,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO session_activity(id, session_id, at, kind, message) VALUES(?, ?, ?, ?, ?)",
        rusqlite::params![uuid::Uuid::new_v4().to_string(), session_id, at, kind, message],
    )?;
    Ok(())
}

/// Runs `sql` once per chunk of `ids`. The statement must contain a single
/// `{ids}` marker, which is replaced by the chunk's placeholder list; `leading`
/// values bind to the placeholders that precede it.
pub fn execute_for_ids(
    conn: &Connection,
    sql: &str,
    leading: &[Value],
    ids: &[String],
    chunk_size: usize,
) -> StoreResult<usize> {
    let mut affected = 0;
    for chunk in ids.chunks(chunk_size.max(1)) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let stmt_sql = sql.replace("{ids}", &placeholders);
        let params = leading
            .iter()
            .cloned()
            .chain(chunk.iter().map(|id| Value::Text(id.clone())));
        affected += conn.execute(&stmt_sql, params_from_iter(params))?;
    }
    Ok(affected)
}

pub fn count_rows(conn: &Connection, table: &str) -> StoreResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    Ok(conn.query_row(&sql, [], |r| r.get(0))?)
}

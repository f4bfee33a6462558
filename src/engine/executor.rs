//! The rollover itself: one immediate transaction that reads the snapshot,
//! applies every mutation as grouped bulk writes, archives the pre-rollover
//! state onto the session and closes it.
//!
//! The transaction handle is passed to each step explicitly. Returning early
//! drops it uncommitted, which rolls everything back.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::archive;
use super::classify::{self, GraduateFields};
use super::error::{RolloverError, RolloverStep};
use super::model::{ClassGroup, ClassSection, Graduate, ProcessedCounts, Session, Student};
use super::registry;
use super::report::TransitionSummary;
use super::stats::{self, RolloverStatistics, DEFAULT_ASSIGNMENT_DATE_FORMAT};
use super::store;

pub const DEFAULT_BULK_CHUNK_SIZE: usize = 500;

#[derive(Debug, Clone)]
pub struct RolloverOptions {
    /// Maximum ids bound into one bulk statement.
    pub bulk_chunk_size: usize,
    pub assignment_date_format: String,
}

impl Default for RolloverOptions {
    fn default() -> Self {
        Self {
            bulk_chunk_size: DEFAULT_BULK_CHUNK_SIZE,
            assignment_date_format: DEFAULT_ASSIGNMENT_DATE_FORMAT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransitionResult {
    pub summary: TransitionSummary,
    pub statistics: RolloverStatistics,
}

pub fn graduate_record(student: &Student, fields: &GraduateFields, session: &Session) -> Graduate {
    Graduate {
        id: Uuid::new_v4().to_string(),
        original_student_id: student.id.clone(),
        name: student.name.clone(),
        email: student.email.clone(),
        registration_number: student.registration_number.clone(),
        program: student.program.clone(),
        section: student.section.clone(),
        semester: student.semester.clone(),
        enrollment_year: student.enrollment_year,
        enrollments: student.enrollments.clone(),
        enrollment_count: student.enrollment_count,
        created_at: student.created_at,
        graduation_year: fields.graduation_year,
        graduation_date: fields.graduation_date,
        total_semesters: fields.total_semesters,
        degree_status: fields.degree_status.to_string(),
        session_type: session.session_type,
        session_year: session.year,
        session_id: session.id.clone(),
    }
}

pub fn run_rollover(
    conn: &Connection,
    options: &RolloverOptions,
    now: DateTime<Utc>,
) -> Result<TransitionResult, RolloverError> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|e| RolloverError::abort(RolloverStep::Begin, e))?;

    match apply(&tx, options, now) {
        Ok(result) => {
            tx.commit()
                .map_err(|e| RolloverError::abort(RolloverStep::Commit, e))?;
            info!(
                session_id = %result.summary.session_id,
                graduated = result.summary.graduated_students,
                continuing = result.summary.continuing_students,
                classes = result.summary.classes_processed,
                sections = result.summary.sections_processed,
                "rollover committed"
            );
            Ok(result)
        }
        Err(e) => {
            match e.step() {
                Some(step) => warn!(step = step.as_str(), error = %e, "rollover rolled back"),
                None => debug!(error = %e, "rollover rejected"),
            }
            Err(e)
        }
    }
}

fn apply(
    tx: &Transaction<'_>,
    options: &RolloverOptions,
    now: DateTime<Utc>,
) -> Result<TransitionResult, RolloverError> {
    let chunk = options.bulk_chunk_size.max(1);

    // 1. snapshot
    let session = registry::get_active(tx)
        .map_err(|e| RolloverError::abort(RolloverStep::SnapshotRead, e))?
        .ok_or(RolloverError::NoActiveSession)?;
    let snapshot = store::read_snapshot(tx, &session.id)
        .map_err(|e| RolloverError::abort(RolloverStep::SnapshotRead, e))?;
    info!(
        session_id = %session.id,
        teachers = snapshot.teachers.len(),
        students = snapshot.students.len(),
        classes = snapshot.classes.len(),
        sections = snapshot.class_sections.len(),
        "rollover snapshot taken"
    );

    // 2. pure computation
    let statistics = stats::aggregate(&snapshot, now, &options.assignment_date_format);
    let (graduates, continuing_groups) = {
        let classification = classify::partition(&snapshot.students, now);
        let graduates: Vec<Graduate> = classification
            .graduates
            .iter()
            .map(|(s, fields)| graduate_record(s, fields, &session))
            .collect();
        let mut groups: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for (s, c) in &classification.continuing {
            groups.entry(c.new_semester).or_default().push(s.id.clone());
        }
        (graduates, groups)
    };
    let continuing: usize = continuing_groups.values().map(Vec::len).sum();
    let counts = ProcessedCounts {
        teachers: snapshot.teachers.len(),
        students: snapshot.students.len(),
        graduated: graduates.len(),
        continuing,
        classes: snapshot.classes.len(),
        sections: snapshot.class_sections.len(),
    };

    // 3. teacher assignments (credentials go with them; the archive keeps a copy)
    let cleared = tx
        .execute("UPDATE teachers SET class_assignments = '[]'", [])
        .map_err(|e| RolloverError::abort(RolloverStep::ClearTeacherAssignments, e))?;
    debug!(teachers = cleared, "teacher assignments cleared");

    // 4. graduates in, graduated students out
    store::insert_graduates(tx, &graduates)
        .map_err(|e| RolloverError::abort(RolloverStep::GraduateStudents, e))?;
    let graduated_ids: Vec<String> = graduates
        .iter()
        .map(|g| g.original_student_id.clone())
        .collect();
    store::execute_for_ids(
        tx,
        "DELETE FROM students WHERE id IN ({ids})",
        &[],
        &graduated_ids,
        chunk,
    )
    .map_err(|e| RolloverError::abort(RolloverStep::GraduateStudents, e))?;
    debug!(graduated = graduated_ids.len(), "graduates archived");

    // 5. continuing students, one bulk update per target semester
    for (new_semester, ids) in &continuing_groups {
        store::execute_for_ids(
            tx,
            "UPDATE students
             SET semester = ?, enrollments = '[]', enrollment_count = 0
             WHERE id IN ({ids})",
            &[Value::Text(new_semester.to_string())],
            ids,
            chunk,
        )
        .map_err(|e| RolloverError::abort(RolloverStep::PromoteStudents, e))?;
    }
    debug!(continuing, "students promoted");

    // 6. class sections
    for (semester, ids) in group_sections(&snapshot.class_sections) {
        store::execute_for_ids(
            tx,
            "UPDATE class_sections
             SET semester = ?, assigned_teacher = NULL, assigned_at = NULL,
                 students = '[]', enrolled_students = 0
             WHERE id IN ({ids})",
            &[Value::Integer(semester)],
            &ids,
            chunk,
        )
        .map_err(|e| RolloverError::abort(RolloverStep::RotateClassSections, e))?;
    }

    // 7. classes
    for ((semester, class_name), ids) in group_classes(&snapshot.classes) {
        store::execute_for_ids(
            tx,
            "UPDATE classes
             SET semester = ?, class_name = ?, subjects = '[]', activities = '[]'
             WHERE id IN ({ids})",
            &[Value::Integer(semester), Value::Text(class_name)],
            &ids,
            chunk,
        )
        .map_err(|e| RolloverError::abort(RolloverStep::RotateClasses, e))?;
    }

    // 8. registration requests
    tx.execute("DELETE FROM registration_requests", [])
        .map_err(|e| RolloverError::abort(RolloverStep::PurgeRegistrationRequests, e))?;

    // 9. archive + close
    let archived = archive::build_archive(snapshot, graduates.clone(), statistics.clone(), counts);
    let encoded = archive::encode(&archived)
        .map_err(|e| RolloverError::abort(RolloverStep::CloseSession, e))?;
    registry::close(tx, &session, &counts, &encoded, now)?;

    Ok(TransitionResult {
        summary: TransitionSummary::new(&session, now, &counts, graduates),
        statistics,
    })
}

fn group_sections(sections: &[ClassSection]) -> BTreeMap<i64, Vec<String>> {
    let mut groups: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    for s in sections {
        groups
            .entry(classify::rotate(s.semester))
            .or_default()
            .push(s.id.clone());
    }
    groups
}

fn group_classes(classes: &[ClassGroup]) -> BTreeMap<(i64, String), Vec<String>> {
    let mut groups: BTreeMap<(i64, String), Vec<String>> = BTreeMap::new();
    for c in classes {
        let semester = classify::rotate(c.semester);
        let name = classify::regenerate_class_name(&c.program, semester, &c.sections);
        groups.entry((semester, name)).or_default().push(c.id.clone());
    }
    groups
}

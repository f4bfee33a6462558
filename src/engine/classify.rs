use chrono::{DateTime, Datelike, Utc};

use super::model::Student;

pub const GRADUATION_SEMESTER: i64 = 8;
pub const TOTAL_SEMESTERS: i64 = 8;
pub const DEGREE_COMPLETED: &str = "Completed";

#[derive(Debug, Clone, PartialEq)]
pub struct GraduateFields {
    pub graduation_year: i32,
    pub graduation_date: DateTime<Utc>,
    pub total_semesters: i64,
    pub degree_status: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinueFields {
    pub new_semester: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationOutcome {
    Graduate(GraduateFields),
    Continue(ContinueFields),
}

/// Decides a single student's outcome. Only the semester threshold counts.
pub fn classify(student: &Student, now: DateTime<Utc>) -> ClassificationOutcome {
    let semester = student.semester_number();
    if semester >= GRADUATION_SEMESTER {
        ClassificationOutcome::Graduate(GraduateFields {
            graduation_year: now.year(),
            graduation_date: now,
            total_semesters: TOTAL_SEMESTERS,
            degree_status: DEGREE_COMPLETED,
        })
    } else {
        ClassificationOutcome::Continue(ContinueFields {
            new_semester: semester + 1,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Classification<'a> {
    pub graduates: Vec<(&'a Student, GraduateFields)>,
    pub continuing: Vec<(&'a Student, ContinueFields)>,
}

pub fn partition(students: &[Student], now: DateTime<Utc>) -> Classification<'_> {
    let mut out = Classification::default();
    for s in students {
        match classify(s, now) {
            ClassificationOutcome::Graduate(g) => out.graduates.push((s, g)),
            ClassificationOutcome::Continue(c) => out.continuing.push((s, c)),
        }
    }
    out
}

/// Semester rotation shared by class sections and classes: 8 wraps to 1.
pub fn rotate(semester: i64) -> i64 {
    if semester >= GRADUATION_SEMESTER {
        1
    } else {
        semester + 1
    }
}

pub fn regenerate_class_name(program: &str, new_semester: i64, sections: &[String]) -> String {
    let mut sorted: Vec<&str> = sections.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    format!("{} {} {}", program, new_semester, sorted.concat())
}

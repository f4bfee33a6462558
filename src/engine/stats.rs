//! Per-dimension counts over a rollover snapshot. Pure; nothing here touches
//! the database.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::store::Snapshot;

/// Years between enrollment and the expected graduation used by degree tracking.
pub const EXPECTED_PROGRAM_YEARS: i32 = 4;

pub const DEFAULT_ASSIGNMENT_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloverStatistics {
    pub total_teachers: usize,
    pub approved_teachers: usize,
    pub teachers_with_assignments: usize,
    pub total_students: usize,
    pub total_classes: usize,
    pub total_sections: usize,
    pub registration_requests: usize,
    pub students_by_semester: BTreeMap<String, usize>,
    pub students_by_program: BTreeMap<String, usize>,
    pub students_by_section: BTreeMap<String, usize>,
    pub students_by_enrollment_year: BTreeMap<String, usize>,
    pub classes_by_semester: BTreeMap<String, usize>,
    pub classes_by_program: BTreeMap<String, usize>,
    pub sections_with_teacher: usize,
    pub sections_with_students: usize,
    pub assignment_rows: Vec<AssignmentRow>,
    pub degree_tracking: Vec<DegreeTrackingRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRow {
    pub teacher_name: String,
    pub teacher_email: String,
    pub class_display_name: String,
    pub subject: String,
    pub sections: String,
    pub assigned_at: String,
}

/// Diagnostic row for the report. `is_graduated` is a heuristic and does not
/// decide who graduates; see `classify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DegreeTrackingRow {
    pub student_id: String,
    pub name: String,
    pub registration_number: String,
    pub program: String,
    pub semester: i64,
    pub enrollment_year: i32,
    pub expected_graduation: i32,
    pub is_graduated: bool,
}

/// True when `fmt` is a strftime pattern chrono can render without error.
pub fn is_valid_date_format(fmt: &str) -> bool {
    StrftimeItems::new(fmt).all(|item| !matches!(item, Item::Error))
}

fn bump(map: &mut BTreeMap<String, usize>, key: impl Into<String>) {
    *map.entry(key.into()).or_insert(0) += 1;
}

fn label_or_unassigned(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        "Unassigned".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn aggregate(snapshot: &Snapshot, now: DateTime<Utc>, date_format: &str) -> RolloverStatistics {
    let current_year = now.year();
    let date_format = if is_valid_date_format(date_format) {
        date_format
    } else {
        DEFAULT_ASSIGNMENT_DATE_FORMAT
    };
    let mut stats = RolloverStatistics {
        total_teachers: snapshot.teachers.len(),
        total_students: snapshot.students.len(),
        total_classes: snapshot.classes.len(),
        total_sections: snapshot.class_sections.len(),
        registration_requests: snapshot.registration_requests.len(),
        ..Default::default()
    };

    for teacher in &snapshot.teachers {
        if teacher.is_approved {
            stats.approved_teachers += 1;
        }
        if !teacher.class_assignments.is_empty() {
            stats.teachers_with_assignments += 1;
        }
        for a in &teacher.class_assignments {
            stats.assignment_rows.push(AssignmentRow {
                teacher_name: teacher.name.clone(),
                teacher_email: teacher.email.clone(),
                class_display_name: a.class_display_name.clone(),
                subject: a.subject.clone(),
                sections: a.sections.join(", "),
                assigned_at: a
                    .assigned_at
                    .map(|d| d.format(date_format).to_string())
                    .unwrap_or_default(),
            });
        }
    }

    for s in &snapshot.students {
        let semester = s.semester_number();
        let enrollment_year = s.effective_enrollment_year();
        bump(&mut stats.students_by_semester, semester.to_string());
        bump(&mut stats.students_by_program, label_or_unassigned(&s.program));
        bump(&mut stats.students_by_section, label_or_unassigned(&s.section));
        bump(
            &mut stats.students_by_enrollment_year,
            enrollment_year.to_string(),
        );

        let expected_graduation = enrollment_year.saturating_add(EXPECTED_PROGRAM_YEARS);
        stats.degree_tracking.push(DegreeTrackingRow {
            student_id: s.id.clone(),
            name: s.name.clone(),
            registration_number: s.registration_number.clone(),
            program: s.program.clone(),
            semester,
            enrollment_year,
            expected_graduation,
            is_graduated: semester >= 8 || current_year >= expected_graduation,
        });
    }

    for c in &snapshot.classes {
        bump(&mut stats.classes_by_semester, c.semester.to_string());
        bump(&mut stats.classes_by_program, label_or_unassigned(&c.program));
    }

    for section in &snapshot.class_sections {
        if section.assigned_teacher.is_some() {
            stats.sections_with_teacher += 1;
        }
        if section.enrolled_students > 0 || !section.students.is_empty() {
            stats.sections_with_students += 1;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::{ClassAssignment, ClassSection, Student, Teacher};
    use chrono::TimeZone;

    fn student(id: &str, semester: &str, program: &str, year: Option<i32>) -> Student {
        Student {
            id: id.into(),
            name: format!("Student {}", id),
            email: format!("{}@example.org", id),
            registration_number: format!("R-{}", id),
            program: program.into(),
            section: "A".into(),
            semester: semester.into(),
            enrollment_year: year,
            enrollments: vec![],
            enrollment_count: 0,
            created_at: Utc.with_ymd_and_hms(2023, 2, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn histograms_and_tracking_rows() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let snapshot = Snapshot {
            students: vec![
                student("a", "8", "SLP", Some(2021)),
                student("b", "5", "SLP", Some(2023)),
                student("c", "bogus", "OT", None),
            ],
            teachers: vec![Teacher {
                id: "t1".into(),
                name: "Grace".into(),
                email: "grace@example.org".into(),
                is_approved: true,
                class_assignments: vec![ClassAssignment {
                    class_id: "c1".into(),
                    sections: vec!["A".into(), "B".into()],
                    subject: "Phonetics".into(),
                    class_display_name: "SLP 5 AB".into(),
                    class_credentials: None,
                    assigned_at: Some(Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap()),
                }],
            }],
            class_sections: vec![ClassSection {
                id: "u1".into(),
                class_id: "c1".into(),
                semester: 5,
                section: "A".into(),
                room: "101".into(),
                assigned_teacher: Some("t1".into()),
                assigned_at: None,
                students: vec!["b".into()],
                enrolled_students: 1,
            }],
            ..Default::default()
        };

        let stats = aggregate(&snapshot, now, DEFAULT_ASSIGNMENT_DATE_FORMAT);
        assert_eq!(stats.total_students, 3);
        assert_eq!(stats.students_by_program.get("SLP"), Some(&2));
        assert_eq!(stats.students_by_semester.get("1"), Some(&1));
        assert_eq!(stats.students_by_enrollment_year.get("2023"), Some(&2));
        assert_eq!(stats.approved_teachers, 1);
        assert_eq!(stats.teachers_with_assignments, 1);
        assert_eq!(stats.sections_with_teacher, 1);
        assert_eq!(stats.sections_with_students, 1);
        assert_eq!(stats.assignment_rows[0].sections, "A, B");
        assert_eq!(stats.assignment_rows[0].assigned_at, "2025-01-15");

        let a = &stats.degree_tracking[0];
        assert_eq!(a.expected_graduation, 2025);
        assert!(a.is_graduated);
        let c = &stats.degree_tracking[2];
        assert_eq!(c.semester, 1);
        assert_eq!(c.expected_graduation, 2027);
        assert!(!c.is_graduated);
    }

    #[test]
    fn extreme_enrollment_year_saturates() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let snapshot = Snapshot {
            students: vec![student("z", "2", "OT", Some(i32::MAX))],
            ..Default::default()
        };
        let stats = aggregate(&snapshot, now, DEFAULT_ASSIGNMENT_DATE_FORMAT);
        let row = &stats.degree_tracking[0];
        assert_eq!(row.enrollment_year, i32::MAX);
        assert_eq!(row.expected_graduation, i32::MAX);
        assert!(!row.is_graduated);
    }

    #[test]
    fn invalid_date_format_falls_back() {
        assert!(is_valid_date_format("%d/%m/%Y"));
        assert!(!is_valid_date_format("%Q"));
    }
}

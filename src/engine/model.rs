use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::registry::SessionPhase;

/// Semester value used when a stored semester does not parse as an integer.
pub const DEFAULT_SEMESTER: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionType {
    Spring,
    Fall,
}

impl SessionType {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionType::Spring => "Spring",
            SessionType::Fall => "Fall",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "spring" => Some(SessionType::Spring),
            "fall" => Some(SessionType::Fall),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedCounts {
    pub teachers: usize,
    pub students: usize,
    pub graduated: usize,
    pub continuing: usize,
    pub classes: usize,
    pub sections: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub session_type: SessionType,
    pub year: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub phase: SessionPhase,
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<ProcessedCounts>,
    #[serde(skip_serializing)]
    pub archived_snapshot: Option<serde_json::Value>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
    pub registration_number: String,
    pub program: String,
    pub section: String,
    /// Stored as text; see [`parse_semester`].
    pub semester: String,
    pub enrollment_year: Option<i32>,
    pub enrollments: Vec<serde_json::Value>,
    pub enrollment_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Student {
    pub fn semester_number(&self) -> i64 {
        parse_semester(&self.semester)
    }

    pub fn effective_enrollment_year(&self) -> i32 {
        self.enrollment_year.unwrap_or_else(|| self.created_at.year())
    }
}

pub fn parse_semester(raw: &str) -> i64 {
    raw.trim().parse::<i64>().unwrap_or(DEFAULT_SEMESTER)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graduate {
    pub id: String,
    pub original_student_id: String,
    pub name: String,
    pub email: String,
    pub registration_number: String,
    pub program: String,
    pub section: String,
    pub semester: String,
    pub enrollment_year: Option<i32>,
    pub enrollments: Vec<serde_json::Value>,
    pub enrollment_count: i64,
    pub created_at: DateTime<Utc>,
    pub graduation_year: i32,
    pub graduation_date: DateTime<Utc>,
    pub total_semesters: i64,
    pub degree_status: String,
    pub session_type: SessionType,
    pub session_year: i32,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSection {
    pub id: String,
    pub class_id: String,
    pub semester: i64,
    pub section: String,
    pub room: String,
    pub assigned_teacher: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub students: Vec<String>,
    pub enrolled_students: i64,
}

/// A course group ("Class") spanning one or more section codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    pub id: String,
    pub class_name: String,
    pub program: String,
    pub semester: i64,
    pub sections: Vec<String>,
    pub subjects: Vec<serde_json::Value>,
    pub activities: Vec<serde_json::Value>,
    pub schedules: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAssignment {
    pub class_id: String,
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub class_display_name: String,
    pub class_credentials: Option<ClassCredentials>,
    pub assigned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub name: String,
    pub email: String,
    pub is_approved: bool,
    pub class_assignments: Vec<ClassAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub requested_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub session_id: String,
    pub at: DateTime<Utc>,
    pub kind: String,
    pub message: String,
}

//! Data contract for the downloadable rollover report.
//!
//! The assembler only builds ordered rows and a graduates table; turning them
//! into a spreadsheet is the renderer's job on the UI side.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::archive;
use super::error::ReportError;
use super::model::{Graduate, ProcessedCounts, Session, SessionType};
use super::registry::SessionPhase;

const REPORT_DATE_FORMAT: &str = "%Y-%m-%d";

pub const GRADUATE_COLUMNS: [&str; 4] = [
    "Name",
    "Registration Number",
    "Program",
    "Graduation Year",
];

/// What a rollover did, as returned to the caller of `session.close`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionSummary {
    pub session_id: String,
    pub session_type: SessionType,
    pub year: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub teachers_processed: usize,
    pub students_processed: usize,
    pub graduated_students: usize,
    pub continuing_students: usize,
    pub classes_processed: usize,
    pub sections_processed: usize,
    pub subjects_cleared: bool,
    #[serde(skip)]
    pub graduates: Vec<Graduate>,
}

impl TransitionSummary {
    pub fn new(
        session: &Session,
        end_date: DateTime<Utc>,
        counts: &ProcessedCounts,
        graduates: Vec<Graduate>,
    ) -> Self {
        Self {
            session_id: session.id.clone(),
            session_type: session.session_type,
            year: session.year,
            start_date: session.start_date,
            end_date: Some(end_date),
            teachers_processed: counts.teachers,
            students_processed: counts.students,
            graduated_students: counts.graduated,
            continuing_students: counts.continuing,
            classes_processed: counts.classes,
            sections_processed: counts.sections,
            subjects_cleared: true,
            graduates,
        }
    }

    /// Rebuilds the summary of an already closed session from its archive.
    pub fn from_archived(session: &Session) -> Result<Self, ReportError> {
        if session.phase != SessionPhase::Closed {
            return Err(ReportError::NotClosed(session.id.clone()));
        }
        let raw = session
            .archived_snapshot
            .as_ref()
            .ok_or_else(|| ReportError::MissingArchive(session.id.clone()))?;
        let archived =
            archive::decode(raw).map_err(|e| ReportError::CorruptArchive(e.to_string()))?;
        let end_date = session
            .end_date
            .ok_or_else(|| ReportError::MissingEndDate(session.id.clone()))?;
        Ok(Self::new(
            session,
            end_date,
            &archived.processed,
            archived.graduates,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportField {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub title: String,
    pub fields: Vec<ReportField>,
    pub graduates: ReportTable,
}

fn field(label: &str, value: impl ToString) -> ReportField {
    ReportField {
        label: label.to_string(),
        value: value.to_string(),
    }
}

pub fn assemble(summary: &TransitionSummary) -> Result<SessionReport, ReportError> {
    let end_date = summary
        .end_date
        .ok_or_else(|| ReportError::MissingEndDate(summary.session_id.clone()))?;
    if end_date < summary.start_date {
        return Err(ReportError::EndBeforeStart(summary.session_id.clone()));
    }
    let duration_days = (end_date - summary.start_date).num_days();

    let fields = vec![
        field("Session Type", summary.session_type.as_str()),
        field("Year", summary.year),
        field("Start Date", summary.start_date.format(REPORT_DATE_FORMAT)),
        field("End Date", end_date.format(REPORT_DATE_FORMAT)),
        field("Duration (days)", duration_days),
        field("Teachers Processed", summary.teachers_processed),
        field("Students Processed", summary.students_processed),
        field("Graduated Students", summary.graduated_students),
        field("Continuing Students", summary.continuing_students),
        field("Classes Processed", summary.classes_processed),
        field("Sections Processed", summary.sections_processed),
        field(
            "Subjects Cleared",
            if summary.subjects_cleared { "Yes" } else { "No" },
        ),
    ];

    let rows = summary
        .graduates
        .iter()
        .map(|g| {
            vec![
                g.name.clone(),
                g.registration_number.clone(),
                g.program.clone(),
                g.graduation_year.to_string(),
            ]
        })
        .collect();

    Ok(SessionReport {
        title: format!(
            "{} {} Session Rollover",
            summary.session_type.as_str(),
            summary.year
        ),
        fields,
        graduates: ReportTable {
            columns: GRADUATE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows,
        },
    })
}

//! Error taxonomy for the rollover engine.
//!
//! Precondition failures (`NoActiveSession`, `AlreadyActiveSession`) are
//! raised before anything is written. `TransitionAbort` means the rollover
//! transaction was rolled back. `ReportGeneration` only ever happens after
//! the transition has committed.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Logical step of the rollover, used to give aborts context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverStep {
    Begin,
    SnapshotRead,
    ClearTeacherAssignments,
    GraduateStudents,
    PromoteStudents,
    RotateClassSections,
    RotateClasses,
    PurgeRegistrationRequests,
    CloseSession,
    Commit,
}

impl RolloverStep {
    pub fn as_str(self) -> &'static str {
        match self {
            RolloverStep::Begin => "begin",
            RolloverStep::SnapshotRead => "snapshot_read",
            RolloverStep::ClearTeacherAssignments => "clear_teacher_assignments",
            RolloverStep::GraduateStudents => "graduate_students",
            RolloverStep::PromoteStudents => "promote_students",
            RolloverStep::RotateClassSections => "rotate_class_sections",
            RolloverStep::RotateClasses => "rotate_classes",
            RolloverStep::PurgeRegistrationRequests => "purge_registration_requests",
            RolloverStep::CloseSession => "close_session",
            RolloverStep::Commit => "commit",
        }
    }
}

impl std::fmt::Display for RolloverStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("session {0} is not closed")]
    NotClosed(String),

    #[error("session {0} has no end date")]
    MissingEndDate(String),

    #[error("session {0} ends before it starts")]
    EndBeforeStart(String),

    #[error("session {0} has no archived snapshot")]
    MissingArchive(String),

    #[error("archived snapshot is unreadable: {0}")]
    CorruptArchive(String),
}

#[derive(Debug, Error)]
pub enum RolloverError {
    #[error("no active session")]
    NoActiveSession,

    #[error("a session is already active")]
    AlreadyActiveSession,

    #[error("rollover aborted during {step}: {source}")]
    TransitionAbort {
        step: RolloverStep,
        #[source]
        source: StoreError,
    },

    #[error("report generation failed: {0}")]
    ReportGeneration(#[from] ReportError),

    #[error("pre-rollover backup failed: {0}")]
    Backup(anyhow::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RolloverError {
    pub fn abort(step: RolloverStep, source: impl Into<StoreError>) -> Self {
        RolloverError::TransitionAbort {
            step,
            source: source.into(),
        }
    }

    /// Stable error code reported over IPC.
    pub fn code(&self) -> &'static str {
        match self {
            RolloverError::NoActiveSession => "no_active_session",
            RolloverError::AlreadyActiveSession => "already_active_session",
            RolloverError::TransitionAbort { .. } => "transition_aborted",
            RolloverError::ReportGeneration(_) => "report_generation_failed",
            RolloverError::Backup(_) => "backup_failed",
            RolloverError::Store(_) => "db_query_failed",
        }
    }

    pub fn step(&self) -> Option<RolloverStep> {
        match self {
            RolloverError::TransitionAbort { step, .. } => Some(*step),
            _ => None,
        }
    }
}

//! Shapes the pre-transition copies and statistics into the payload stored on
//! the closed session. The write itself happens in `registry::close`.

use serde::{Deserialize, Serialize};

use super::error::StoreResult;
use super::model::{
    ActivityEntry, ClassGroup, ClassSection, Graduate, ProcessedCounts, RegistrationRequest,
    Student, Teacher,
};
use super::stats::RolloverStatistics;
use super::store::Snapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedSnapshot {
    pub teachers: Vec<Teacher>,
    pub students: Vec<Student>,
    pub graduates: Vec<Graduate>,
    pub classes: Vec<ClassGroup>,
    pub class_sections: Vec<ClassSection>,
    pub registration_requests: Vec<RegistrationRequest>,
    pub activity_log: Vec<ActivityEntry>,
    pub statistics: RolloverStatistics,
    pub processed: ProcessedCounts,
}

/// Takes ownership of the snapshot; it is not needed once the archive exists.
pub fn build_archive(
    snapshot: Snapshot,
    graduates_created: Vec<Graduate>,
    statistics: RolloverStatistics,
    processed: ProcessedCounts,
) -> ArchivedSnapshot {
    ArchivedSnapshot {
        teachers: snapshot.teachers,
        students: snapshot.students,
        graduates: graduates_created,
        classes: snapshot.classes,
        class_sections: snapshot.class_sections,
        registration_requests: snapshot.registration_requests,
        activity_log: snapshot.activity_log,
        statistics,
        processed,
    }
}

pub fn encode(archive: &ArchivedSnapshot) -> StoreResult<String> {
    Ok(serde_json::to_string(archive)?)
}

pub fn decode(value: &serde_json::Value) -> Result<ArchivedSnapshot, serde_json::Error> {
    ArchivedSnapshot::deserialize(value)
}

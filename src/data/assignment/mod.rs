use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Record;
use crate::error::{ServiceError, ServiceResult};

pub mod db;

pub const ASSIGNMENT_COLLECTION_NAME: &str = "assignments";
pub const SUBMISSION_COLLECTION_NAME: &str = "submissions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Assignment {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub due: DateTime<Utc>,
    pub class_id: String,
    pub subject_id: String,
    pub teacher_id: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    /// Submissions are accepted up to and including the due instant.
    pub fn accepts_submission_at(&self, at: DateTime<Utc>) -> ServiceResult<()> {
        if at > self.due {
            return Err(ServiceError::invalid(format!(
                "assignment '{}' was due at {}",
                self.title, self.due
            )));
        }
        Ok(())
    }
}

impl Record for Assignment {
    const COLLECTION: &'static str = ASSIGNMENT_COLLECTION_NAME;
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Submitted,
    Graded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Submission {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub submitted_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub teacher_comment: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[schema(value_type = Option<i64>)]
    pub graded_at: Option<DateTime<Utc>>,
}

impl Record for Submission {
    const COLLECTION: &'static str = SUBMISSION_COLLECTION_NAME;
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AssignmentCreateData {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub due: DateTime<Utc>,
    pub class_id: String,
    pub subject_id: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubmissionGradeData {
    pub score: f64,
    #[serde(default)]
    pub comment: String,
}

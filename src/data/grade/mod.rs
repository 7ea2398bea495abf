use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Record;
use crate::error::{ServiceError, ServiceResult};
use crate::util::round_tenths;

pub mod db;

pub const GRADE_COLLECTION_NAME: &str = "grades";

pub const MIN_GRADE: f64 = 0.0;
pub const MAX_GRADE: f64 = 10.0;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentType {
    Exam,
    Assignment,
    Participation,
    Other,
}

impl From<AssessmentType> for bson::Bson {
    fn from(kind: AssessmentType) -> Self {
        let name = match kind {
            AssessmentType::Exam => "exam",
            AssessmentType::Assignment => "assignment",
            AssessmentType::Participation => "participation",
            AssessmentType::Other => "other",
        };
        bson::Bson::String(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Grade {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub teacher_id: String,
    pub assessment: AssessmentType,
    pub value: f64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub recorded_at: DateTime<Utc>,
}

impl Record for Grade {
    const COLLECTION: &'static str = GRADE_COLLECTION_NAME;
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GradeEntry {
    pub student_id: String,
    pub value: f64,
    #[serde(default)]
    pub note: Option<String>,
}

/// Grades of one assessment for several students of a class.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GradeBatch {
    pub class_id: String,
    pub subject_id: String,
    pub assessment: AssessmentType,
    pub entries: Vec<GradeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewGrade {
    pub student_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub assessment: AssessmentType,
    pub value: f64,
    #[serde(default)]
    pub note: Option<String>,
}

impl From<NewGrade> for GradeBatch {
    fn from(grade: NewGrade) -> Self {
        GradeBatch {
            class_id: grade.class_id,
            subject_id: grade.subject_id,
            assessment: grade.assessment,
            entries: vec![GradeEntry {
                student_id: grade.student_id,
                value: grade.value,
                note: grade.note,
            }],
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GradeUpdateData {
    pub value: f64,
    #[serde(default)]
    pub note: Option<String>,
}

/// Checks that `value` is a valid grade and rounds it to one decimal.
pub fn validate_value(value: f64) -> ServiceResult<f64> {
    if !value.is_finite() || !(MIN_GRADE..=MAX_GRADE).contains(&value) {
        return Err(ServiceError::invalid(format!(
            "Grade {} must be within [{}, {}].",
            value, MIN_GRADE, MAX_GRADE
        )));
    }
    Ok(round_tenths(value))
}

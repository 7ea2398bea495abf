use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Record;

pub mod db;

pub const LESSON_COLLECTION_NAME: &str = "lessons";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Presence {
    pub student_id: String,
    pub present: bool,
}

/// A taught lesson together with its attendance sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Lesson {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub date: DateTime<Utc>,
    pub class_id: String,
    pub subject_id: String,
    pub teacher_id: String,
    pub presence: Vec<Presence>,
    #[serde(default)]
    pub notes: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub recorded_at: DateTime<Utc>,
}

impl Lesson {
    pub fn presence_of(&self, student_id: &str) -> Option<bool> {
        self.presence
            .iter()
            .find(|it| it.student_id == student_id)
            .map(|it| it.present)
    }
}

impl Record for Lesson {
    const COLLECTION: &'static str = LESSON_COLLECTION_NAME;
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewLesson {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub date: DateTime<Utc>,
    pub class_id: String,
    pub subject_id: String,
    pub presence: Vec<Presence>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceEntry {
    pub lesson_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub date: DateTime<Utc>,
    pub subject_id: String,
    pub present: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceSummary {
    pub entries: Vec<AttendanceEntry>,
    pub present: u32,
    pub total: u32,
}

impl AttendanceSummary {
    pub fn from_lessons(student_id: &str, lessons: &[Lesson]) -> AttendanceSummary {
        let entries: Vec<AttendanceEntry> = lessons
            .iter()
            .filter_map(|lesson| {
                lesson.presence_of(student_id).map(|present| AttendanceEntry {
                    lesson_id: lesson.id.clone(),
                    date: lesson.date,
                    subject_id: lesson.subject_id.clone(),
                    present,
                })
            })
            .collect();

        AttendanceSummary {
            present: entries.iter().filter(|it| it.present).count() as u32,
            total: entries.len() as u32,
            entries,
        }
    }
}

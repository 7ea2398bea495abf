use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Record;

pub mod db;

pub const CLASS_COLLECTION_NAME: &str = "classes";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Class {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub academic_year: i32,

    #[serde(default)]
    pub students: Vec<String>,
    #[serde(default)]
    pub teachers: Vec<String>,

    pub created_by: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub created_at: DateTime<Utc>,
}

impl Class {
    pub fn has_student(&self, user_id: &str) -> bool {
        self.students.iter().any(|it| it == user_id)
    }

    pub fn has_teacher(&self, user_id: &str) -> bool {
        self.teachers.iter().any(|it| it == user_id)
    }
}

impl Record for Class {
    const COLLECTION: &'static str = CLASS_COLLECTION_NAME;
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ClassCreateData {
    pub name: String,
    pub academic_year: i32,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ClassUpdateData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub academic_year: Option<i32>,
}

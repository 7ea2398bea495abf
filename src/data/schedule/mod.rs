use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Record;
use crate::error::{ServiceError, ServiceResult};

pub mod db;

pub const SCHEDULE_COLLECTION_NAME: &str = "schedules";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

/// A weekly timetable slot of a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Schedule {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub class_id: String,
    pub subject_id: String,
    pub teacher_id: String,
    pub weekday: Weekday,
    /// `HH:MM`
    #[schema(value_type = String)]
    pub starts: NaiveTime,
    #[schema(value_type = String)]
    pub ends: NaiveTime,
    #[serde(default)]
    pub room: Option<String>,
}

impl Record for Schedule {
    const COLLECTION: &'static str = SCHEDULE_COLLECTION_NAME;
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ScheduleData {
    pub class_id: String,
    pub subject_id: String,
    pub teacher_id: String,
    pub weekday: Weekday,
    #[schema(value_type = String)]
    pub starts: NaiveTime,
    #[schema(value_type = String)]
    pub ends: NaiveTime,
    #[serde(default)]
    pub room: Option<String>,
}

impl ScheduleData {
    pub fn validate(&self) -> ServiceResult<()> {
        if self.starts >= self.ends {
            return Err(ServiceError::invalid(format!(
                "Slot must start before it ends ({} - {}).",
                self.starts, self.ends
            )));
        }
        Ok(())
    }
}

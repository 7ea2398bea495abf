use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::user::User;
use super::Record;

pub mod db;

pub const GUARDIAN_LINK_COLLECTION_NAME: &str = "guardian_links";

/// Authorizes a guardian to follow one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GuardianLink {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub student_id: String,
    pub guardian_id: String,
    /// Free text: mother, father, tutor...
    pub relation: String,
    pub is_primary: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub created_at: DateTime<Utc>,
}

impl Record for GuardianLink {
    const COLLECTION: &'static str = GUARDIAN_LINK_COLLECTION_NAME;
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LinkCreateData {
    pub student_id: String,
    pub guardian_id: String,
    pub relation: String,
}

/// A student as seen through one of their guardian links.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LinkedUser {
    pub link_id: String,
    pub relation: String,
    pub is_primary: bool,
    pub user: User,
}

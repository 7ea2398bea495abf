use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Record;
use crate::role::Role;

pub mod db;

pub const USER_COLLECTION_NAME: &str = "users";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct User {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: Role,
    /// Code redeemed at registration; empty for bootstrap coordinators.
    #[serde(default)]
    pub enrollment_code: Option<String>,
    /// Id of the enrollment code record that was consumed.
    #[serde(default)]
    pub enrollment_code_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub registered_at: DateTime<Utc>,
    #[serde(default = "active_default")]
    pub active: bool,
}

fn active_default() -> bool {
    true
}

impl Record for User {
    const COLLECTION: &'static str = USER_COLLECTION_NAME;
}

/// Editable profile fields; the role is immutable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

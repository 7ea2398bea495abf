use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Record;
use crate::role::Role;

pub mod db;

pub const ENROLLMENT_CODE_COLLECTION_NAME: &str = "enrollment_codes";

/// One-time token gating self-registration for a single role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EnrollmentCode {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub code: String,
    pub role: Role,
    #[serde(default)]
    pub consumed: bool,
    pub issued_by: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub issued_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[schema(value_type = Option<i64>)]
    pub consumed_at: Option<DateTime<Utc>>,
}

impl Record for EnrollmentCode {
    const COLLECTION: &'static str = ENROLLMENT_CODE_COLLECTION_NAME;
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CodeIssueData {
    pub role: Role,
}

/// Proof that a code was consumed for an account creation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Redemption {
    pub matched_code_id: String,
}

/// `PREFIX + YYYY + NNNN`, e.g. `ALUNO20240453`.
pub fn format_code(role: Role, year: i32, serial: u16) -> String {
    format!("{}{:04}{:04}", role.code_prefix(), year, serial % 10_000)
}

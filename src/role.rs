use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Coordinator,
    Guardian,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Student, Role::Teacher, Role::Coordinator, Role::Guardian];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Coordinator => "coordinator",
            Role::Guardian => "guardian",
        }
    }

    /// Prefix of enrollment codes issued for this role.
    pub fn code_prefix(self) -> &'static str {
        match self {
            Role::Student => "ALUNO",
            Role::Teacher => "PROF",
            Role::Coordinator => "COORD",
            Role::Guardian => "RESP",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown role '{}'", s))
    }
}

impl From<Role> for bson::Bson {
    fn from(role: Role) -> Self {
        bson::Bson::String(role.as_str().to_string())
    }
}

impl<'v> rocket::form::FromFormField<'v> for Role {
    fn from_value(field: rocket::form::ValueField<'v>) -> rocket::form::Result<'v, Self> {
        field
            .value
            .parse()
            .map_err(|e: String| rocket::form::Error::validation(e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_round_trip_through_names() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
            assert_eq!(
                bson::to_bson(&role).expect("role must serialize"),
                bson::Bson::from(role)
            );
        }
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn code_prefixes_are_distinct() {
        assert_eq!(Role::Teacher.code_prefix(), "PROF");
        assert_eq!(Role::Student.code_prefix(), "ALUNO");
        let mut prefixes: Vec<_> = Role::ALL.iter().map(|r| r.code_prefix()).collect();
        prefixes.sort();
        prefixes.dedup();
        assert_eq!(prefixes.len(), 4);
    }
}

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use gatehouse_core::{DomainError, FieldError};

/// Role identifier used for RBAC.
///
/// The set is closed: a stored or claimed role is always one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::User, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(DomainError::validation(
                "Validation Error",
                vec![FieldError::new(
                    "role",
                    format!("invalid role '{other}', expected 'user' or 'admin'"),
                )],
            )),
        }
    }
}

use serde::{Deserialize, Serialize};

use gatehouse_core::UserId;

use crate::{AccessClaims, Role};

/// Identity of an authenticated caller, as established from a verified
/// access token.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

impl From<&AccessClaims> for Principal {
    fn from(claims: &AccessClaims) -> Self {
        Self {
            user_id: claims.sub,
            role: claims.role,
        }
    }
}

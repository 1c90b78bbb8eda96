//! Role gate.
//!
//! - No IO
//! - No panics
//! - Pure function of (claimed role, allowed set)

use thiserror::Error;

use gatehouse_core::DomainError;

use crate::{Principal, Role};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthzError {
    /// No authenticated identity on the request.
    #[error("unauthorized")]
    Unauthenticated,

    /// Authenticated, role not in the allowed set.
    #[error("access denied")]
    Forbidden,
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Unauthenticated => DomainError::unauthorized("Unauthorized"),
            // Never names the role that would have been accepted.
            AuthzError::Forbidden => DomainError::forbidden("Access denied"),
        }
    }
}

/// Allow the caller through only if its role is in `allowed`.
pub fn require_role<'a>(
    principal: Option<&'a Principal>,
    allowed: &[Role],
) -> Result<&'a Principal, AuthzError> {
    let principal = principal.ok_or(AuthzError::Unauthenticated)?;
    if allowed.contains(&principal.role) {
        Ok(principal)
    } else {
        Err(AuthzError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::UserId;

    #[test]
    fn missing_identity_is_unauthenticated_not_forbidden() {
        assert_eq!(
            require_role(None, &[Role::Admin]).unwrap_err(),
            AuthzError::Unauthenticated
        );
    }

    #[test]
    fn every_role_outside_the_set_is_forbidden_and_inside_is_allowed() {
        let allowed_sets: [&[Role]; 4] = [&[], &[Role::User], &[Role::Admin], &Role::ALL];
        for allowed in allowed_sets {
            for role in Role::ALL {
                let p = Principal::new(UserId::new(), role);
                let res = require_role(Some(&p), allowed);
                if allowed.contains(&role) {
                    assert_eq!(res.unwrap(), &p);
                } else {
                    assert_eq!(res.unwrap_err(), AuthzError::Forbidden);
                }
            }
        }
    }

    #[test]
    fn forbidden_message_does_not_leak_the_required_role() {
        let err = DomainError::from(AuthzError::Forbidden);
        assert_eq!(err, DomainError::forbidden("Access denied"));
        assert!(!err.to_string().contains("admin"));
    }
}

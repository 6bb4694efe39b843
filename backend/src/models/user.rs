//! Identity handed to this service by the external authentication subsystem.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// An authenticated principal as established upstream of the audit layer.
pub struct AuthenticatedUser {
    /// Numeric account identifier.
    pub id: i64,
    /// Login email, also used as the actor key in audit queries.
    pub email: String,
    /// Human-readable name.
    pub name: String,
    /// Role name, e.g. `ADMIN`, `EMPLOYER`, `APPLICANT`.
    pub role: String,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        let role = self.role.trim();
        role.eq_ignore_ascii_case("admin") || role.eq_ignore_ascii_case("role_admin")
    }
}

/// Ambient principal attached to a request or a background job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// The framework's anonymous sentinel.
    Anonymous,
    User(AuthenticatedUser),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            id: 1,
            email: "admin@example.com".into(),
            name: "Admin".into(),
            role: role.into(),
        }
    }

    #[test]
    fn admin_role_is_case_insensitive() {
        assert!(user("ADMIN").is_admin());
        assert!(user("ROLE_ADMIN").is_admin());
        assert!(user(" admin ").is_admin());
        assert!(!user("APPLICANT").is_admin());
    }
}

//! Actor resolution.
//!
//! Callers hand over an explicit [`ActorContext`] captured from wherever the
//! identity lives (request extensions, a job runner, an auth callback) and get
//! back an [`Actor`]. Resolution never fails: anything unusable collapses to
//! the anonymous sentinel.

use axum::http::Extensions;

use crate::models::{
    audit_log::Actor,
    user::{AuthenticatedUser, Principal},
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActorContext {
    /// No authentication context at all.
    #[default]
    Missing,
    /// A background or process-initiated action.
    System,
    Principal(Principal),
}

impl ActorContext {
    pub fn user(user: AuthenticatedUser) -> Self {
        ActorContext::Principal(Principal::User(user))
    }

    /// Reads the identity the identity middleware left in `extensions`.
    pub fn from_extensions(extensions: &Extensions) -> Self {
        match extensions.get::<AuthenticatedUser>() {
            Some(user) => ActorContext::user(user.clone()),
            None => ActorContext::Missing,
        }
    }

    pub fn resolve(&self) -> Actor {
        resolve_actor(self)
    }
}

pub fn resolve_actor(context: &ActorContext) -> Actor {
    match context {
        ActorContext::Missing | ActorContext::Principal(Principal::Anonymous) => {
            Actor::anonymous()
        }
        ActorContext::System => Actor::system(),
        ActorContext::Principal(Principal::User(user)) => match validated(user) {
            Some(actor) => actor,
            None => {
                tracing::warn!(
                    user_id = user.id,
                    "Authenticated principal is incomplete, recording as anonymous"
                );
                Actor::anonymous()
            }
        },
    }
}

fn validated(user: &AuthenticatedUser) -> Option<Actor> {
    let email = user.email.trim();
    let role = user.role.trim();
    if user.id <= 0 || email.is_empty() || role.is_empty() {
        return None;
    }
    let name = match user.name.trim() {
        "" => email,
        name => name,
    };
    Some(Actor::user(user.id, email, name, role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audit_log::ActorKind;

    fn user(id: i64, email: &str, role: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            id,
            email: email.into(),
            name: "Jo".into(),
            role: role.into(),
        }
    }

    #[test]
    fn missing_context_and_anonymous_sentinel_resolve_to_anonymous() {
        assert_eq!(ActorContext::Missing.resolve(), Actor::anonymous());
        assert_eq!(
            ActorContext::Principal(Principal::Anonymous).resolve(),
            Actor::anonymous()
        );
    }

    #[test]
    fn system_context_resolves_to_system_sentinel() {
        assert_eq!(ActorContext::System.resolve().kind(), ActorKind::System);
    }

    #[test]
    fn authenticated_user_keeps_identity_fields() {
        let actor = ActorContext::user(user(42, "jo@example.com", "EMPLOYER")).resolve();
        assert_eq!(actor.kind(), ActorKind::User);
        assert_eq!(actor.user_id(), Some(42));
        assert_eq!(actor.email(), Some("jo@example.com"));
        assert_eq!(actor.role(), Some("EMPLOYER"));
        assert_eq!(actor.label(), "Jo (ID: 42)");
    }

    #[test]
    fn incomplete_principal_collapses_to_anonymous() {
        assert_eq!(
            ActorContext::user(user(0, "jo@example.com", "ADMIN")).resolve(),
            Actor::anonymous()
        );
        assert_eq!(
            ActorContext::user(user(3, "  ", "ADMIN")).resolve(),
            Actor::anonymous()
        );
        assert_eq!(
            ActorContext::user(user(3, "jo@example.com", "")).resolve(),
            Actor::anonymous()
        );
    }

    #[test]
    fn from_extensions_reads_the_authenticated_user() {
        let mut extensions = Extensions::new();
        assert_eq!(ActorContext::from_extensions(&extensions), ActorContext::Missing);

        extensions.insert(user(5, "a@b.io", "ADMIN"));
        assert_eq!(
            ActorContext::from_extensions(&extensions).resolve().user_id(),
            Some(5)
        );
    }
}

//! Bridges the external authentication subsystem into request extensions.
//!
//! Whatever the configured [`IdentityProvider`] yields is inserted as an
//! [`AuthenticatedUser`] into the request extensions and, after the handler
//! runs, into the response extensions as well so outer layers can see who
//! made the call.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::{models::user::AuthenticatedUser, state::AppState};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The caller's identity, or `None` for anonymous traffic.
    async fn authenticate(&self, headers: &HeaderMap) -> Option<AuthenticatedUser>;
}

/// Treats every request as anonymous.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIdentity;

#[async_trait]
impl IdentityProvider for NoIdentity {
    async fn authenticate(&self, _headers: &HeaderMap) -> Option<AuthenticatedUser> {
        None
    }
}

/// Trusts identity headers set by an authenticating gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayHeaderIdentity;

#[async_trait]
impl IdentityProvider for GatewayHeaderIdentity {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<AuthenticatedUser> {
        identity_from_headers(headers)
    }
}

pub fn identity_from_headers(headers: &HeaderMap) -> Option<AuthenticatedUser> {
    let id = header_value(headers, USER_ID_HEADER)?.parse::<i64>().ok()?;
    let email = header_value(headers, USER_EMAIL_HEADER)?;
    let role = header_value(headers, USER_ROLE_HEADER)?;
    let name = header_value(headers, USER_NAME_HEADER).unwrap_or_else(|| email.clone());
    Some(AuthenticatedUser {
        id,
        email,
        name,
        role,
    })
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub async fn identity(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let user = state.identity.authenticate(request.headers()).await;
    if let Some(user) = user.clone() {
        request.extensions_mut().insert(user);
    }

    let mut response = next.run(request).await;
    if let Some(user) = user {
        response.extensions_mut().insert(user);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn complete_gateway_headers_yield_a_user() {
        let user = identity_from_headers(&headers(&[
            (USER_ID_HEADER, "12"),
            (USER_EMAIL_HEADER, "root@corp.io"),
            (USER_ROLE_HEADER, "ADMIN"),
        ]))
        .expect("user");
        assert_eq!(user.id, 12);
        assert_eq!(user.name, "root@corp.io");
        assert!(user.is_admin());
    }

    #[test]
    fn partial_or_malformed_headers_yield_nothing() {
        assert!(identity_from_headers(&headers(&[(USER_ID_HEADER, "12")])).is_none());
        assert!(identity_from_headers(&headers(&[
            (USER_ID_HEADER, "twelve"),
            (USER_EMAIL_HEADER, "root@corp.io"),
            (USER_ROLE_HEADER, "ADMIN"),
        ]))
        .is_none());
    }

    #[tokio::test]
    async fn no_identity_is_always_anonymous() {
        let found = NoIdentity
            .authenticate(&headers(&[
                (USER_ID_HEADER, "1"),
                (USER_EMAIL_HEADER, "a@b.io"),
                (USER_ROLE_HEADER, "ADMIN"),
            ]))
            .await;
        assert!(found.is_none());
    }
}

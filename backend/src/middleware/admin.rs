use axum::{extract::Request, middleware::Next, response::Response};

use crate::{error::AppError, models::user::AuthenticatedUser};

/// Admin-only guard for the audit query surface.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let Some(user) = request.extensions().get::<AuthenticatedUser>() else {
        return Err(AppError::Unauthorized("Authentication required".into()));
    };
    if !user.is_admin() {
        return Err(AppError::Forbidden("Admin role required".into()));
    }
    Ok(next.run(request).await)
}

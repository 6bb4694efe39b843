use axum::{
    extract::{FromRequestParts, Path, Query, State},
    middleware,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::AppError,
    middleware::admin::require_admin,
    models::{
        audit_log::{ActorKind, AuditCategory, AuditLog, AuditOperation, Severity},
        Page, PaginationQuery,
    },
    services::{audit_query::LogFilters, audit_stats::AuditStats},
    state::AppState,
};

/// Mount point of the audit query surface.
pub const AUDIT_API_PREFIX: &str = "/api/admin/audit";

/// [`Query`] that rejects malformed parameters with the JSON error body.
#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditLogResponse {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub entity_name: String,
    pub entity_id: String,
    pub operation: AuditOperation,
    pub event_type: String,
    pub category: AuditCategory,
    pub severity: Option<Severity>,
    pub actor_type: ActorKind,
    pub user_id: Option<i64>,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub user_role: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_fields: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl From<AuditLog> for AuditLogResponse {
    fn from(log: AuditLog) -> Self {
        let entry = log.entry;
        let request = entry.request.unwrap_or_default();
        Self {
            id: log.id,
            timestamp: entry.occurred_at,
            actor_type: entry.actor.kind(),
            user_id: entry.actor.user_id(),
            user_email: entry.actor.email().map(str::to_string),
            user_name: entry.actor.display_name().map(str::to_string),
            user_role: entry.actor.role().map(str::to_string),
            entity_name: entry.entity_name,
            entity_id: entry.entity_id,
            operation: entry.operation,
            event_type: entry.event_type,
            category: entry.category,
            severity: entry.severity,
            old_value: entry.old_value,
            new_value: entry.new_value,
            changed_fields: entry.changed_fields,
            ip_address: request.ip,
            user_agent: request.user_agent,
            session_id: request.session_id,
            request_id: request.request_id,
            success: entry.success,
            error_message: entry.error_message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditLogPageResponse {
    pub items: Vec<AuditLogResponse>,
    pub total_elements: i64,
    pub total_pages: i64,
    pub page: i64,
    pub size: i64,
}

impl From<Page<AuditLog>> for AuditLogPageResponse {
    fn from(page: Page<AuditLog>) -> Self {
        let page = page.map(AuditLogResponse::from);
        Self {
            items: page.items,
            total_elements: page.total_elements,
            total_pages: page.total_pages,
            page: page.page,
            size: page.size,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AuditLogSearchQuery {
    #[validate(range(min = 0, max = 100_000))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub size: Option<i64>,
    pub entity_name: Option<String>,
    pub operation: Option<String>,
    pub user_email: Option<String>,
    pub success: Option<bool>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl AuditLogSearchQuery {
    fn pagination(&self) -> PaginationQuery {
        PaginationQuery {
            page: self.page,
            size: self.size,
        }
    }

    fn filters(self) -> LogFilters {
        LogFilters {
            user_email: self.user_email,
            entity_name: self.entity_name,
            operation: self.operation,
            success: self.success,
            date_from: self.date_from,
            date_to: self.date_to,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DateRangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct StatsQuery {
    /// Trailing window in hours (default: configured, 24).
    #[validate(range(min = 1, max = 8760))]
    pub hours: Option<i64>,
}

pub fn audit_routes() -> Router<AppState> {
    Router::new()
        .route("/entity/{entity_name}", get(logs_by_entity))
        .route("/entity/{entity_name}/{entity_id}", get(logs_by_entity_instance))
        .route("/user/{user_email}", get(logs_by_user))
        .route("/operation/{operation}", get(logs_by_operation))
        .route("/daterange", get(logs_by_date_range))
        .route("/logs", get(search_logs))
        .route("/stats", get(audit_stats))
        .route("/statistics", get(audit_stats))
        .route_layer(middleware::from_fn(require_admin))
}

pub async fn logs_by_entity(
    State(state): State<AppState>,
    Path(entity_name): Path<String>,
    ApiQuery(q): ApiQuery<PaginationQuery>,
) -> Result<Json<AuditLogPageResponse>, AppError> {
    q.validate()?;
    let page = q.to_page_request(state.config.audit_default_page_size);
    let logs = state.queries.by_entity(&entity_name, page).await?;
    Ok(Json(logs.into()))
}

pub async fn logs_by_entity_instance(
    State(state): State<AppState>,
    Path((entity_name, entity_id)): Path<(String, String)>,
) -> Result<Json<Vec<AuditLogResponse>>, AppError> {
    let logs = state
        .queries
        .by_entity_instance(&entity_name, &entity_id)
        .await?;
    Ok(Json(logs.into_iter().map(AuditLogResponse::from).collect()))
}

pub async fn logs_by_user(
    State(state): State<AppState>,
    Path(user_email): Path<String>,
    ApiQuery(q): ApiQuery<PaginationQuery>,
) -> Result<Json<AuditLogPageResponse>, AppError> {
    q.validate()?;
    let page = q.to_page_request(state.config.audit_default_page_size);
    let logs = state.queries.by_user(&user_email, page).await?;
    Ok(Json(logs.into()))
}

pub async fn logs_by_operation(
    State(state): State<AppState>,
    Path(operation): Path<String>,
) -> Result<Json<Vec<AuditLogResponse>>, AppError> {
    let logs = state.queries.by_operation(&operation).await?;
    Ok(Json(logs.into_iter().map(AuditLogResponse::from).collect()))
}

pub async fn logs_by_date_range(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<DateRangeQuery>,
) -> Result<Json<Vec<AuditLogResponse>>, AppError> {
    let logs = state
        .queries
        .by_date_range(
            q.start_date.as_deref().unwrap_or_default(),
            q.end_date.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(logs.into_iter().map(AuditLogResponse::from).collect()))
}

pub async fn search_logs(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<AuditLogSearchQuery>,
) -> Result<Json<AuditLogPageResponse>, AppError> {
    q.validate()?;
    let page = q
        .pagination()
        .to_page_request(state.config.audit_default_page_size);
    let logs = state.queries.search(&q.filters(), page).await?;
    Ok(Json(logs.into()))
}

pub async fn audit_stats(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<StatsQuery>,
) -> Result<Json<AuditStats>, AppError> {
    q.validate()?;
    let hours = q.hours.unwrap_or(state.config.audit_stats_window_hours);
    let window = Duration::try_hours(hours)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid stats window: {hours} hours")))?;
    let stats = state.stats.stats_since(window).await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::audit_log::{Actor, RequestContext},
        services::event_builder::{AuditEvent, EventBuilder},
    };

    #[test]
    fn response_flattens_actor_and_request_context() {
        let entry = EventBuilder::default()
            .event(
                AuditEvent::data_change(AuditOperation::Delete, "Job", "3"),
                Actor::user(4, "ann@jobs.io", "Ann", "EMPLOYER"),
            )
            .request(Some(RequestContext {
                ip: Some("10.1.1.1".into()),
                request_id: Some("r-1".into()),
                ..RequestContext::default()
            }))
            .failed("not found")
            .build();

        let response = AuditLogResponse::from(AuditLog { id: 8, entry });
        assert_eq!(response.id, 8);
        assert_eq!(response.actor_type, ActorKind::User);
        assert_eq!(response.user_email.as_deref(), Some("ann@jobs.io"));
        assert_eq!(response.user_name.as_deref(), Some("Ann"));
        assert_eq!(response.ip_address.as_deref(), Some("10.1.1.1"));
        assert_eq!(response.request_id.as_deref(), Some("r-1"));
        assert!(!response.success);
        assert_eq!(response.error_message.as_deref(), Some("not found"));
    }

    #[test]
    fn search_query_rejects_out_of_range_page_size() {
        let query = AuditLogSearchQuery {
            size: Some(0),
            ..AuditLogSearchQuery::default()
        };
        assert!(query.validate().is_err());

        let stats = StatsQuery { hours: Some(9000) };
        assert!(stats.validate().is_err());
    }
}

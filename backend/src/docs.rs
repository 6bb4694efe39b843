#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::{
    error::ErrorResponse,
    handlers::audit_logs::{
        AuditLogPageResponse, AuditLogResponse, AuditLogSearchQuery, DateRangeQuery, StatsQuery,
    },
    models::{
        audit_log::{ActorKind, AuditCategory, AuditOperation, Severity},
        PaginationQuery,
    },
    services::audit_stats::AuditStats,
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        logs_by_entity_doc,
        logs_by_entity_instance_doc,
        logs_by_user_doc,
        logs_by_operation_doc,
        logs_by_date_range_doc,
        search_logs_doc,
        stats_doc,
        statistics_doc
    ),
    components(
        schemas(
            AuditLogResponse,
            AuditLogPageResponse,
            AuditStats,
            AuditOperation,
            AuditCategory,
            Severity,
            ActorKind,
            ErrorResponse
        )
    ),
    modifiers(&SecuritySchemes),
    tags(
        (name = "Audit", description = "Audit trail queries (admin only)")
    ),
    security(("GatewayIdentity" = []))
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();
        components.add_security_scheme(
            "GatewayIdentity",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-user-email"))),
        );
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/audit/entity/{entityName}",
    params(
        ("entityName" = String, Path, description = "Entity type, e.g. `Job`"),
        PaginationQuery
    ),
    responses(
        (status = 200, description = "Records for the entity type, newest first", body = AuditLogPageResponse),
        (status = 401, body = ErrorResponse),
        (status = 403, body = ErrorResponse)
    ),
    tag = "Audit"
)]
fn logs_by_entity_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/audit/entity/{entityName}/{entityId}",
    params(
        ("entityName" = String, Path, description = "Entity type"),
        ("entityId" = String, Path, description = "Entity identifier")
    ),
    responses((status = 200, description = "Full history of one entity", body = [AuditLogResponse])),
    tag = "Audit"
)]
fn logs_by_entity_instance_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/audit/user/{userEmail}",
    params(
        ("userEmail" = String, Path, description = "Actor email"),
        PaginationQuery
    ),
    responses((status = 200, body = AuditLogPageResponse)),
    tag = "Audit"
)]
fn logs_by_user_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/audit/operation/{operation}",
    params(("operation" = String, Path, description = "Operation name, e.g. `APPLY_JOB`")),
    responses(
        (status = 200, body = [AuditLogResponse]),
        (status = 400, description = "Unknown operation; lists valid names", body = ErrorResponse)
    ),
    tag = "Audit"
)]
fn logs_by_operation_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/audit/daterange",
    params(DateRangeQuery),
    responses(
        (status = 200, body = [AuditLogResponse]),
        (status = 400, description = "Missing, malformed or reversed dates", body = ErrorResponse)
    ),
    tag = "Audit"
)]
fn logs_by_date_range_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/audit/logs",
    params(AuditLogSearchQuery),
    responses(
        (status = 200, description = "Conjunction of the supplied filters", body = AuditLogPageResponse),
        (status = 400, body = ErrorResponse)
    ),
    tag = "Audit"
)]
fn search_logs_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/audit/stats",
    params(StatsQuery),
    responses((status = 200, body = AuditStats)),
    tag = "Audit"
)]
fn stats_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/audit/statistics",
    params(StatsQuery),
    responses((status = 200, body = AuditStats)),
    tag = "Audit"
)]
fn statistics_doc() {}

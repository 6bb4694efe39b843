#![allow(dead_code)]
use async_trait::async_trait;
use audittrail_backend::{
    build_router,
    config::Config,
    error::StoreError,
    middleware::identity::{
        GatewayHeaderIdentity, USER_EMAIL_HEADER, USER_ID_HEADER, USER_NAME_HEADER,
        USER_ROLE_HEADER,
    },
    models::{
        audit_log::{Actor, AuditLog, AuditLogEntry, AuditOperation},
        user::AuthenticatedUser,
        PageRequest,
    },
    repositories::{AuditLogStore, AuditQuery, InMemoryAuditLogStore},
    services::event_builder::{AuditEvent, EventBuilder},
    state::AppState,
};
use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;

pub fn test_config() -> Config {
    Config {
        audit_enabled: true,
        ..Config::default()
    }
}

pub fn test_state(store: Arc<dyn AuditLogStore>) -> AppState {
    AppState::new(store, Arc::new(GatewayHeaderIdentity), test_config())
}

pub fn test_app(store: Arc<dyn AuditLogStore>) -> Router {
    build_router(test_state(store))
}

pub fn admin() -> AuthenticatedUser {
    user(1, "root@jobs.io", "ADMIN")
}

pub fn employer() -> AuthenticatedUser {
    user(7, "boss@corp.io", "EMPLOYER")
}

pub fn applicant() -> AuthenticatedUser {
    user(21, "ann@jobs.io", "APPLICANT")
}

fn user(id: i64, email: &str, role: &str) -> AuthenticatedUser {
    AuthenticatedUser {
        id,
        email: email.to_string(),
        name: email.split('@').next().unwrap_or(email).to_string(),
        role: role.to_string(),
    }
}

/// Request builder carrying the gateway identity headers of `user`.
pub fn request_as(method: &str, uri: &str, user: Option<&AuthenticatedUser>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder
            .header(USER_ID_HEADER, user.id.to_string())
            .header(USER_EMAIL_HEADER, &user.email)
            .header(USER_NAME_HEADER, &user.name)
            .header(USER_ROLE_HEADER, &user.role);
    }
    builder.body(Body::empty()).expect("build request")
}

pub fn get_as(uri: &str, user: Option<&AuthenticatedUser>) -> Request<Body> {
    request_as("GET", uri, user)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// One data-change record captured at `occurred_at`.
pub fn entry(
    occurred_at: DateTime<Utc>,
    operation: AuditOperation,
    entity_name: &str,
    entity_id: &str,
    actor: Actor,
    success: bool,
) -> AuditLogEntry {
    let builder = EventBuilder::default().with_clock(Arc::new(move || occurred_at));
    let pending = builder.event(
        AuditEvent::data_change(operation, entity_name, entity_id),
        actor,
    );
    if success {
        pending.build()
    } else {
        pending.failed("rejected").build()
    }
}

pub fn actor_of(user: &AuthenticatedUser) -> Actor {
    Actor::user(user.id, &user.email, &user.name, &user.role)
}

pub async fn seeded_store(entries: Vec<AuditLogEntry>) -> Arc<InMemoryAuditLogStore> {
    let store = Arc::new(InMemoryAuditLogStore::new());
    for entry in entries {
        store.append(entry).await.expect("seed audit log");
    }
    store
}

pub async fn all_logs(store: &InMemoryAuditLogStore) -> Vec<AuditLog> {
    store.find(&AuditQuery::new()).await.expect("read audit logs")
}

/// A store that is down: every call fails.
pub struct FailingStore;

#[async_trait]
impl AuditLogStore for FailingStore {
    async fn append(&self, _entry: AuditLogEntry) -> Result<AuditLog, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn find(&self, _query: &AuditQuery) -> Result<Vec<AuditLog>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn find_page(
        &self,
        _query: &AuditQuery,
        _page: PageRequest,
    ) -> Result<(Vec<AuditLog>, i64), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn count(&self, _query: &AuditQuery) -> Result<i64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn distinct_entity_names(&self) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

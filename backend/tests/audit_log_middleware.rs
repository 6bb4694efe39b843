use audittrail_backend::{
    config::Config,
    models::audit_log::{ActorKind, AuditCategory, AuditOperation, Severity},
    repositories::{AuditLogStore, InMemoryAuditLogStore},
    middleware::audit_log::request_context,
    services::{
        actor::ActorContext,
        auth_events::AuthEvent,
        capture::{CallContext, MutationPoint},
        redaction::AuditArg,
    },
    state::AppState,
    with_audit_layers,
};
use axum::{
    extract::{Request, State},
    http::{Extensions, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

mod support;

use support::{all_logs, body_json, employer, get_as, request_as, test_state, FailingStore};

#[derive(serde::Serialize)]
struct JobForm {
    title: &'static str,
}

async fn create_job(State(state): State<AppState>, extensions: Extensions) -> impl IntoResponse {
    let context = CallContext::new(ActorContext::from_extensions(&extensions)).with_entity_id("42");
    let created: Result<i64, String> = state
        .capture
        .capture(
            MutationPoint::CreateJob,
            context,
            vec![AuditArg::of(&JobForm { title: "Rust developer" })],
            async { Ok(42) },
        )
        .await;
    match created {
        Ok(id) => (StatusCode::CREATED, Json(json!({ "id": id }))).into_response(),
        Err(message) => (StatusCode::BAD_REQUEST, message).into_response(),
    }
}

async fn reject_login(State(state): State<AppState>, request: Request) -> StatusCode {
    state.auth_events.publish(AuthEvent::BadCredentials {
        username: "mallory@jobs.io".to_string(),
        request: Some(request_context(&request)),
    });
    StatusCode::UNAUTHORIZED
}

async fn panicking_handler() -> &'static str {
    panic!("handler bug")
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/jobs", post(create_job))
        .route("/api/jobs/{id}", get(|| async { Json(json!({ "id": 7, "title": "Tester" })) }))
        .route("/api/secret", get(|| async { StatusCode::FORBIDDEN }))
        .route("/api/private", get(|| async { StatusCode::UNAUTHORIZED }))
        .route("/api/broken", get(|| async { StatusCode::BAD_GATEWAY }))
        .route("/api/panic", get(panicking_handler))
        .route("/api/auth/login", post(reject_login))
}

fn app_with(store: Arc<dyn AuditLogStore>, config: Config) -> Router {
    let mut state = test_state(store.clone());
    state.config = config;
    with_audit_layers(routes(), state)
}

fn app(store: Arc<dyn AuditLogStore>) -> Router {
    app_with(store, support::test_config())
}

#[tokio::test]
async fn successful_request_is_recorded_with_actor_and_context() {
    let store = Arc::new(InMemoryAuditLogStore::new());
    let mut request = request_as("POST", "/api/jobs?draft=true", Some(&employer()));
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
    request
        .headers_mut()
        .insert("user-agent", "integration-test".parse().unwrap());

    let response = app(store.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap()
        .to_string();

    let logs = all_logs(&store).await;
    assert_eq!(logs.len(), 2);

    let http = logs
        .iter()
        .find(|log| log.entry.event_type == "HTTP_REQUEST")
        .expect("http event");
    assert_eq!(http.entry.category, AuditCategory::Http);
    assert_eq!(http.entry.operation, AuditOperation::Create);
    assert_eq!(http.entry.entity_name, "JobsController");
    assert_eq!(http.entry.entity_id, "/api/jobs");
    assert!(http.entry.success);
    assert_eq!(http.entry.actor.kind(), ActorKind::User);
    assert_eq!(http.entry.actor.email(), Some("boss@corp.io"));
    let request_ctx = http.entry.request.as_ref().expect("request context");
    assert_eq!(request_ctx.ip.as_deref(), Some("203.0.113.9"));
    assert_eq!(request_ctx.user_agent.as_deref(), Some("integration-test"));
    assert_eq!(request_ctx.request_id.as_deref(), Some(request_id.as_str()));
    let snapshot: serde_json::Value =
        serde_json::from_str(http.entry.new_value.as_deref().unwrap()).unwrap();
    assert_eq!(snapshot["status"], 201);
    assert_eq!(snapshot["query"], "draft=true");
    assert_eq!(snapshot["method"], "POST");

    let created = logs
        .iter()
        .find(|log| log.entry.event_type == "JOB_CREATED")
        .expect("mutation event");
    assert_eq!(created.entry.entity_name, "Job");
    assert_eq!(created.entry.entity_id, "42");
    assert_eq!(created.entry.category, AuditCategory::Business);
    assert_eq!(created.entry.actor.user_id(), Some(7));
}

#[tokio::test]
async fn anonymous_read_is_recorded_as_anonymous() {
    let store = Arc::new(InMemoryAuditLogStore::new());
    let response = app(store.clone())
        .oneshot(get_as("/api/jobs/7", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let logs = all_logs(&store).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].entry.operation, AuditOperation::Read);
    assert_eq!(logs[0].entry.actor.kind(), ActorKind::Anonymous);
    assert!(logs[0].entry.actor.email().is_none());
}

#[tokio::test]
async fn error_statuses_add_security_events() {
    let cases = [
        ("/api/private", "UNAUTHORIZED_ACCESS_ATTEMPT", Severity::Medium, "HTTP 401"),
        ("/api/secret", "FORBIDDEN_ACCESS_ATTEMPT", Severity::High, "HTTP 403"),
        ("/api/broken", "SERVER_ERROR", Severity::High, "HTTP 502"),
    ];
    for (uri, event_type, severity, http_error) in cases {
        let store = Arc::new(InMemoryAuditLogStore::new());
        app(store.clone())
            .oneshot(get_as(uri, Some(&employer())))
            .await
            .unwrap();

        let logs = all_logs(&store).await;
        assert_eq!(logs.len(), 2, "{uri}");
        let http = logs
            .iter()
            .find(|log| log.entry.event_type == "HTTP_REQUEST")
            .unwrap();
        assert!(!http.entry.success);
        assert_eq!(http.entry.error_message.as_deref(), Some(http_error));

        let security = logs
            .iter()
            .find(|log| log.entry.event_type == event_type)
            .unwrap_or_else(|| panic!("{event_type} missing for {uri}"));
        assert_eq!(security.entry.category, AuditCategory::Security);
        assert_eq!(security.entry.severity, Some(severity));
        assert_eq!(security.entry.entity_id, uri);
    }
}

#[tokio::test]
async fn not_found_is_a_failed_request_without_security_event() {
    let store = Arc::new(InMemoryAuditLogStore::new());
    let response = app(store.clone())
        .oneshot(get_as("/api/missing", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let logs = all_logs(&store).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].entry.error_message.as_deref(), Some("HTTP 404"));
}

#[tokio::test]
async fn handler_panic_is_recorded_and_resumed() {
    let store = Arc::new(InMemoryAuditLogStore::new());
    let app = app(store.clone());

    let outcome = tokio::spawn(app.oneshot(get_as("/api/panic", Some(&employer())))).await;
    let err = outcome.expect_err("panic reaches the caller");
    assert!(err.is_panic());

    let logs = all_logs(&store).await;
    let panic_event = logs
        .iter()
        .find(|log| log.entry.event_type == "REQUEST_PROCESSING_ERROR")
        .expect("panic event");
    assert_eq!(panic_event.entry.severity, Some(Severity::High));
    assert!(!panic_event.entry.success);
    assert!(logs
        .iter()
        .any(|log| log.entry.event_type == "HTTP_REQUEST" && !log.entry.success));
}

#[tokio::test]
async fn store_outage_does_not_change_the_response() {
    let response = app(Arc::new(FailingStore))
        .oneshot(get_as("/api/jobs/7", Some(&employer())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["title"], "Tester");

    let response = app(Arc::new(FailingStore))
        .oneshot(request_as("POST", "/api/jobs", Some(&employer())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["id"], 42);
}

#[tokio::test]
async fn skipped_paths_and_disabled_capture_record_nothing() {
    let store = Arc::new(InMemoryAuditLogStore::new());
    let response = app(store.clone())
        .oneshot(get_as("/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.is_empty().await);

    let disabled = Config {
        audit_enabled: false,
        ..support::test_config()
    };
    let response = app_with(store.clone(), disabled)
        .oneshot(get_as("/api/jobs/7", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn auth_events_published_through_state_are_recorded() {
    let store = Arc::new(InMemoryAuditLogStore::new());
    let mut request = request_as("POST", "/api/auth/login", None);
    request
        .headers_mut()
        .insert("x-real-ip", "198.51.100.7".parse().unwrap());
    let response = app(store.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The listener records off the request path; give it a moment.
    let mut logs = Vec::new();
    for _ in 0..100 {
        logs = all_logs(&store).await;
        if logs
            .iter()
            .any(|log| log.entry.event_type == "SUSPICIOUS_LOGIN_ATTEMPT")
        {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let failure = logs
        .iter()
        .find(|log| log.entry.event_type == "AUTHENTICATION_FAILURE")
        .expect("authentication failure event");
    assert_eq!(failure.entry.category, AuditCategory::Authentication);
    assert_eq!(failure.entry.entity_id, "mallory@jobs.io");
    assert_eq!(failure.entry.actor.kind(), ActorKind::Anonymous);
    assert_eq!(
        failure.entry.request.as_ref().and_then(|r| r.ip.as_deref()),
        Some("198.51.100.7")
    );
    let suspicious = logs
        .iter()
        .find(|log| log.entry.event_type == "SUSPICIOUS_LOGIN_ATTEMPT")
        .expect("suspicious login event");
    assert_eq!(suspicious.entry.severity, Some(Severity::Medium));
}

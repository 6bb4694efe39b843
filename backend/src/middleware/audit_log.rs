//! Request-boundary capture.
//!
//! Every request outside the configured skip list produces one `HTTP_REQUEST`
//! record, plus a security record for 401, 403 and 5xx responses. A panicking
//! handler is recorded as `REQUEST_PROCESSING_ERROR` and the panic is resumed
//! so the framework sees it unchanged.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{
        header::{COOKIE, USER_AGENT},
        HeaderMap, Method, StatusCode,
    },
    middleware::Next,
    response::Response,
};
use futures_util::FutureExt;
use serde_json::json;
use std::{net::SocketAddr, panic::AssertUnwindSafe, time::Instant};

use crate::{
    middleware::request_id::{incoming_request_id, RequestId},
    models::audit_log::{AuditCategory, AuditLogEntry, AuditOperation, RequestContext, Severity},
    services::{
        actor::ActorContext, audit_log::AuditLogService, capture::run_isolated,
        event_builder::AuditEvent,
    },
    state::AppState,
};

const SESSION_ID_HEADER: &str = "x-session-id";
const SESSION_COOKIES: [&str; 2] = ["SESSION", "session_id"];
const NON_RESOURCE_SEGMENTS: [&str; 2] = ["api", "admin"];

struct Exchange {
    method: Method,
    path: String,
    query: Option<String>,
    context: RequestContext,
    duration_ms: u64,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Status(StatusCode),
    Panicked,
}

pub async fn audit_log(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if !state.config.audit_enabled || state.config.is_audit_skipped(&path) {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let query = request.uri().query().map(str::to_string);
    let context = request_context(&request);
    let actor_before = ActorContext::from_extensions(request.extensions());
    let started = Instant::now();

    let outcome = AssertUnwindSafe(next.run(request)).catch_unwind().await;
    let exchange = Exchange {
        method,
        path,
        query,
        context,
        duration_ms: started.elapsed().as_millis() as u64,
    };

    match outcome {
        Ok(response) => {
            // Authentication may have happened further down the stack.
            let actor = match ActorContext::from_extensions(response.extensions()) {
                ActorContext::Missing => actor_before,
                resolved => resolved,
            };
            let status = Outcome::Status(response.status());
            record_exchange(&state.audit, exchange, actor, status).await;
            response
        }
        Err(panic) => {
            record_exchange(&state.audit, exchange, actor_before, Outcome::Panicked).await;
            std::panic::resume_unwind(panic)
        }
    }
}

async fn record_exchange(
    service: &AuditLogService,
    exchange: Exchange,
    actor: ActorContext,
    outcome: Outcome,
) {
    let label = format!("HTTP_REQUEST {} {}", exchange.method, exchange.path);
    let service = service.clone();
    run_isolated(&label, async move {
        let entries = exchange_entries(&service, exchange, actor, outcome);
        service.record_all(entries).await
    })
    .await;
}

fn exchange_entries(
    service: &AuditLogService,
    exchange: Exchange,
    actor: ActorContext,
    outcome: Outcome,
) -> Vec<AuditLogEntry> {
    let actor = actor.resolve();
    let status = match outcome {
        Outcome::Status(status) => Some(status.as_u16()),
        Outcome::Panicked => None,
    };
    let snapshot = json!({
        "method": exchange.method.as_str(),
        "path": exchange.path,
        "query": exchange.query,
        "status": status,
        "duration_ms": exchange.duration_ms,
    });
    let event = AuditEvent::data_change(
        operation_for(&exchange.method),
        controller_name(&exchange.path),
        exchange.path.clone(),
    );
    let builder = service.builder();

    let mut http = builder
        .event(
            event.clone().with_type("HTTP_REQUEST", AuditCategory::Http),
            actor.clone(),
        )
        .request(Some(exchange.context.clone()))
        .new_value(&snapshot);
    match outcome {
        Outcome::Status(status) if status.is_client_error() || status.is_server_error() => {
            http = http.failed(format!("HTTP {}", status.as_u16()));
        }
        Outcome::Panicked => {
            http = http.failed("Request processing failed");
        }
        Outcome::Status(_) => {}
    }

    let mut entries = vec![http.build()];
    if let Some((event_type, severity, message)) = security_event(outcome) {
        entries.push(
            builder
                .event(event.security(event_type, severity), actor)
                .request(Some(exchange.context))
                .new_value(&snapshot)
                .failed(message)
                .build(),
        );
    }
    entries
}

fn security_event(outcome: Outcome) -> Option<(&'static str, Severity, String)> {
    match outcome {
        Outcome::Status(StatusCode::UNAUTHORIZED) => Some((
            "UNAUTHORIZED_ACCESS_ATTEMPT",
            Severity::Medium,
            "Unauthorized access attempt".to_string(),
        )),
        Outcome::Status(StatusCode::FORBIDDEN) => Some((
            "FORBIDDEN_ACCESS_ATTEMPT",
            Severity::High,
            "Forbidden access attempt".to_string(),
        )),
        Outcome::Status(status) if status.is_server_error() => Some((
            "SERVER_ERROR",
            Severity::High,
            format!("Server error: HTTP {}", status.as_u16()),
        )),
        Outcome::Panicked => Some((
            "REQUEST_PROCESSING_ERROR",
            Severity::High,
            "Handler panicked while processing the request".to_string(),
        )),
        Outcome::Status(_) => None,
    }
}

pub fn operation_for(method: &Method) -> AuditOperation {
    match *method {
        Method::POST => AuditOperation::Create,
        Method::PUT | Method::PATCH => AuditOperation::Update,
        Method::DELETE => AuditOperation::Delete,
        _ => AuditOperation::Read,
    }
}

/// Controller-style entity name for a path: `/api/jobs/7` is `JobsController`.
pub fn controller_name(path: &str) -> String {
    let resource = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .find(|segment| {
            let lowered = segment.to_ascii_lowercase();
            !NON_RESOURCE_SEGMENTS.contains(&lowered.as_str()) && !is_version_segment(&lowered)
        });
    let Some(resource) = resource else {
        return "RootController".to_string();
    };

    let mut name: String = resource
        .split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect();
    name.push_str("Controller");
    name
}

fn is_version_segment(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].chars().all(|ch| ch.is_ascii_digit())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

pub fn request_context(request: &Request) -> RequestContext {
    let headers = request.headers();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .or_else(|| incoming_request_id(headers));

    RequestContext {
        ip: extract_ip(headers).or(peer),
        user_agent: extract_user_agent(headers),
        session_id: extract_session_id(headers),
        request_id,
    }
}

fn extract_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };
    forwarded.or_else(real_ip).map(str::to_string)
}

fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn extract_session_id(headers: &HeaderMap) -> Option<String> {
    let header = headers
        .get(SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    header.or_else(|| {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| SESSION_COOKIES.contains(name) && !value.is_empty())
            .map(|(_, value)| value.to_string())
    })
}

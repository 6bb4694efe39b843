//! Authentication events delivered off the request path.
//!
//! The authentication subsystem publishes through an [`AuthEventPublisher`]
//! and moves on; a listener task turns each event into audit records.

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::{
    models::{
        audit_log::{Actor, AuditCategory, AuditLogEntry, AuditOperation, RequestContext, Severity},
        user::AuthenticatedUser,
    },
    services::{
        actor::ActorContext, audit_log::AuditLogService, capture::run_isolated,
        event_builder::AuditEvent,
    },
};

pub const DEFAULT_AUTH_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    AuthenticationSucceeded {
        user: AuthenticatedUser,
        request: Option<RequestContext>,
    },
    BadCredentials {
        username: String,
        request: Option<RequestContext>,
    },
}

impl AuthEvent {
    fn kind(&self) -> &'static str {
        match self {
            AuthEvent::AuthenticationSucceeded { .. } => "AUTHENTICATION_SUCCESS",
            AuthEvent::BadCredentials { .. } => "AUTHENTICATION_FAILURE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthEventPublisher {
    sender: mpsc::Sender<AuthEvent>,
}

impl AuthEventPublisher {
    /// Queues `event` without waiting. Returns `false` when it was dropped.
    pub fn publish(&self, event: AuthEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::warn!(event_type = event.kind(), "Auth event queue full, dropping event");
                false
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!(event_type = event.kind(), "Auth event listener stopped, dropping event");
                false
            }
        }
    }
}

/// Starts the listener task. It stops once every publisher is dropped.
pub fn spawn_auth_event_listener(
    service: AuditLogService,
    capacity: usize,
) -> (AuthEventPublisher, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::channel::<AuthEvent>(capacity.max(1));
    let handle = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            let label = event.kind();
            let service = service.clone();
            run_isolated(label, async move {
                let entries = auth_entries(&service, event);
                service.record_all(entries).await
            })
            .await;
        }
        tracing::debug!("Auth event listener stopped");
    });
    (AuthEventPublisher { sender }, handle)
}

fn auth_entries(service: &AuditLogService, event: AuthEvent) -> Vec<AuditLogEntry> {
    let builder = service.builder();
    match event {
        AuthEvent::AuthenticationSucceeded { user, request } => {
            let event = AuditEvent::data_change(AuditOperation::Login, "User", user.email.clone())
                .with_type("AUTHENTICATION_SUCCESS", AuditCategory::Authentication);
            let actor = ActorContext::user(user).resolve();
            vec![builder.event(event, actor).request(request).build()]
        }
        AuthEvent::BadCredentials { username, request } => {
            let base = AuditEvent::data_change(AuditOperation::Login, "User", username);
            vec![
                builder
                    .event(
                        base.clone()
                            .with_type("AUTHENTICATION_FAILURE", AuditCategory::Authentication),
                        Actor::anonymous(),
                    )
                    .request(request.clone())
                    .failed("Bad credentials")
                    .build(),
                builder
                    .event(
                        base.security("SUSPICIOUS_LOGIN_ATTEMPT", Severity::Medium),
                        Actor::anonymous(),
                    )
                    .request(request)
                    .failed("Bad credentials")
                    .build(),
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        repositories::{
            audit_log::{AuditLogStore, AuditPredicate, AuditQuery},
            in_memory::InMemoryAuditLogStore,
        },
        services::event_builder::EventBuilder,
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn listener_records_success_and_failure_events() {
        let store = Arc::new(InMemoryAuditLogStore::new());
        let service = AuditLogService::new(store.clone(), EventBuilder::default());
        let (publisher, handle) = spawn_auth_event_listener(service, 8);

        assert!(publisher.publish(AuthEvent::AuthenticationSucceeded {
            user: AuthenticatedUser {
                id: 4,
                email: "ann@jobs.io".into(),
                name: "Ann".into(),
                role: "APPLICANT".into(),
            },
            request: None,
        }));
        assert!(publisher.publish(AuthEvent::BadCredentials {
            username: "mallory@jobs.io".into(),
            request: Some(RequestContext {
                ip: Some("10.0.0.9".into()),
                ..RequestContext::default()
            }),
        }));
        drop(publisher);
        handle.await.expect("listener finishes");

        let success = store
            .find(&AuditQuery::new().and(AuditPredicate::EntityId("ann@jobs.io".into())))
            .await
            .unwrap();
        assert_eq!(success.len(), 1);
        assert_eq!(success[0].entry.event_type, "AUTHENTICATION_SUCCESS");
        assert_eq!(success[0].entry.actor.user_id(), Some(4));

        let failures = store
            .find(&AuditQuery::new().and(AuditPredicate::Success(false)))
            .await
            .unwrap();
        assert_eq!(failures.len(), 2);
        let suspicious = failures
            .iter()
            .find(|log| log.entry.event_type == "SUSPICIOUS_LOGIN_ATTEMPT")
            .expect("suspicious login event");
        assert_eq!(suspicious.entry.severity, Some(Severity::Medium));
        assert_eq!(
            suspicious.entry.request.as_ref().and_then(|r| r.ip.as_deref()),
            Some("10.0.0.9")
        );
    }

    #[tokio::test]
    async fn publish_reports_dropped_events_once_the_listener_is_gone() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let publisher = AuthEventPublisher { sender };
        assert!(!publisher.publish(AuthEvent::BadCredentials {
            username: "x".into(),
            request: None,
        }));
    }
}

use std::sync::Arc;

use crate::{
    config::Config,
    middleware::identity::IdentityProvider,
    repositories::audit_log::AuditLogStore,
    services::{
        audit_log::AuditLogService, audit_query::AuditQueryService,
        audit_stats::AuditStatsService,
        auth_events::{spawn_auth_event_listener, AuthEventPublisher, DEFAULT_AUTH_EVENT_CAPACITY},
        capture::AuditCapture,
        event_builder::EventBuilder,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AuditLogStore>,
    pub audit: AuditLogService,
    pub capture: AuditCapture,
    pub queries: AuditQueryService,
    pub stats: AuditStatsService,
    /// Hand-off for authentication events; recorded off the request path.
    pub auth_events: AuthEventPublisher,
    pub identity: Arc<dyn IdentityProvider>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        store: Arc<dyn AuditLogStore>,
        identity: Arc<dyn IdentityProvider>,
        config: Config,
    ) -> Self {
        let builder = EventBuilder::new(config.audit_value_max_chars);
        Self::with_builder(store, identity, config, builder)
    }

    /// Same as [`AppState::new`] with a caller-supplied event builder, e.g.
    /// one with a fixed clock.
    ///
    /// Spawns the authentication event listener, so this must run inside a
    /// tokio runtime. The listener stops once the last clone of the state is
    /// dropped.
    pub fn with_builder(
        store: Arc<dyn AuditLogStore>,
        identity: Arc<dyn IdentityProvider>,
        config: Config,
        builder: EventBuilder,
    ) -> Self {
        let audit = AuditLogService::new(store.clone(), builder);
        let (auth_events, _listener) =
            spawn_auth_event_listener(audit.clone(), DEFAULT_AUTH_EVENT_CAPACITY);
        Self {
            capture: AuditCapture::new(audit.clone()),
            queries: AuditQueryService::new(store.clone()),
            stats: AuditStatsService::new(store.clone()),
            auth_events,
            audit,
            store,
            identity,
            config,
        }
    }
}

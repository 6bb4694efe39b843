use std::sync::Arc;

use crate::{
    error::CaptureError,
    models::audit_log::{AuditLog, AuditLogEntry, Severity},
    repositories::audit_log::AuditLogStore,
    services::event_builder::EventBuilder,
};

/// Writes audit records and mirrors each one onto the `audit` tracing target.
#[derive(Clone)]
pub struct AuditLogService {
    store: Arc<dyn AuditLogStore>,
    builder: EventBuilder,
}

impl AuditLogService {
    pub fn new(store: Arc<dyn AuditLogStore>, builder: EventBuilder) -> Self {
        Self { store, builder }
    }

    pub fn builder(&self) -> &EventBuilder {
        &self.builder
    }

    pub fn store(&self) -> &Arc<dyn AuditLogStore> {
        &self.store
    }

    pub async fn record(&self, entry: AuditLogEntry) -> Result<AuditLog, CaptureError> {
        let log = self.store.append(entry).await?;
        mirror(&log);
        Ok(log)
    }

    /// Records every entry even when an earlier one fails; reports the first failure.
    pub async fn record_all(&self, entries: Vec<AuditLogEntry>) -> Result<(), CaptureError> {
        let mut first_error = None;
        for entry in entries {
            if let Err(err) = self.record(entry).await {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn mirror(log: &AuditLog) {
    let entry = &log.entry;
    let actor = entry.actor.label();
    let ip = entry
        .request
        .as_ref()
        .and_then(|request| request.ip.as_deref())
        .unwrap_or("-");
    match entry.severity {
        Some(Severity::Medium | Severity::High) => tracing::warn!(
            target: "audit",
            id = log.id,
            event_type = %entry.event_type,
            severity = entry.severity.map(|severity| severity.as_str()).unwrap_or("-"),
            entity = %entry.entity_name,
            entity_id = %entry.entity_id,
            actor = %actor,
            ip = %ip,
            error = entry.error_message.as_deref().unwrap_or("-"),
            "Security event"
        ),
        _ => tracing::info!(
            target: "audit",
            id = log.id,
            event_type = %entry.event_type,
            operation = %entry.operation,
            entity = %entry.entity_name,
            entity_id = %entry.entity_id,
            actor = %actor,
            success = entry.success,
            "Audit event"
        ),
    }
}

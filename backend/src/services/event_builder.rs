//! Assembles [`AuditLogEntry`] values.
//!
//! The builder owns the clock, so the capture timestamp is always set here and
//! never by a caller. Snapshot encoding cannot fail: a value that does not
//! serialize is replaced by a diagnostic string.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::models::audit_log::{
    Actor, AuditCategory, AuditLogEntry, AuditOperation, RequestContext, Severity,
};

pub const DEFAULT_VALUE_MAX_CHARS: usize = 5000;
const MAX_CHANGED_FIELDS_CHARS: usize = 1000;
const MAX_USER_AGENT_CHARS: usize = 500;
const MAX_ERROR_MESSAGE_CHARS: usize = 1000;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What happened and to which entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub operation: AuditOperation,
    pub entity_name: String,
    pub entity_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub severity: Option<Severity>,
}

impl AuditEvent {
    /// A plain entity change (`DATA_CHANGE`).
    pub fn data_change(
        operation: AuditOperation,
        entity_name: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            entity_name: entity_name.into(),
            entity_id: entity_id.into(),
            event_type: "DATA_CHANGE".to_string(),
            category: AuditCategory::Data,
            severity: None,
        }
    }

    pub fn with_type(mut self, event_type: impl Into<String>, category: AuditCategory) -> Self {
        self.event_type = event_type.into();
        self.category = category;
        self
    }

    pub fn security(mut self, event_type: impl Into<String>, severity: Severity) -> Self {
        self.event_type = event_type.into();
        self.category = AuditCategory::Security;
        self.severity = Some(severity);
        self
    }
}

#[derive(Clone)]
pub struct EventBuilder {
    clock: Clock,
    value_max_chars: usize,
}

impl fmt::Debug for EventBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBuilder")
            .field("value_max_chars", &self.value_max_chars)
            .finish_non_exhaustive()
    }
}

impl Default for EventBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_VALUE_MAX_CHARS)
    }
}

impl EventBuilder {
    pub fn new(value_max_chars: usize) -> Self {
        Self {
            clock: Arc::new(Utc::now),
            value_max_chars: value_max_chars.max(1),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn event(&self, event: AuditEvent, actor: Actor) -> PendingEntry<'_> {
        PendingEntry {
            builder: self,
            event,
            actor,
            request: None,
            old_value: None,
            new_value: None,
            changed_fields: None,
            error_message: None,
        }
    }
}

/// An entry being assembled. Finish it with [`PendingEntry::build`].
#[must_use]
pub struct PendingEntry<'a> {
    builder: &'a EventBuilder,
    event: AuditEvent,
    actor: Actor,
    request: Option<RequestContext>,
    old_value: Option<String>,
    new_value: Option<String>,
    changed_fields: Option<String>,
    error_message: Option<String>,
}

impl PendingEntry<'_> {
    pub fn request(mut self, request: Option<RequestContext>) -> Self {
        self.request = request.filter(|request| !request.is_empty());
        self
    }

    pub fn old_value<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.old_value = Some(self.encode(value, "old"));
        self
    }

    pub fn new_value<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.new_value = Some(self.encode(value, "new"));
        self
    }

    /// Stores already-rendered text as the new-value snapshot.
    pub fn new_text(mut self, text: impl Into<String>) -> Self {
        self.new_value = Some(cap(text.into(), self.builder.value_max_chars));
        self
    }

    pub fn changed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = fields
            .into_iter()
            .map(|field| field.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.changed_fields = (!joined.is_empty()).then(|| cap(joined, MAX_CHANGED_FIELDS_CHARS));
        self
    }

    /// Marks the entry as a failure.
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(cap(message.into(), MAX_ERROR_MESSAGE_CHARS));
        self
    }

    pub fn build(self) -> AuditLogEntry {
        let request = self.request.map(|mut request| {
            request.user_agent = request
                .user_agent
                .map(|agent| cap(agent, MAX_USER_AGENT_CHARS));
            request
        });
        AuditLogEntry {
            occurred_at: (self.builder.clock)(),
            entity_name: self.event.entity_name,
            entity_id: self.event.entity_id,
            operation: self.event.operation,
            event_type: self.event.event_type,
            category: self.event.category,
            severity: self.event.severity,
            actor: self.actor,
            old_value: self.old_value,
            new_value: self.new_value,
            changed_fields: self.changed_fields,
            request,
            success: self.error_message.is_none(),
            error_message: self.error_message,
        }
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T, which: &str) -> String {
        let encoded = catch_unwind(AssertUnwindSafe(|| serde_json::to_string(value)));
        let text = match encoded {
            Ok(Ok(json)) => json,
            Ok(Err(err)) => format!("Error serializing {which} values: {err}"),
            Err(_) => format!("Error serializing {which} values: serializer panicked"),
        };
        cap(text, self.builder.value_max_chars)
    }
}

fn cap(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[..index].to_string(),
        None => text,
    }
}

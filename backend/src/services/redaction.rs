//! Argument rendering for audit records.
//!
//! Values are rendered through their `serde` form so secrets can be masked
//! structurally before anything is turned into text. Rendering is total: a
//! value that fails to serialize (or panics while doing so) still produces a
//! string.

use serde::Serialize;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub const REDACTED_PLACEHOLDER: &str = "***HIDDEN***";

const MAX_RENDERED_CHARS: usize = 100;
const SENSITIVE_TYPE_MARKERS: [&str; 2] = ["password", "token"];
const SENSITIVE_KEY_MARKERS: [&str; 3] = ["password", "token", "secret"];

/// What an argument says about itself when it is audited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditSummary {
    /// Identifier of the entity the argument is about, used as the record's
    /// entity id when the caller does not supply one.
    pub subject_id: Option<String>,
    /// Field names masked in addition to the built-in sensitive keys.
    pub redacted_fields: Vec<&'static str>,
}

/// Implemented by request payloads that want a say in how they are audited.
pub trait AuditableSummary {
    fn audit_summary(&self) -> AuditSummary;
}

/// One rendered argument of an audited call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditArg {
    rendered: String,
    subject_id: Option<String>,
}

impl AuditArg {
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Self {
        Self {
            rendered: render_argument(Some(value), &type_label::<T>()),
            subject_id: None,
        }
    }

    pub fn optional<T: Serialize>(value: Option<&T>) -> Self {
        Self {
            rendered: render_argument(value, &type_label::<T>()),
            subject_id: None,
        }
    }

    /// Renders `value` honouring its own [`AuditSummary`]. A summary that
    /// panics leaves nothing known about which fields to mask, so the value
    /// itself is withheld.
    pub fn auditable<T: Serialize + AuditableSummary>(value: &T) -> Self {
        let label = type_label::<T>();
        match catch_unwind(AssertUnwindSafe(|| value.audit_summary())) {
            Ok(summary) => Self {
                rendered: render_with(Some(value), &label, &summary.redacted_fields),
                subject_id: summary.subject_id,
            },
            Err(_) => Self {
                rendered: format!("{label}(<unavailable>)"),
                subject_id: None,
            },
        }
    }

    pub fn null() -> Self {
        Self {
            rendered: "null".to_string(),
            subject_id: None,
        }
    }

    pub fn rendered(&self) -> &str {
        &self.rendered
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.subject_id.as_deref()
    }
}

/// Renders `value` as `TypeName(form)`, `null`, or the redaction placeholder
/// when `declared_type` names a secret-bearing type.
pub fn render_argument<T: Serialize + ?Sized>(value: Option<&T>, declared_type: &str) -> String {
    render_with(value, declared_type, &[])
}

/// Renders an argument list as `[a, b, ...]`.
pub fn render_arguments(args: &[AuditArg]) -> String {
    let joined = args
        .iter()
        .map(AuditArg::rendered)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{joined}]")
}

fn render_with<T: Serialize + ?Sized>(
    value: Option<&T>,
    declared_type: &str,
    extra_fields: &[&str],
) -> String {
    let Some(value) = value else {
        return "null".to_string();
    };
    if is_sensitive_type(declared_type) {
        return REDACTED_PLACEHOLDER.to_string();
    }

    let serialized = catch_unwind(AssertUnwindSafe(|| serde_json::to_value(value)));
    match serialized {
        Ok(Ok(json)) => {
            let masked = mask_sensitive(&json, extra_fields);
            format!("{declared_type}({})", truncate(&string_form(&masked)))
        }
        _ => format!("{declared_type}(<unserializable>)"),
    }
}

fn is_sensitive_type(declared_type: &str) -> bool {
    let lowered = declared_type.to_ascii_lowercase();
    SENSITIVE_TYPE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn is_sensitive_key(key: &str, extra_fields: &[&str]) -> bool {
    let lowered = key.to_ascii_lowercase();
    SENSITIVE_KEY_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
        || extra_fields
            .iter()
            .any(|field| field.eq_ignore_ascii_case(key))
}

fn mask_sensitive(value: &Value, extra_fields: &[&str]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    let out = if is_sensitive_key(key, extra_fields) {
                        Value::String(REDACTED_PLACEHOLDER.to_string())
                    } else {
                        mask_sensitive(val, extra_fields)
                    };
                    (key.clone(), out)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| mask_sensitive(item, extra_fields))
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn string_form(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_RENDERED_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_RENDERED_CHARS).collect();
    out.push_str("...");
    out
}

fn type_label<T: ?Sized>() -> String {
    short_type_name(std::any::type_name::<T>())
}

/// Strips module paths: `core::option::Option<alloc::string::String>` becomes
/// `Option<String>`.
pub fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            segment.push(ch);
        } else {
            out.push_str(last_path_segment(&segment));
            segment.clear();
            out.push(ch);
        }
    }
    out.push_str(last_path_segment(&segment));
    out
}

fn last_path_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

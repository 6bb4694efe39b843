//! Audit records and the value types they are assembled from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Entity name under which the audit query surface records its own traffic.
pub const AUDIT_CONTROLLER_ENTITY: &str = "AuditController";

/// Closed set of operations an audit record can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOperation {
    Create,
    Update,
    Delete,
    Read,
    Login,
    Logout,
    Register,
    StatusChange,
    BulkUpdate,
    ApplyJob,
    WithdrawApplication,
    UploadResume,
}

impl AuditOperation {
    pub const ALL: [AuditOperation; 12] = [
        AuditOperation::Create,
        AuditOperation::Update,
        AuditOperation::Delete,
        AuditOperation::Read,
        AuditOperation::Login,
        AuditOperation::Logout,
        AuditOperation::Register,
        AuditOperation::StatusChange,
        AuditOperation::BulkUpdate,
        AuditOperation::ApplyJob,
        AuditOperation::WithdrawApplication,
        AuditOperation::UploadResume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOperation::Create => "CREATE",
            AuditOperation::Update => "UPDATE",
            AuditOperation::Delete => "DELETE",
            AuditOperation::Read => "READ",
            AuditOperation::Login => "LOGIN",
            AuditOperation::Logout => "LOGOUT",
            AuditOperation::Register => "REGISTER",
            AuditOperation::StatusChange => "STATUS_CHANGE",
            AuditOperation::BulkUpdate => "BULK_UPDATE",
            AuditOperation::ApplyJob => "APPLY_JOB",
            AuditOperation::WithdrawApplication => "WITHDRAW_APPLICATION",
            AuditOperation::UploadResume => "UPLOAD_RESUME",
        }
    }

    /// Canonical names of every operation, in declaration order.
    pub fn valid_names() -> Vec<&'static str> {
        Self::ALL.iter().map(AuditOperation::as_str).collect()
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperation(pub String);

impl fmt::Display for UnknownOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown audit operation `{}`", self.0)
    }
}

impl std::error::Error for UnknownOperation {}

impl FromStr for AuditOperation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|operation| operation.as_str() == normalized)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}

/// Broad family an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    Data,
    Http,
    Business,
    Authentication,
    Security,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Data => "DATA",
            AuditCategory::Http => "HTTP",
            AuditCategory::Business => "BUSINESS",
            AuditCategory::Authentication => "AUTHENTICATION",
            AuditCategory::Security => "SECURITY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DATA" => Some(AuditCategory::Data),
            "HTTP" => Some(AuditCategory::Http),
            "BUSINESS" => Some(AuditCategory::Business),
            "AUTHENTICATION" => Some(AuditCategory::Authentication),
            "SECURITY" => Some(AuditCategory::Security),
            _ => None,
        }
    }
}

/// Severity carried by security events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "LOW" => Some(Severity::Low),
            "MEDIUM" => Some(Severity::Medium),
            "HIGH" => Some(Severity::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorKind {
    User,
    Anonymous,
    System,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::User => "USER",
            ActorKind::Anonymous => "ANONYMOUS",
            ActorKind::System => "SYSTEM",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "USER" => Some(ActorKind::User),
            "ANONYMOUS" => Some(ActorKind::Anonymous),
            "SYSTEM" => Some(ActorKind::System),
            _ => None,
        }
    }
}

/// Identity an audited action is attributed to.
///
/// The identity fields are either all present (an authenticated user) or all
/// absent (the anonymous or system sentinel). The constructors are the only
/// way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    kind: ActorKind,
    user_id: Option<i64>,
    email: Option<String>,
    display_name: Option<String>,
    role: Option<String>,
}

impl Actor {
    pub fn user(
        user_id: i64,
        email: impl Into<String>,
        display_name: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            kind: ActorKind::User,
            user_id: Some(user_id),
            email: Some(email.into()),
            display_name: Some(display_name.into()),
            role: Some(role.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::sentinel(ActorKind::Anonymous)
    }

    pub fn system() -> Self {
        Self::sentinel(ActorKind::System)
    }

    fn sentinel(kind: ActorKind) -> Self {
        Self {
            kind,
            user_id: None,
            email: None,
            display_name: None,
            role: None,
        }
    }

    /// Rebuilds an actor from stored columns, collapsing partial identities
    /// to the stored sentinel. A missing display name falls back to the email.
    pub fn from_parts(
        kind: ActorKind,
        user_id: Option<i64>,
        email: Option<String>,
        display_name: Option<String>,
        role: Option<String>,
    ) -> Self {
        match (kind, user_id, email, role) {
            (ActorKind::User, Some(id), Some(email), Some(role)) => {
                let name = display_name.unwrap_or_else(|| email.clone());
                Self::user(id, email, name, role)
            }
            (ActorKind::System, ..) => Self::system(),
            _ => Self::anonymous(),
        }
    }

    pub fn kind(&self) -> ActorKind {
        self.kind
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Human-readable label used in log lines.
    pub fn label(&self) -> String {
        match (&self.display_name, self.user_id) {
            (Some(name), Some(id)) => format!("{name} (ID: {id})"),
            _ => self.kind.as_str().to_string(),
        }
    }
}

impl Default for Actor {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Request metadata captured alongside an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn is_empty(&self) -> bool {
        self.ip.is_none()
            && self.user_agent.is_none()
            && self.session_id.is_none()
            && self.request_id.is_none()
    }
}

/// A fully built audit record that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLogEntry {
    pub occurred_at: DateTime<Utc>,
    pub entity_name: String,
    pub entity_id: String,
    pub operation: AuditOperation,
    pub event_type: String,
    pub category: AuditCategory,
    pub severity: Option<Severity>,
    pub actor: Actor,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_fields: Option<String>,
    pub request: Option<RequestContext>,
    pub success: bool,
    pub error_message: Option<String>,
}

/// A stored audit record. Never mutated after the store assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLog {
    pub id: i64,
    #[serde(flatten)]
    pub entry: AuditLogEntry,
}

impl AuditLog {
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.entry.occurred_at
    }
}

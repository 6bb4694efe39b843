//! Mutation-boundary capture.
//!
//! [`AuditCapture::capture`] wraps a named business operation: it awaits the
//! operation, records what happened, and hands the operation's own result back
//! untouched. Recording runs in [`run_isolated`], so a failing store, a
//! panicking serializer or a cancelled caller never changes what the caller
//! observes.

use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::{
    error::CaptureError,
    models::audit_log::{AuditCategory, AuditLogEntry, AuditOperation, RequestContext, Severity},
    services::{
        actor::ActorContext,
        audit_log::AuditLogService,
        event_builder::AuditEvent,
        redaction::{render_arguments, AuditArg},
    },
};

const UNKNOWN_ENTITY_ID: &str = "unknown";
const UNPRINTABLE_ERROR: &str = "<unprintable error>";

/// The business operations this service knows how to audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationPoint {
    CreateJob,
    UpdateJob,
    ApplyJob,
    WithdrawApplication,
    UploadResume,
    /// A privileged operation, named by the caller.
    Admin(String),
    Login,
    Register,
    Logout,
}

impl MutationPoint {
    pub fn operation(&self) -> AuditOperation {
        match self {
            MutationPoint::CreateJob => AuditOperation::Create,
            MutationPoint::UpdateJob | MutationPoint::Admin(_) => AuditOperation::Update,
            MutationPoint::ApplyJob => AuditOperation::ApplyJob,
            MutationPoint::WithdrawApplication => AuditOperation::WithdrawApplication,
            MutationPoint::UploadResume => AuditOperation::UploadResume,
            MutationPoint::Login => AuditOperation::Login,
            MutationPoint::Register => AuditOperation::Register,
            MutationPoint::Logout => AuditOperation::Logout,
        }
    }

    pub fn entity_name(&self) -> &'static str {
        match self {
            MutationPoint::CreateJob | MutationPoint::UpdateJob => "Job",
            MutationPoint::ApplyJob | MutationPoint::WithdrawApplication => "JobApplication",
            MutationPoint::UploadResume => "Resume",
            MutationPoint::Admin(_) => "Admin",
            MutationPoint::Login | MutationPoint::Register | MutationPoint::Logout => "User",
        }
    }

    pub fn success_event_type(&self) -> &'static str {
        match self {
            MutationPoint::CreateJob => "JOB_CREATED",
            MutationPoint::UpdateJob => "JOB_UPDATED",
            MutationPoint::ApplyJob => "JOB_APPLICATION_SUBMITTED",
            MutationPoint::WithdrawApplication => "APPLICATION_WITHDRAWN",
            MutationPoint::UploadResume => "RESUME_UPLOADED",
            MutationPoint::Admin(_) => "ADMIN_OPERATION",
            MutationPoint::Login => "LOGIN_SUCCESS",
            MutationPoint::Register => "REGISTRATION_SUCCESS",
            MutationPoint::Logout => "LOGOUT",
        }
    }

    pub fn failure_event_type(&self) -> String {
        format!("{}_FAILED", self.name())
    }

    pub fn category(&self) -> AuditCategory {
        match self {
            MutationPoint::Login | MutationPoint::Register | MutationPoint::Logout => {
                AuditCategory::Authentication
            }
            _ => AuditCategory::Business,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            MutationPoint::CreateJob => "CREATE_JOB",
            MutationPoint::UpdateJob => "UPDATE_JOB",
            MutationPoint::ApplyJob => "APPLY_JOB",
            MutationPoint::WithdrawApplication => "WITHDRAW_APPLICATION",
            MutationPoint::UploadResume => "UPLOAD_RESUME",
            MutationPoint::Admin(_) => "ADMIN_OPERATION",
            MutationPoint::Login => "LOGIN",
            MutationPoint::Register => "REGISTER",
            MutationPoint::Logout => "LOGOUT",
        }
    }
}

impl fmt::Display for MutationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationPoint::Admin(name) => write!(f, "ADMIN_OPERATION({name})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Who is calling and from where, captured once per operation.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub actor: ActorContext,
    pub request: Option<RequestContext>,
    pub entity_id: Option<String>,
}

impl CallContext {
    pub fn new(actor: ActorContext) -> Self {
        Self {
            actor,
            ..Self::default()
        }
    }

    pub fn with_request(mut self, request: RequestContext) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }
}

#[derive(Clone)]
pub struct AuditCapture {
    service: AuditLogService,
}

impl AuditCapture {
    pub fn new(service: AuditLogService) -> Self {
        Self { service }
    }

    /// Runs `operation` and records its outcome at `point`.
    ///
    /// The returned value is exactly what `operation` produced.
    pub async fn capture<T, E, F>(
        &self,
        point: MutationPoint,
        context: CallContext,
        args: Vec<AuditArg>,
        operation: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let outcome = operation.await;
        let failure = outcome.as_ref().err().map(describe_failure);

        let label = point.to_string();
        let service = self.service.clone();
        run_isolated(&label, async move {
            let entries = mutation_entries(&service, &point, context, &args, failure);
            service.record_all(entries).await
        })
        .await;

        outcome
    }
}

/// Formats the operation's error without letting a panicking `Display`
/// escape into the caller.
fn describe_failure<E: fmt::Display>(err: &E) -> String {
    catch_unwind(AssertUnwindSafe(|| err.to_string()))
        .unwrap_or_else(|_| UNPRINTABLE_ERROR.to_string())
}

fn mutation_entries(
    service: &AuditLogService,
    point: &MutationPoint,
    context: CallContext,
    args: &[AuditArg],
    failure: Option<String>,
) -> Vec<AuditLogEntry> {
    let actor = context.actor.resolve();
    let entity_id = context
        .entity_id
        .or_else(|| args.iter().find_map(|arg| arg.subject_id().map(str::to_string)))
        .or_else(|| match point {
            MutationPoint::Admin(name) => Some(name.clone()),
            _ => None,
        })
        .unwrap_or_else(|| UNKNOWN_ENTITY_ID.to_string());
    let rendered = render_arguments(args);
    let base = AuditEvent::data_change(point.operation(), point.entity_name(), entity_id);
    let builder = service.builder();

    let Some(message) = failure else {
        let event = base.with_type(point.success_event_type(), point.category());
        return vec![builder
            .event(event, actor)
            .request(context.request)
            .new_text(rendered)
            .build()];
    };

    let mut entries = vec![builder
        .event(
            base.clone()
                .security(point.failure_event_type(), Severity::High),
            actor.clone(),
        )
        .request(context.request.clone())
        .new_text(rendered.clone())
        .failed(message.clone())
        .build()];
    if *point == MutationPoint::Login {
        entries.push(
            builder
                .event(
                    base.security("SUSPICIOUS_LOGIN_ATTEMPT", Severity::Medium),
                    actor,
                )
                .request(context.request)
                .new_text(rendered)
                .failed(message)
                .build(),
        );
    }
    entries
}

/// Drives `task` to completion on its own tokio task and swallows whatever
/// goes wrong, logging it.
///
/// The spawned task keeps running if the caller is dropped mid-await.
pub async fn run_isolated<F>(label: &str, task: F)
where
    F: Future<Output = Result<(), CaptureError>> + Send + 'static,
{
    match tokio::spawn(task).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::warn!(error = %err, event_type = %label, "Failed to record audit log");
        }
        Err(join_err) => {
            let err = CaptureError::Aborted(join_err.to_string());
            tracing::error!(error = %err, event_type = %label, "Audit capture task failed");
        }
    }
}

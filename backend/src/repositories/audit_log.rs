//! Append-only audit record storage.
//!
//! Reads are expressed as an [`AuditQuery`]: an ordered conjunction of
//! [`AuditPredicate`]s. Every store returns matches newest first, breaking
//! timestamp ties by descending id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::{
    error::StoreError,
    models::{
        audit_log::{
            Actor, ActorKind, AuditCategory, AuditLog, AuditLogEntry, AuditOperation,
            RequestContext, Severity,
        },
        PageRequest,
    },
};

/// A single filter over stored records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditPredicate {
    EntityName(String),
    /// Case-insensitive exclusion of one entity name.
    EntityNameIsNot(String),
    EntityId(String),
    UserEmail(String),
    Operation(AuditOperation),
    /// Inclusive on both ends.
    OccurredBetween {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    OccurredFrom(DateTime<Utc>),
    OccurredUntil(DateTime<Utc>),
    Success(bool),
}

impl AuditPredicate {
    pub fn matches(&self, log: &AuditLog) -> bool {
        let entry = &log.entry;
        match self {
            AuditPredicate::EntityName(name) => entry.entity_name == *name,
            AuditPredicate::EntityNameIsNot(name) => {
                !entry.entity_name.eq_ignore_ascii_case(name)
            }
            AuditPredicate::EntityId(id) => entry.entity_id == *id,
            AuditPredicate::UserEmail(email) => entry.actor.email() == Some(email.as_str()),
            AuditPredicate::Operation(operation) => entry.operation == *operation,
            AuditPredicate::OccurredBetween { from, to } => {
                entry.occurred_at >= *from && entry.occurred_at <= *to
            }
            AuditPredicate::OccurredFrom(from) => entry.occurred_at >= *from,
            AuditPredicate::OccurredUntil(to) => entry.occurred_at <= *to,
            AuditPredicate::Success(success) => entry.success == *success,
        }
    }
}

/// Conjunction of predicates. An empty query matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    predicates: Vec<AuditPredicate>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, predicate: AuditPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn push(&mut self, predicate: AuditPredicate) {
        self.predicates.push(predicate);
    }

    pub fn predicates(&self) -> &[AuditPredicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, log: &AuditLog) -> bool {
        self.predicates.iter().all(|predicate| predicate.matches(log))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    /// Persists a new record and returns it with its assigned id.
    async fn append(&self, entry: AuditLogEntry) -> Result<AuditLog, StoreError>;

    /// Every record matching `query`, newest first.
    async fn find(&self, query: &AuditQuery) -> Result<Vec<AuditLog>, StoreError>;

    /// One page of records matching `query`, newest first, with the total match count.
    async fn find_page(
        &self,
        query: &AuditQuery,
        page: PageRequest,
    ) -> Result<(Vec<AuditLog>, i64), StoreError>;

    async fn count(&self, query: &AuditQuery) -> Result<i64, StoreError>;

    /// Every entity name ever recorded, sorted.
    async fn distinct_entity_names(&self) -> Result<Vec<String>, StoreError>;
}

const SELECT_AUDIT_LOGS: &str = "SELECT id, occurred_at, entity_name, entity_id, operation, \
     event_type, category, severity, actor_type, user_id, user_email, user_name, user_role, \
     old_values, new_values, changed_fields, ip_address, user_agent, session_id, request_id, \
     success, error_message FROM audit_logs";

#[derive(Debug, FromRow)]
struct AuditLogRow {
    id: i64,
    occurred_at: DateTime<Utc>,
    entity_name: String,
    entity_id: String,
    operation: String,
    event_type: String,
    category: String,
    severity: Option<String>,
    actor_type: String,
    user_id: Option<i64>,
    user_email: Option<String>,
    user_name: Option<String>,
    user_role: Option<String>,
    old_values: Option<String>,
    new_values: Option<String>,
    changed_fields: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    session_id: Option<String>,
    request_id: Option<String>,
    success: bool,
    error_message: Option<String>,
}

impl TryFrom<AuditLogRow> for AuditLog {
    type Error = StoreError;

    fn try_from(row: AuditLogRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = move |reason: String| StoreError::Corrupt { id, reason };
        let operation = row
            .operation
            .parse::<AuditOperation>()
            .map_err(|err| corrupt(err.to_string()))?;
        let category = AuditCategory::parse(&row.category)
            .ok_or_else(|| corrupt(format!("unknown category `{}`", row.category)))?;
        let severity = match row.severity.as_deref() {
            Some(raw) => Some(
                Severity::parse(raw).ok_or_else(|| corrupt(format!("unknown severity `{raw}`")))?,
            ),
            None => None,
        };
        let actor_kind = ActorKind::parse(&row.actor_type)
            .ok_or_else(|| corrupt(format!("unknown actor type `{}`", row.actor_type)))?;

        let request = RequestContext {
            ip: row.ip_address,
            user_agent: row.user_agent,
            session_id: row.session_id,
            request_id: row.request_id,
        };

        Ok(AuditLog {
            id: row.id,
            entry: AuditLogEntry {
                occurred_at: row.occurred_at,
                entity_name: row.entity_name,
                entity_id: row.entity_id,
                operation,
                event_type: row.event_type,
                category,
                severity,
                actor: Actor::from_parts(
                    actor_kind,
                    row.user_id,
                    row.user_email,
                    row.user_name,
                    row.user_role,
                ),
                old_value: row.old_values,
                new_value: row.new_values,
                changed_fields: row.changed_fields,
                request: (!request.is_empty()).then_some(request),
                success: row.success,
                error_message: row.error_message,
            },
        })
    }
}

/// PostgreSQL-backed store over the `audit_logs` table.
#[derive(Debug, Clone)]
pub struct PgAuditLogStore {
    pool: PgPool,
}

impl PgAuditLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogStore for PgAuditLogStore {
    async fn append(&self, entry: AuditLogEntry) -> Result<AuditLog, StoreError> {
        let request = entry.request.clone().unwrap_or_default();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO audit_logs \
             (occurred_at, entity_name, entity_id, operation, event_type, category, severity, \
             actor_type, user_id, user_email, user_name, user_role, old_values, new_values, \
             changed_fields, ip_address, user_agent, session_id, request_id, success, \
             error_message) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
             $18, $19, $20, $21) RETURNING id",
        )
        .bind(entry.occurred_at)
        .bind(&entry.entity_name)
        .bind(&entry.entity_id)
        .bind(entry.operation.as_str())
        .bind(&entry.event_type)
        .bind(entry.category.as_str())
        .bind(entry.severity.map(|severity| severity.as_str()))
        .bind(entry.actor.kind().as_str())
        .bind(entry.actor.user_id())
        .bind(entry.actor.email())
        .bind(entry.actor.display_name())
        .bind(entry.actor.role())
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .bind(&entry.changed_fields)
        .bind(&request.ip)
        .bind(&request.user_agent)
        .bind(&request.session_id)
        .bind(&request.request_id)
        .bind(entry.success)
        .bind(&entry.error_message)
        .fetch_one(&self.pool)
        .await?;

        Ok(AuditLog { id, entry })
    }

    async fn find(&self, query: &AuditQuery) -> Result<Vec<AuditLog>, StoreError> {
        let mut builder = select_builder(query, None);
        let rows = builder
            .build_query_as::<AuditLogRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AuditLog::try_from).collect()
    }

    async fn find_page(
        &self,
        query: &AuditQuery,
        page: PageRequest,
    ) -> Result<(Vec<AuditLog>, i64), StoreError> {
        let mut builder = select_builder(query, Some(page));
        let rows = builder
            .build_query_as::<AuditLogRow>()
            .fetch_all(&self.pool)
            .await?;
        let items = rows
            .into_iter()
            .map(AuditLog::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let total = self.count(query).await?;
        Ok((items, total))
    }

    async fn count(&self, query: &AuditQuery) -> Result<i64, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM audit_logs");
        apply_predicates(&mut builder, query);
        let total = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn distinct_entity_names(&self) -> Result<Vec<String>, StoreError> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT entity_name FROM audit_logs ORDER BY entity_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }
}

fn select_builder(query: &AuditQuery, page: Option<PageRequest>) -> QueryBuilder<'static, Postgres> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(SELECT_AUDIT_LOGS);
    apply_predicates(&mut builder, query);
    builder.push(" ORDER BY occurred_at DESC, id DESC");

    if let Some(page) = page {
        builder
            .push(" LIMIT ")
            .push_bind(page.size())
            .push(" OFFSET ")
            .push_bind(page.offset());
    }
    builder
}

fn apply_predicates(builder: &mut QueryBuilder<'_, Postgres>, query: &AuditQuery) {
    let mut has_clause = false;
    for predicate in query.predicates() {
        push_clause(builder, &mut has_clause);
        match predicate {
            AuditPredicate::EntityName(name) => {
                builder.push("entity_name = ").push_bind(name.clone());
            }
            AuditPredicate::EntityNameIsNot(name) => {
                builder
                    .push("LOWER(entity_name) <> LOWER(")
                    .push_bind(name.clone())
                    .push(")");
            }
            AuditPredicate::EntityId(id) => {
                builder.push("entity_id = ").push_bind(id.clone());
            }
            AuditPredicate::UserEmail(email) => {
                builder.push("user_email = ").push_bind(email.clone());
            }
            AuditPredicate::Operation(operation) => {
                builder.push("operation = ").push_bind(operation.as_str());
            }
            AuditPredicate::OccurredBetween { from, to } => {
                builder
                    .push("occurred_at BETWEEN ")
                    .push_bind(*from)
                    .push(" AND ")
                    .push_bind(*to);
            }
            AuditPredicate::OccurredFrom(from) => {
                builder.push("occurred_at >= ").push_bind(*from);
            }
            AuditPredicate::OccurredUntil(to) => {
                builder.push("occurred_at <= ").push_bind(*to);
            }
            AuditPredicate::Success(success) => {
                builder.push("success = ").push_bind(*success);
            }
        }
    }
}

fn push_clause(builder: &mut QueryBuilder<'_, Postgres>, has_clause: &mut bool) {
    if *has_clause {
        builder.push(" AND ");
    } else {
        builder.push(" WHERE ");
        *has_clause = true;
    }
}

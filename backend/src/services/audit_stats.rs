//! Rolling aggregates over the audit store.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{
    error::QueryError,
    models::audit_log::AuditOperation,
    repositories::audit_log::{AuditLogStore, AuditPredicate, AuditQuery},
    services::event_builder::Clock,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AuditStats {
    pub window_hours: i64,
    pub since: DateTime<Utc>,
    /// Count per operation inside the window; every operation is listed.
    pub operation_counts: BTreeMap<String, i64>,
    pub total_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    /// Distinct entity names ever recorded, not limited to the window.
    pub distinct_entity_count: i64,
    pub entity_names: Vec<String>,
}

#[derive(Clone)]
pub struct AuditStatsService {
    store: Arc<dyn AuditLogStore>,
    clock: Clock,
}

impl AuditStatsService {
    pub fn new(store: Arc<dyn AuditLogStore>) -> Self {
        Self {
            store,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn stats_since(&self, window: Duration) -> Result<AuditStats, QueryError> {
        let since = (self.clock)()
            .checked_sub_signed(window)
            .ok_or_else(|| {
                QueryError::InvalidFilter(format!("stats window of {window} is out of range"))
            })?;
        let in_window = AuditQuery::new().and(AuditPredicate::OccurredFrom(since));

        let mut operation_counts = BTreeMap::new();
        for operation in AuditOperation::ALL {
            let query = in_window
                .clone()
                .and(AuditPredicate::Operation(operation));
            let count = self.store.count(&query).await?;
            operation_counts.insert(operation.as_str().to_string(), count);
        }

        let total_count = self.store.count(&in_window).await?;
        let success_count = self
            .store
            .count(&in_window.clone().and(AuditPredicate::Success(true)))
            .await?;
        let failure_count = self
            .store
            .count(&in_window.and(AuditPredicate::Success(false)))
            .await?;
        let entity_names = self.store.distinct_entity_names().await?;

        Ok(AuditStats {
            window_hours: window.num_hours(),
            since,
            operation_counts,
            total_count,
            success_count,
            failure_count,
            distinct_entity_count: entity_names.len() as i64,
            entity_names,
        })
    }
}

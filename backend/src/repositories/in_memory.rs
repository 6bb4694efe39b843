//! In-process audit store used for single-node deployments without a
//! database and for tests.

use async_trait::async_trait;
use std::collections::BTreeSet;
use tokio::sync::RwLock;

use crate::{
    error::StoreError,
    models::{
        audit_log::{AuditLog, AuditLogEntry},
        PageRequest,
    },
    repositories::audit_log::{AuditLogStore, AuditQuery},
};

#[derive(Debug, Default)]
pub struct InMemoryAuditLogStore {
    inner: RwLock<Records>,
}

#[derive(Debug, Default)]
struct Records {
    next_id: i64,
    logs: Vec<AuditLog>,
}

impl InMemoryAuditLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.logs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn matching(&self, query: &AuditQuery) -> Vec<AuditLog> {
        let records = self.inner.read().await;
        let mut matched: Vec<AuditLog> = records
            .logs
            .iter()
            .filter(|log| query.matches(log))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.entry
                .occurred_at
                .cmp(&a.entry.occurred_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        matched
    }
}

#[async_trait]
impl AuditLogStore for InMemoryAuditLogStore {
    async fn append(&self, entry: AuditLogEntry) -> Result<AuditLog, StoreError> {
        let mut records = self.inner.write().await;
        records.next_id += 1;
        let log = AuditLog {
            id: records.next_id,
            entry,
        };
        records.logs.push(log.clone());
        Ok(log)
    }

    async fn find(&self, query: &AuditQuery) -> Result<Vec<AuditLog>, StoreError> {
        Ok(self.matching(query).await)
    }

    async fn find_page(
        &self,
        query: &AuditQuery,
        page: PageRequest,
    ) -> Result<(Vec<AuditLog>, i64), StoreError> {
        let matched = self.matching(query).await;
        let total = matched.len() as i64;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let size = usize::try_from(page.size()).unwrap_or(0);
        let items = matched.into_iter().skip(offset).take(size).collect();
        Ok((items, total))
    }

    async fn count(&self, query: &AuditQuery) -> Result<i64, StoreError> {
        let records = self.inner.read().await;
        Ok(records.logs.iter().filter(|log| query.matches(log)).count() as i64)
    }

    async fn distinct_entity_names(&self) -> Result<Vec<String>, StoreError> {
        let records = self.inner.read().await;
        let names: BTreeSet<&str> = records
            .logs
            .iter()
            .map(|log| log.entry.entity_name.as_str())
            .collect();
        Ok(names.into_iter().map(str::to_string).collect())
    }
}

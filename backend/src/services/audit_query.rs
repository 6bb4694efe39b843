//! Query composition over the audit store.
//!
//! Every read is turned into one [`AuditQuery`]: the conjunction of whichever
//! filters the caller supplied. When no filter is supplied the query excludes
//! the audit surface's own traffic.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::sync::Arc;

use crate::{
    error::QueryError,
    models::{
        audit_log::{AuditLog, AuditOperation, AUDIT_CONTROLLER_ENTITY},
        Page, PageRequest,
    },
    repositories::audit_log::{AuditLogStore, AuditPredicate, AuditQuery},
};

/// Optional filters of the general log search. Raw strings are validated by
/// [`compose`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilters {
    pub user_email: Option<String>,
    pub entity_name: Option<String>,
    pub operation: Option<String>,
    pub success: Option<bool>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

/// Builds the conjunction for `filters`.
pub fn compose(filters: &LogFilters) -> Result<AuditQuery, QueryError> {
    let mut query = AuditQuery::new();

    if let Some(email) = normalize_filter(filters.user_email.as_deref()) {
        query.push(AuditPredicate::UserEmail(email));
    }
    if let Some(entity_name) = normalize_filter(filters.entity_name.as_deref()) {
        query.push(AuditPredicate::EntityName(entity_name));
    }
    if let Some(operation) = normalize_filter(filters.operation.as_deref()) {
        query.push(AuditPredicate::Operation(parse_operation(&operation)?));
    }

    let from = parse_bound(filters.date_from.as_deref(), "dateFrom", true)?;
    let to = parse_bound(filters.date_to.as_deref(), "dateTo", false)?;
    match (from, to) {
        (Some(from), Some(to)) => query.push(between(from, to, "dateFrom", "dateTo")?),
        (Some(from), None) => query.push(AuditPredicate::OccurredFrom(from)),
        (None, Some(to)) => query.push(AuditPredicate::OccurredUntil(to)),
        (None, None) => {}
    }

    if let Some(success) = filters.success {
        query.push(AuditPredicate::Success(success));
    }

    if query.is_empty() {
        query.push(AuditPredicate::EntityNameIsNot(
            AUDIT_CONTROLLER_ENTITY.to_string(),
        ));
    }
    Ok(query)
}

pub fn parse_operation(raw: &str) -> Result<AuditOperation, QueryError> {
    raw.parse::<AuditOperation>()
        .map_err(|_| QueryError::UnknownOperation(raw.trim().to_string()))
}

/// Parses a date parameter. Accepts RFC3339, `YYYY-MM-DDTHH:MM[:SS]`,
/// `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD`; a bare date is the start of the day
/// when `is_start` and its last second otherwise.
pub fn parse_datetime_value(value: &str, is_start: bool) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let time = if is_start {
            NaiveTime::from_hms_opt(0, 0, 0)
        } else {
            NaiveTime::from_hms_opt(23, 59, 59)
        }?;
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(
            NaiveDateTime::new(date, time),
            Utc,
        ));
    }
    None
}

fn parse_bound(
    raw: Option<&str>,
    name: &str,
    is_start: bool,
) -> Result<Option<DateTime<Utc>>, QueryError> {
    let Some(raw) = normalize_filter(raw) else {
        return Ok(None);
    };
    parse_datetime_value(&raw, is_start).map(Some).ok_or_else(|| {
        QueryError::InvalidFilter(format!(
            "`{name}` must be a valid datetime (RFC3339, YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD)"
        ))
    })
}

fn between(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    from_name: &str,
    to_name: &str,
) -> Result<AuditPredicate, QueryError> {
    if from > to {
        return Err(QueryError::InvalidFilter(format!(
            "`{from_name}` must be before or equal to `{to_name}`"
        )));
    }
    Ok(AuditPredicate::OccurredBetween { from, to })
}

fn normalize_filter(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Read side of the audit trail.
#[derive(Clone)]
pub struct AuditQueryService {
    store: Arc<dyn AuditLogStore>,
}

impl AuditQueryService {
    pub fn new(store: Arc<dyn AuditLogStore>) -> Self {
        Self { store }
    }

    pub async fn by_entity(
        &self,
        entity_name: &str,
        page: PageRequest,
    ) -> Result<Page<AuditLog>, QueryError> {
        let query = AuditQuery::new().and(AuditPredicate::EntityName(entity_name.to_string()));
        self.page(&query, page).await
    }

    pub async fn by_entity_instance(
        &self,
        entity_name: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditLog>, QueryError> {
        let query = AuditQuery::new()
            .and(AuditPredicate::EntityName(entity_name.to_string()))
            .and(AuditPredicate::EntityId(entity_id.to_string()));
        Ok(self.store.find(&query).await?)
    }

    pub async fn by_user(
        &self,
        user_email: &str,
        page: PageRequest,
    ) -> Result<Page<AuditLog>, QueryError> {
        let query = AuditQuery::new().and(AuditPredicate::UserEmail(user_email.to_string()));
        self.page(&query, page).await
    }

    pub async fn by_operation(&self, operation: &str) -> Result<Vec<AuditLog>, QueryError> {
        let operation = parse_operation(operation)?;
        let query = AuditQuery::new().and(AuditPredicate::Operation(operation));
        Ok(self.store.find(&query).await?)
    }

    /// Records between two required, inclusive bounds.
    pub async fn by_date_range(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<AuditLog>, QueryError> {
        let start = parse_bound(Some(start_date), "startDate", true)?
            .ok_or_else(|| QueryError::InvalidFilter("`startDate` is required".into()))?;
        let end = parse_bound(Some(end_date), "endDate", false)?
            .ok_or_else(|| QueryError::InvalidFilter("`endDate` is required".into()))?;
        let query = AuditQuery::new().and(between(start, end, "startDate", "endDate")?);
        Ok(self.store.find(&query).await?)
    }

    pub async fn search(
        &self,
        filters: &LogFilters,
        page: PageRequest,
    ) -> Result<Page<AuditLog>, QueryError> {
        let query = compose(filters)?;
        self.page(&query, page).await
    }

    async fn page(
        &self,
        query: &AuditQuery,
        page: PageRequest,
    ) -> Result<Page<AuditLog>, QueryError> {
        let (items, total) = self.store.find_page(query, page).await?;
        Ok(Page::new(items, total, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn filters() -> LogFilters {
        LogFilters::default()
    }

    #[test]
    fn no_filters_excludes_the_audit_controller() {
        let query = compose(&filters()).unwrap();
        assert_eq!(
            query.predicates(),
            &[AuditPredicate::EntityNameIsNot("AuditController".into())]
        );
    }

    #[test]
    fn blank_filters_count_as_absent() {
        let query = compose(&LogFilters {
            user_email: Some("  ".into()),
            date_from: Some("".into()),
            ..filters()
        })
        .unwrap();
        assert_eq!(query.predicates().len(), 1);
    }

    #[test]
    fn present_filters_are_conjoined_without_the_default() {
        let query = compose(&LogFilters {
            entity_name: Some("Job".into()),
            success: Some(true),
            ..filters()
        })
        .unwrap();
        assert_eq!(
            query.predicates(),
            &[
                AuditPredicate::EntityName("Job".into()),
                AuditPredicate::Success(true)
            ]
        );
    }

    #[test]
    fn reversed_dates_are_rejected() {
        let err = compose(&LogFilters {
            date_from: Some("2024-01-10T00:00".into()),
            date_to: Some("2024-01-01T00:00".into()),
            ..filters()
        })
        .unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter(_)));
    }

    #[test]
    fn single_bound_becomes_half_open() {
        let query = compose(&LogFilters {
            date_to: Some("2024-01-31".into()),
            ..filters()
        })
        .unwrap();
        assert_eq!(
            query.predicates(),
            &[AuditPredicate::OccurredUntil(
                Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap()
            )]
        );
    }

    #[test]
    fn unknown_operation_is_reported() {
        let err = compose(&LogFilters {
            operation: Some("purge".into()),
            ..filters()
        })
        .unwrap_err();
        assert!(matches!(err, QueryError::UnknownOperation(name) if name == "purge"));
    }

    #[test]
    fn parse_datetime_value_accepts_supported_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 10, 8, 30, 0).unwrap();
        assert_eq!(parse_datetime_value("2024-01-10T08:30:00Z", true), Some(expected));
        assert_eq!(parse_datetime_value("2024-01-10T08:30:00", true), Some(expected));
        assert_eq!(parse_datetime_value("2024-01-10T08:30", true), Some(expected));
        assert_eq!(parse_datetime_value("2024-01-10 08:30:00", true), Some(expected));
        assert_eq!(
            parse_datetime_value("2024-01-10", true),
            Some(Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_datetime_value("yesterday", true), None);
    }
}

pub mod actor;
pub mod audit_log;
pub mod audit_query;
pub mod audit_stats;
pub mod auth_events;
pub mod capture;
pub mod event_builder;
pub mod redaction;

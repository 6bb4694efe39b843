pub mod audit_log;
pub mod in_memory;

pub use audit_log::{AuditLogStore, AuditPredicate, AuditQuery, PgAuditLogStore};
pub use in_memory::InMemoryAuditLogStore;

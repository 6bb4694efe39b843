pub mod audit_logs;

pub use audit_logs::*;

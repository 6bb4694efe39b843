pub mod admin;
pub mod audit_log;
pub mod identity;
pub mod request_id;

pub use admin::*;
pub use audit_log::*;
pub use identity::*;
pub use request_id::*;

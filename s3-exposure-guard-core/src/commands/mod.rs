//! Commands module - service layer for S3 Exposure Guard operations

mod audit;
mod plan;
mod remediate;
pub(crate) mod service;

pub use audit::AuditScope;
pub use plan::plan_remediation;
pub use service::ExposureGuardService;

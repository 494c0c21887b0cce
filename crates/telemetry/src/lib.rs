//! Logging, metrics and audit output for sybil scoring runs.

pub mod audit;
pub mod logging;
pub mod metrics;

pub use audit::{write_audit_sample, AuditRecord};
pub use logging::init_logging;
pub use metrics::Metrics;

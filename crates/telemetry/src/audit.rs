//! Audit logging for flagged addresses.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Envelope written around every audit payload.
#[derive(Debug, Serialize)]
pub struct AuditRecord<'a, T: Serialize> {
    pub recorded_at: DateTime<Utc>,
    pub kind: &'a str,
    pub payload: &'a T,
}

impl<'a, T: Serialize> AuditRecord<'a, T> {
    pub fn new(kind: &'a str, payload: &'a T) -> Self {
        Self {
            recorded_at: Utc::now(),
            kind,
            payload,
        }
    }
}

/// Append a sample JSON payload to the audit file.
///
/// Does nothing when `path` is `None`. Missing parent directories are created.
///
/// # Arguments
/// * `path` - Path to the audit file
/// * `payload` - Serializable payload to write
pub fn write_audit_sample<P: AsRef<Path>, T: Serialize>(
    path: Option<P>,
    payload: &T,
) -> anyhow::Result<()> {
    if let Some(audit_path) = path {
        if let Some(parent) = audit_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(payload)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&audit_path)?;
        writeln!(file, "{}", json)?;
        debug!("Wrote audit sample to {:?}", audit_path.as_ref());
    }
    Ok(())
}

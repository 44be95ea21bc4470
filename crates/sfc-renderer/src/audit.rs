//! Structured audit trail for render and delete operations.
//!
//! Every record carries a UTC timestamp, the component that produced it,
//! the action, its outcome, the affected object and free-form JSON
//! details. Records are emitted through `tracing` under the `audit` target
//! so they can be filtered and shipped separately from diagnostics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// Flows installed for a rendered service path.
    PathRender,
    /// Flows removed for a rendered service path.
    PathDelete,
    /// One-time default flows written to a switch.
    ForwarderInit,
    /// Staged flows discarded after a fatal error.
    Rollback,
    /// Renderer configuration loaded or rejected.
    ConfigurationChange,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCategory::PathRender => write!(f, "PATH_RENDER"),
            AuditCategory::PathDelete => write!(f, "PATH_DELETE"),
            AuditCategory::ForwarderInit => write!(f, "FORWARDER_INIT"),
            AuditCategory::Rollback => write!(f, "ROLLBACK"),
            AuditCategory::ConfigurationChange => write!(f, "CONFIGURATION_CHANGE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    InProgress,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Failure => write!(f, "failure"),
            AuditOutcome::InProgress => write!(f, "in_progress"),
        }
    }
}

/// One audit event. Built with the `with_*` methods, then handed to
/// [`audit_log!`](crate::audit_log).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    pub source: String,
    pub action: String,
    pub outcome: AuditOutcome,
    /// Path id, node id or file name the event is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    /// New record stamped with the current time; the outcome starts as
    /// in-progress.
    pub fn new(category: AuditCategory, source: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_object_type(mut self, obj_type: impl Into<String>) -> Self {
        self.object_type = Some(obj_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Records the failure reason and marks the outcome as failed.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.outcome = AuditOutcome::Failure;
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Emits an [`AuditRecord`] under the `audit` target.
///
/// Successes log at info, in-progress records at debug and failures at
/// warn.
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        match record.outcome {
            $crate::audit::AuditOutcome::Success => {
                tracing::info!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::InProgress => {
                tracing::debug!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::Failure => {
                tracing::warn!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    error = record.error.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
        }
    };
}

/// Installs the global subscriber. `RUST_LOG` overrides `log_level`.
pub fn init_logging(log_level: &str, json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true).json())
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_record_builder() {
        let record = AuditRecord::new(AuditCategory::PathRender, "RspRenderer", "render_path")
            .with_outcome(AuditOutcome::Success)
            .with_object_id("7")
            .with_object_type("rendered_service_path");

        assert_eq!(record.category, AuditCategory::PathRender);
        assert_eq!(record.outcome, AuditOutcome::Success);
        assert_eq!(record.object_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_audit_record_error_marks_failure() {
        let record = AuditRecord::new(AuditCategory::Rollback, "RspRenderer", "render_path")
            .with_error("forwarder sff1 has no switch identity");
        assert_eq!(record.outcome, AuditOutcome::Failure);
    }

    #[test]
    fn test_audit_record_json() {
        let record = AuditRecord::new(AuditCategory::ForwarderInit, "RspRenderer", "install_defaults")
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::json!({ "node": "openflow:1", "flows": 5 }));

        let json = record.to_json();
        assert!(json.contains("FORWARDER_INIT"));
        assert!(json.contains("\"node\":\"openflow:1\""));
        assert!(!json.contains("error"));
    }
}

//! Per-request diagnostic collectors.
//!
//! A [`DiagnosticLogger`] records the operations one component performed for
//! a single request; a [`DiagnosticContext`] groups one logger per component
//! and exports a comprehensive JSON report. Loggers are per-request and
//! never shared across requests.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::error::RangerError;

/// One recorded operation.
#[derive(Debug)]
pub struct OperationEntry {
    pub name: String,
    started: Instant,
    pub started_at: DateTime<Utc>,
    pub duration: Option<Duration>,
    pub success: Option<bool>,
    pub error: Option<serde_json::Value>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Handle returned by [`DiagnosticLogger::log_operation_start`].
#[derive(Debug, Clone, Copy)]
pub struct OperationHandle(usize);

/// Summary over a logger's recorded operations.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticSummary {
    pub success_count: usize,
    pub error_count: usize,
    pub success_rate: f64,
    pub total_duration: Duration,
}

/// Collects the operations one component performed for one request.
#[derive(Debug)]
pub struct DiagnosticLogger {
    component: String,
    request_id: String,
    started_at: DateTime<Utc>,
    started: Instant,
    operations: Vec<OperationEntry>,
}

impl DiagnosticLogger {
    pub fn new(component: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            request_id: request_id.into(),
            started_at: Utc::now(),
            started: Instant::now(),
            operations: Vec::new(),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Record the start of an operation and return a handle for its end.
    pub fn log_operation_start(&mut self, name: impl Into<String>) -> OperationHandle {
        self.operations.push(OperationEntry {
            name: name.into(),
            started: Instant::now(),
            started_at: Utc::now(),
            duration: None,
            success: None,
            error: None,
            metadata: BTreeMap::new(),
        });
        OperationHandle(self.operations.len() - 1)
    }

    /// Record the end of an operation.
    pub fn log_operation_end(
        &mut self,
        handle: OperationHandle,
        success: bool,
        err: Option<&RangerError>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) {
        if let Some(entry) = self.operations.get_mut(handle.0) {
            entry.duration = Some(entry.started.elapsed());
            entry.success = Some(success);
            entry.error = err.map(|e| e.to_report());
            entry.metadata = metadata;
        }
    }

    pub fn operations(&self) -> &[OperationEntry] {
        &self.operations
    }

    pub fn summary(&self) -> DiagnosticSummary {
        let success_count = self
            .operations
            .iter()
            .filter(|op| op.success == Some(true))
            .count();
        let error_count = self
            .operations
            .iter()
            .filter(|op| op.success == Some(false))
            .count();
        let finished = success_count + error_count;
        let success_rate = if finished == 0 {
            0.0
        } else {
            success_count as f64 / finished as f64
        };
        DiagnosticSummary {
            success_count,
            error_count,
            success_rate,
            total_duration: self.started.elapsed(),
        }
    }

    fn to_report(&self) -> serde_json::Value {
        let summary = self.summary();
        json!({
            "component": self.component,
            "request_id": self.request_id,
            "started_at": self.started_at.to_rfc3339(),
            "summary": {
                "success_count": summary.success_count,
                "error_count": summary.error_count,
                "success_rate": summary.success_rate,
                "total_duration_ms": summary.total_duration.as_millis(),
            },
            "operations": self.operations.iter().map(|op| json!({
                "name": op.name,
                "started_at": op.started_at.to_rfc3339(),
                "duration_ms": op.duration.map(|d| d.as_millis()),
                "success": op.success,
                "error": op.error,
                "metadata": op.metadata,
            })).collect::<Vec<_>>(),
        })
    }
}

/// Groups one logger per component for a single request.
#[derive(Debug)]
pub struct DiagnosticContext {
    request_id: String,
    loggers: BTreeMap<String, DiagnosticLogger>,
}

impl DiagnosticContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            loggers: BTreeMap::new(),
        }
    }

    /// The logger for a component, created on first use.
    pub fn logger(&mut self, component: &str) -> &mut DiagnosticLogger {
        let request_id = self.request_id.clone();
        self.loggers
            .entry(component.to_string())
            .or_insert_with(|| DiagnosticLogger::new(component, request_id))
    }

    /// Export a comprehensive JSON report over all component loggers.
    pub fn export_report(&self) -> serde_json::Value {
        json!({
            "request_id": self.request_id,
            "components": self
                .loggers
                .values()
                .map(DiagnosticLogger::to_report)
                .collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes;

    #[test]
    fn test_summary_counts() {
        let mut logger = DiagnosticLogger::new("storage", "req-1");
        let a = logger.log_operation_start("insert_data");
        logger.log_operation_end(a, true, None, BTreeMap::new());
        let b = logger.log_operation_start("get_table_data");
        let err = RangerError::new(codes::STORAGE_TABLE_NOT_FOUND, "no such table");
        logger.log_operation_end(b, false, Some(&err), BTreeMap::new());
        logger.log_operation_start("dangling");

        let summary = logger.summary();
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.error_count, 1);
        assert!((summary.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_report_groups_components() {
        let mut ctx = DiagnosticContext::new("req-7");
        let op = ctx.logger("engine").log_operation_start("parse");
        ctx.logger("engine")
            .log_operation_end(op, true, None, BTreeMap::new());
        ctx.logger("registry");

        let report = ctx.export_report();
        assert_eq!(report["request_id"], "req-7");
        assert_eq!(report["components"].as_array().unwrap().len(), 2);
    }
}

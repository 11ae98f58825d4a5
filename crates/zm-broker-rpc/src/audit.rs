// zm-broker-rpc/src/audit.rs
// ============================================================================
// Module: RPC Audit Logging
// Description: Structured audit events for every RPC call.
// Purpose: Emit one JSON object per call without a hard dependency on a
//          logging framework, exactly as the teacher's MCP crate does for
//          its own request logging.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The teacher carries no `tracing`/`log` dependency; observability is a
//! typed [`AuditSink`] trait with stderr/file/noop implementations emitting
//! one JSON line per event. This module carries that pattern forward
//! unchanged in spirit for RPC calls instead of MCP tool calls.

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

/// One audited RPC call (method, outcome, error code, duration, remote IP).
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Event identifier, always `"rpc_call"`.
    pub event: &'static str,
    /// Event timestamp, milliseconds since epoch.
    pub timestamp_ms: u128,
    /// Request identifier, stringified from the JSON-RPC `id`.
    pub request_id: String,
    /// The dispatched method name, or `None` if the request carried none.
    pub method: Option<String>,
    /// The caller's remote address.
    pub remote_ip: String,
    /// `"ok"` or `"error"`.
    pub outcome: &'static str,
    /// JSON-RPC error code, present only on failure.
    pub error_code: Option<i64>,
    /// Whether this failure should be treated as error-severity (internal
    /// errors and permission denials only; user errors never are, §4.7).
    pub error_severity: bool,
    /// Call duration in microseconds.
    pub duration_us: u128,
}

/// Inputs required to construct an [`AuditEvent`].
pub struct AuditEventParams {
    /// Request identifier, stringified from the JSON-RPC `id`.
    pub request_id: String,
    /// The dispatched method name, or `None` if the request carried none.
    pub method: Option<String>,
    /// The caller's remote address.
    pub remote_ip: String,
    /// `"ok"` or `"error"`.
    pub outcome: &'static str,
    /// JSON-RPC error code, present only on failure.
    pub error_code: Option<i64>,
    /// Whether this failure is error-severity (§4.7).
    pub error_severity: bool,
    /// Call duration in microseconds.
    pub duration_us: u128,
}

impl AuditEvent {
    /// Stamps the current time and builds an audit event.
    #[must_use]
    pub fn new(params: AuditEventParams) -> Self {
        let timestamp_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event: "rpc_call",
            timestamp_ms,
            request_id: params.request_id,
            method: params.method,
            remote_ip: params.remote_ip,
            outcome: params.outcome,
            error_code: params.error_code,
            error_severity: params.error_severity,
            duration_us: params.duration_us,
        }
    }
}

/// Audit sink for RPC call events.
pub trait AuditSink: Send + Sync {
    /// Records one RPC call.
    fn record(&self, event: &AuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file, opened in append mode.
pub struct FileAuditSink {
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn noop_sink_accepts_any_event() {
        let event = AuditEvent::new(AuditEventParams {
            request_id: "1".to_string(),
            method: Some("version_info".to_string()),
            remote_ip: "127.0.0.1".to_string(),
            outcome: "ok",
            error_code: None,
            error_severity: false,
            duration_us: 42,
        });
        NoopAuditSink.record(&event);
    }

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = std::env::temp_dir().join(format!("zm-broker-rpc-audit-test-{:?}", std::thread::current().id()));
        let _ = std::fs::remove_file(&dir);
        let sink = FileAuditSink::new(&dir).unwrap();
        let event = AuditEvent::new(AuditEventParams {
            request_id: "7".to_string(),
            method: Some("start_domain_test".to_string()),
            remote_ip: "127.0.0.1".to_string(),
            outcome: "error",
            error_code: Some(-32603),
            error_severity: true,
            duration_us: 1000,
        });
        sink.record(&event);
        let contents = std::fs::read_to_string(&dir).unwrap();
        assert!(contents.contains("start_domain_test"));
        let _ = std::fs::remove_file(&dir);
    }
}

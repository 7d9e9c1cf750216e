// crates/moodle-gate-mcp/src/audit.rs
// ============================================================================
// Module: Gateway Audit
// Description: Structured audit events for resolution and dispatch decisions.
// Purpose: Record allow/deny outcomes as JSON lines without leaking secrets.
// Dependencies: moodle-gate-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Every resolution and tool-call decision emits one audit event through a
//! pluggable sink. The default sink writes JSON lines to stderr; tests use
//! the no-op sink. Events carry the tool name, session identifier, and
//! outcome, never the MCP key or the Moodle token.

// ============================================================================
// SECTION: Imports
// ============================================================================

use moodle_gate_core::GatewayError;
use serde::Serialize;

// ============================================================================
// SECTION: Sink Trait
// ============================================================================

/// Destination for gateway audit events.
pub trait GatewayAuditSink: Send + Sync {
    /// Records one audit event.
    fn record(&self, event: &GatewayAuditEvent);
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// One dispatch or resolution decision.
#[derive(Debug, Serialize)]
pub struct GatewayAuditEvent {
    /// Event identifier.
    event: &'static str,
    /// Decision outcome.
    decision: &'static str,
    /// Action label (`initialize`, `tools/list`, or the tool name).
    action: String,
    /// Session identifier, when one is bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    /// Failure reason (for deny events).
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl GatewayAuditEvent {
    /// Builds an allow event.
    #[must_use]
    pub fn allowed(action: impl Into<String>, session_id: Option<&str>) -> Self {
        Self {
            event: "gateway_dispatch",
            decision: "allow",
            action: action.into(),
            session_id: session_id.map(ToString::to_string),
            reason: None,
        }
    }

    /// Builds a deny event.
    #[must_use]
    pub fn denied(
        action: impl Into<String>,
        session_id: Option<&str>,
        error: &GatewayError,
    ) -> Self {
        Self {
            event: "gateway_dispatch",
            decision: "deny",
            action: action.into(),
            session_id: session_id.map(ToString::to_string),
            reason: Some(error.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl GatewayAuditSink for StderrAuditSink {
    #[expect(clippy::print_stderr, reason = "Audit sink output channel is stderr.")]
    fn record(&self, event: &GatewayAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            eprintln!("{payload}");
        }
    }
}

/// No-op audit sink for tests.
pub struct NoopAuditSink;

impl GatewayAuditSink for NoopAuditSink {
    fn record(&self, _event: &GatewayAuditEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use moodle_gate_core::GatewayError;

    use super::GatewayAuditEvent;

    #[test]
    fn deny_event_carries_reason_but_no_secrets() {
        let err = GatewayError::RoleForbidden("core_course_get_courses".to_string());
        let event = GatewayAuditEvent::denied("core_course_get_courses", Some("sess-1"), &err);
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["decision"], "deny");
        assert_eq!(wire["session_id"], "sess-1");
        assert!(wire["reason"].as_str().unwrap().contains("not permitted"));
    }

    #[test]
    fn allow_event_omits_reason() {
        let event = GatewayAuditEvent::allowed("tools/list", None);
        let wire = serde_json::to_value(&event).unwrap();
        assert!(wire.get("reason").is_none());
        assert!(wire.get("session_id").is_none());
    }
}

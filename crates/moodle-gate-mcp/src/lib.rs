// crates/moodle-gate-mcp/src/lib.rs
// ============================================================================
// Module: Moodle Gate MCP Library
// Description: MCP transport, dispatch pipeline, and tool catalogue.
// Purpose: Expose the gateway server and its building blocks.
// Dependencies: crate::{audit, catalog, format, router, server, sessions, validate}
// ============================================================================

//! ## Overview
//! `moodle-gate-mcp` is the gateway's protocol-facing crate: the HTTP MCP
//! server, the session store, the role-gated dispatch pipeline, schema
//! validation with structured error payloads, and the static tool
//! catalogue. The outbound clients live in `moodle-gate-client`; this crate
//! wires them to inbound sessions.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod catalog;
pub mod format;
pub mod router;
pub mod server;
pub mod sessions;
pub mod validate;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::GatewayAuditEvent;
pub use audit::GatewayAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use catalog::builtin_tools;
pub use format::format_violations;
pub use router::Dispatcher;
pub use server::GatewayServer;
pub use server::McpServerError;
pub use sessions::NoopTransport;
pub use sessions::SessionManager;
pub use sessions::SessionTransport;
pub use validate::SchemaCompileError;
pub use validate::SchemaSet;

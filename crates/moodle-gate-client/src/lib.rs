// crates/moodle-gate-client/src/lib.rs
// ============================================================================
// Module: Moodle Gate Client Library
// Description: Outbound HTTP clients for the panel and the Moodle REST API.
// Purpose: Expose tenant resolution and single-call remote invocation.
// Dependencies: crate::{moodle, panel}
// ============================================================================

//! ## Overview
//! This crate holds both outbound edges of the gateway: the control-plane
//! resolver that exchanges an MCP key for a tenant record, and the Moodle
//! REST client that forwards one authorized tool call. Both translate their
//! upstreams' failure surfaces into the shared gateway taxonomy.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod moodle;
pub mod panel;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use moodle::CallOptions;
pub use moodle::DEFAULT_TIMEOUT_MS;
pub use moodle::MoodleClient;
pub use moodle::MoodleClientOptions;
pub use moodle::flatten_params;
pub use panel::PanelResolver;

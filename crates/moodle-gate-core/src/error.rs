// crates/moodle-gate-core/src/error.rs
// ============================================================================
// Module: Gateway Error Taxonomy
// Description: Single typed error enumeration for every gateway failure path.
// Purpose: Normalize control-plane, registry, validation, and remote failures.
// Dependencies: thiserror, crate::validation
// ============================================================================

//! ## Overview
//! Every failure a dispatch can produce is one of a closed set of kinds.
//! Resolution failures distinguish unknown credentials from revoked ones and
//! from control-plane outages; remote failures distinguish transport faults
//! from application-level refusals and from cancellation. Validation
//! failures carry the full structured payload so the transport layer can
//! return it to the calling agent verbatim.
//! Security posture: messages never include the Moodle token or the raw MCP
//! key; remote body excerpts are length-capped before they reach an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::validation::ValidationErrorPayload;

// ============================================================================
// SECTION: Error Enumeration
// ============================================================================

/// Closed failure taxonomy for gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The control plane does not know the presented credential.
    #[error("MCP key not found")]
    CredentialNotFound,

    /// The credential exists but is revoked, suspended, or expired.
    #[error("MCP key forbidden")]
    CredentialForbidden,

    /// The control plane returned any other non-2xx or unreadable response.
    #[error("control plane error: {0}")]
    ControlPlaneUpstream(String),

    /// The control plane answered 2xx but the tenant record was unusable.
    #[error("invalid tenant data: {0}")]
    InvalidTenantData(String),

    /// No live session matches the presented session identifier.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// No registered tool matches the requested name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The tenant's role set does not intersect the tool's allow-list.
    #[error("role not permitted for tool: {0}")]
    RoleForbidden(String),

    /// Tool arguments violated the input schema.
    #[error("invalid arguments for tool {}", .0.tool)]
    Validation(Box<ValidationErrorPayload>),

    /// The remote response violated the tool's output schema.
    #[error("invalid upstream response for tool {}", .0.tool)]
    InvalidUpstreamResponse(Box<ValidationErrorPayload>),

    /// The remote call failed below the application layer.
    #[error("remote transport error: {0}")]
    RemoteTransport(String),

    /// The remote platform reported an application-level error.
    #[error("remote application error: {0}")]
    RemoteApplication(String),

    /// The remote call was cancelled or hit its deadline.
    #[error("remote call cancelled or timed out")]
    RemoteCancelled,

    /// The remote response body was not valid JSON.
    #[error("remote response is not valid JSON: {0}")]
    InvalidRemoteJson(String),
}

impl GatewayError {
    /// Returns the validation payload when this error carries one.
    #[must_use]
    pub fn validation_payload(&self) -> Option<&ValidationErrorPayload> {
        match self {
            Self::Validation(payload) | Self::InvalidUpstreamResponse(payload) => Some(payload),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

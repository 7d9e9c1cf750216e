// crates/moodle-gate-client/src/panel.rs
// ============================================================================
// Module: Panel Resolver
// Description: Control-plane credential exchange for tenant resolution.
// Purpose: Exchange an opaque MCP key for a typed tenant record.
// Dependencies: moodle-gate-core, reqwest, serde, serde_json
// ============================================================================

//! ## Overview
//! The panel is the control plane holding the credential-to-tenant mapping.
//! Resolution is a single POST with the opaque MCP key; the response either
//! yields the Moodle endpoint, token, and role grants, or a status code that
//! maps to a typed refusal. The role field is lenient on shape (a bare
//! string or a list) but strict on content: any role outside the closed
//! enumeration rejects the whole record.
//! Security posture: panel responses are untrusted input and pass full
//! validation before a tenant exists.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::time::Duration;

use moodle_gate_core::GatewayError;
use moodle_gate_core::Role;
use moodle_gate_core::Tenant;
use serde::Deserialize;
use serde_json::json;

use crate::moodle::excerpt;

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Role grants as the panel sends them: a bare string or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RolesField {
    /// Single role shortname.
    One(String),
    /// List of role shortnames.
    Many(Vec<String>),
}

impl RolesField {
    /// Flattens the field into its shortname list.
    fn into_names(self) -> Vec<String> {
        match self {
            Self::One(name) => vec![name],
            Self::Many(names) => names,
        }
    }
}

/// Tenant record as returned by the panel on a 200 response.
#[derive(Debug, Clone, Deserialize)]
struct PanelTenantRecord {
    /// Moodle site base URL.
    #[serde(rename = "moodleUrl")]
    moodle_url: String,
    /// Moodle web-service token.
    #[serde(rename = "moodleToken")]
    moodle_token: String,
    /// Granted role shortnames.
    #[serde(rename = "moodleRoles")]
    moodle_roles: RolesField,
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Resolves opaque MCP keys against the panel endpoint.
pub struct PanelResolver {
    /// Shared HTTP client.
    http: reqwest::Client,
    /// Panel resolution endpoint.
    endpoint: String,
}

impl PanelResolver {
    /// Creates a resolver for the given panel endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ControlPlaneUpstream`] when the HTTP client
    /// cannot be constructed.
    pub fn new(endpoint: impl Into<String>, timeout_ms: u64) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| GatewayError::ControlPlaneUpstream(err.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    /// Exchanges an MCP key for a tenant record.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CredentialNotFound`] on 404,
    /// [`GatewayError::CredentialForbidden`] on 403,
    /// [`GatewayError::ControlPlaneUpstream`] for any other non-2xx or
    /// unreachable panel, and [`GatewayError::InvalidTenantData`] when a 2xx
    /// record fails validation.
    pub async fn resolve(&self, mcp_key: &str) -> Result<Tenant, GatewayError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "mcpKey": mcp_key }))
            .send()
            .await
            .map_err(|err| GatewayError::ControlPlaneUpstream(err.to_string()))?;

        let status = response.status();
        match status.as_u16() {
            404 => return Err(GatewayError::CredentialNotFound),
            403 => return Err(GatewayError::CredentialForbidden),
            code if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(GatewayError::ControlPlaneUpstream(format!(
                    "panel returned HTTP {code}: {}",
                    excerpt(&body)
                )));
            }
            _ => {}
        }

        let record: PanelTenantRecord = response
            .json()
            .await
            .map_err(|err| GatewayError::InvalidTenantData(format!("malformed panel response: {err}")))?;
        tenant_from_record(record)
    }
}

/// Validates a panel record into a tenant.
fn tenant_from_record(record: PanelTenantRecord) -> Result<Tenant, GatewayError> {
    if record.moodle_url.trim().is_empty() {
        return Err(GatewayError::InvalidTenantData("moodleUrl is empty".to_string()));
    }
    if record.moodle_token.trim().is_empty() {
        return Err(GatewayError::InvalidTenantData("moodleToken is empty".to_string()));
    }
    let names = record.moodle_roles.into_names();
    let mut roles: BTreeSet<Role> = BTreeSet::new();
    for name in &names {
        let role = Role::parse(name.trim())
            .ok_or_else(|| GatewayError::InvalidTenantData(format!("unknown role: {name}")))?;
        roles.insert(role);
    }
    Tenant::new(record.moodle_url, record.moodle_token, roles)
        .ok_or_else(|| GatewayError::InvalidTenantData("moodleRoles is empty".to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

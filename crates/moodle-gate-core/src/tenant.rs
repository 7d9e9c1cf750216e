// crates/moodle-gate-core/src/tenant.rs
// ============================================================================
// Module: Tenant Record
// Description: Resolved identity bundle bound to a gateway session.
// Purpose: Carry the Moodle endpoint, auth token, and role set for a tenant.
// Dependencies: serde, crate::roles
// ============================================================================

//! ## Overview
//! A tenant is the identity bundle returned by the control plane for an MCP
//! key: the Moodle base URL, the web-service token, and the granted role
//! set. Tenants are immutable once resolved and live only inside session
//! entries; they are never persisted.
//! Security posture: the token is a credential and is redacted from Debug
//! output and audit events.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use crate::roles::Role;

// ============================================================================
// SECTION: Tenant Type
// ============================================================================

/// Resolved tenant identity for one gateway session.
///
/// # Invariants
/// - `roles` is non-empty; construction enforces this.
/// - Fields never change after construction.
#[derive(Clone, PartialEq, Eq)]
pub struct Tenant {
    /// Moodle site base URL.
    moodle_url: String,
    /// Moodle web-service token.
    moodle_token: String,
    /// Granted privilege tiers.
    roles: BTreeSet<Role>,
}

impl Tenant {
    /// Creates a tenant record. Returns `None` when the role set is empty.
    #[must_use]
    pub fn new(
        moodle_url: impl Into<String>,
        moodle_token: impl Into<String>,
        roles: BTreeSet<Role>,
    ) -> Option<Self> {
        if roles.is_empty() {
            return None;
        }
        Some(Self {
            moodle_url: moodle_url.into(),
            moodle_token: moodle_token.into(),
            roles,
        })
    }

    /// Returns the Moodle site base URL.
    #[must_use]
    pub fn moodle_url(&self) -> &str {
        &self.moodle_url
    }

    /// Returns the Moodle web-service token.
    #[must_use]
    pub fn moodle_token(&self) -> &str {
        &self.moodle_token
    }

    /// Returns the granted role set.
    #[must_use]
    pub const fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    /// Returns true when the tenant holds at least one of the given roles.
    #[must_use]
    pub fn holds_any(&self, allowed: &BTreeSet<Role>) -> bool {
        self.roles.iter().any(|role| allowed.contains(role))
    }
}

impl fmt::Debug for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tenant")
            .field("moodle_url", &self.moodle_url)
            .field("moodle_token", &"<redacted>")
            .field("roles", &self.roles)
            .finish()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

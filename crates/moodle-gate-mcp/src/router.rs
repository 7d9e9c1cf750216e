// crates/moodle-gate-mcp/src/router.rs
// ============================================================================
// Module: Dispatch Core
// Description: Role-gated, schema-checked tool invocation pipeline.
// Purpose: Order the checks between an inbound call and the remote API.
// Dependencies: moodle-gate-client, moodle-gate-core, serde_json, tokio-util
// ============================================================================

//! ## Overview
//! The dispatcher owns the invocation pipeline: tool lookup, role check,
//! input validation, the remote call, and output validation, strictly in
//! that order. Nothing reaches the network until the call is authorized and
//! its arguments are valid, and nothing reaches the caller until the remote
//! result passed the output schema. Listing is role-scoped: a session only
//! sees the tools its tenant may call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use moodle_gate_client::CallOptions;
use moodle_gate_client::MoodleClient;
use moodle_gate_core::GatewayError;
use moodle_gate_core::Tenant;
use moodle_gate_core::ToolDescriptor;
use moodle_gate_core::ToolRegistry;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::audit::GatewayAuditEvent;
use crate::audit::GatewayAuditSink;
use crate::format::format_violations;
use crate::validate::SchemaCompileError;
use crate::validate::SchemaSet;

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Role-gated dispatch pipeline shared by every session.
pub struct Dispatcher {
    /// Immutable tool catalogue.
    registry: Arc<ToolRegistry>,
    /// Compiled schema cache, one entry per tool.
    schemas: SchemaSet,
    /// Outbound Moodle client.
    client: MoodleClient,
    /// Audit sink for allow/deny decisions.
    audit: Arc<dyn GatewayAuditSink>,
}

impl Dispatcher {
    /// Builds a dispatcher, compiling every schema in the registry.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaCompileError`] when a catalogue schema is malformed.
    /// This is a fatal startup condition.
    pub fn new(
        registry: Arc<ToolRegistry>,
        client: MoodleClient,
        audit: Arc<dyn GatewayAuditSink>,
    ) -> Result<Self, SchemaCompileError> {
        let schemas = SchemaSet::compile(&registry)?;
        Ok(Self {
            registry,
            schemas,
            client,
            audit,
        })
    }

    /// Lists the tools visible to the tenant's role set.
    #[must_use]
    pub fn list_tools(&self, tenant: &Tenant) -> Vec<ToolDescriptor> {
        self.registry
            .visible_to(tenant.roles())
            .iter()
            .map(|spec| spec.descriptor())
            .collect()
    }

    /// Invokes one tool for a tenant.
    ///
    /// Pipeline order: lookup, role check, input validation, remote call,
    /// output validation. The remote call is never reached when an earlier
    /// stage fails.
    ///
    /// # Errors
    ///
    /// Returns the stage-specific [`GatewayError`]: `UnknownTool`,
    /// `RoleForbidden`, `Validation`, a remote failure, or
    /// `InvalidUpstreamResponse`.
    pub async fn call_tool(
        &self,
        tenant: &Tenant,
        session_id: Option<&str>,
        name: &str,
        arguments: &Value,
        cancel: Option<CancellationToken>,
    ) -> Result<Value, GatewayError> {
        let outcome = self.invoke(tenant, name, arguments, cancel).await;
        match &outcome {
            Ok(_) => self.audit.record(&GatewayAuditEvent::allowed(name, session_id)),
            Err(err) => self.audit.record(&GatewayAuditEvent::denied(name, session_id, err)),
        }
        outcome
    }

    /// Runs the pipeline without audit bookkeeping.
    async fn invoke(
        &self,
        tenant: &Tenant,
        name: &str,
        arguments: &Value,
        cancel: Option<CancellationToken>,
    ) -> Result<Value, GatewayError> {
        let spec = self
            .registry
            .lookup(name)
            .ok_or_else(|| GatewayError::UnknownTool(name.to_string()))?;

        if !tenant.holds_any(&spec.allowed_roles) {
            return Err(GatewayError::RoleForbidden(name.to_string()));
        }

        let input = self.schemas.check_input(name, arguments);
        if !input.ok {
            return Err(GatewayError::Validation(Box::new(format_violations(
                &spec,
                &input.violations,
            ))));
        }

        let result = self
            .client
            .call(tenant.moodle_url(), tenant.moodle_token(), spec.moodle_function, arguments,
                CallOptions {
                    method: spec.method,
                    cancel,
                    timeout_ms: None,
                })
            .await?;

        let output = self.schemas.check_output(name, &result);
        if !output.ok {
            return Err(GatewayError::InvalidUpstreamResponse(Box::new(format_violations(
                &spec,
                &output.violations,
            ))));
        }
        Ok(result)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

// crates/moodle-gate-core/src/lib.rs
// ============================================================================
// Module: Moodle Gate Core Library
// Description: Public API surface for the Moodle Gate core.
// Purpose: Expose role, tenant, tool, validation, and error types.
// Dependencies: crate::{error, roles, tenant, tools, validation}
// ============================================================================

//! ## Overview
//! Moodle Gate core holds the transport-agnostic data model of the gateway:
//! the closed role enumeration, the resolved tenant record, the immutable
//! tool registry, the validation data model, and the single error taxonomy
//! every other crate maps its failures into. It has no networking or
//! protocol dependencies and integrates through explicit types rather than
//! framework hooks.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod roles;
pub mod tenant;
pub mod tools;
pub mod validation;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::GatewayError;
pub use roles::Role;
pub use tenant::Tenant;
pub use tools::RegistryError;
pub use tools::RemoteMethod;
pub use tools::ToolDescriptor;
pub use tools::ToolExamples;
pub use tools::ToolRegistry;
pub use tools::ToolSpec;
pub use validation::FieldError;
pub use validation::FieldIssue;
pub use validation::VALIDATION_ERROR_MARKER;
pub use validation::ValidationErrorPayload;
pub use validation::ValidationOutcome;
pub use validation::Violation;
pub use validation::ViolationParams;

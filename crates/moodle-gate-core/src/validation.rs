// crates/moodle-gate-core/src/validation.rs
// ============================================================================
// Module: Validation Data Model
// Description: Validator outcomes and the structured error payload for callers.
// Purpose: Define the violation sequence and the agent-facing error payload.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The schema validator reports raw violations as an ordered sequence of
//! `{path, keyword, params}` records. The error formatter folds that
//! sequence into a single [`ValidationErrorPayload`] that a calling agent
//! can act on: which required fields are missing, which properties were
//! unexpected, per-field issues, and example argument objects for
//! self-correction. The payload is returned to the caller verbatim.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Validator Output
// ============================================================================

/// One raw schema violation reported by the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON pointer to the offending value, `""` for the root.
    pub path: String,
    /// Schema keyword that failed (`required`, `type`, `format`, ...).
    pub keyword: String,
    /// Keyword-specific detail (missing property name, expected type, ...).
    pub params: ViolationParams,
}

/// Keyword-specific violation detail.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViolationParams {
    /// Property named by a `required` violation.
    pub missing_property: Option<String>,
    /// Property named by an `additionalProperties` violation.
    pub unexpected_property: Option<String>,
    /// Expected value description for type/format/enum violations.
    pub expected: Option<String>,
}

/// Result of checking a value against a schema.
///
/// Transient; produced and consumed within a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// True when the value satisfied the schema.
    pub ok: bool,
    /// Ordered violation sequence; empty when `ok` is true.
    pub violations: Vec<Violation>,
}

impl ValidationOutcome {
    /// The successful outcome.
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            ok: true,
            violations: Vec::new(),
        }
    }

    /// A failed outcome carrying the given violations.
    #[must_use]
    pub const fn invalid(violations: Vec<Violation>) -> Self {
        Self {
            ok: false,
            violations,
        }
    }
}

// ============================================================================
// SECTION: Caller-Facing Payload
// ============================================================================

/// Issue classification for one field error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldIssue {
    /// A required property is absent.
    MissingRequired,
    /// A property outside the schema was supplied.
    UnexpectedProperty,
    /// The value has the wrong type or format.
    WrongType,
    /// Any other keyword failure; the raw keyword is carried in `details`.
    Other,
}

/// One formatted per-field error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// JSON pointer to the offending value.
    pub path: String,
    /// Issue classification.
    pub issue: FieldIssue,
    /// Expected value description, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Free-form detail, such as the raw schema keyword.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Structured validation failure returned to the calling agent.
///
/// # Invariants
/// - `missing_required` and `unexpected_properties` are deduplicated and
///   sorted.
/// - `field_errors` preserves validator order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorPayload {
    /// Fixed discriminator so agents can detect the payload shape.
    pub error: &'static str,
    /// Tool whose schema was violated.
    pub tool: String,
    /// One-line summary of the failure.
    pub message: String,
    /// Property names the schema accepts at the top level.
    pub allowed_properties: Vec<String>,
    /// Required properties that were absent.
    pub missing_required: Vec<String>,
    /// Supplied properties the schema does not accept.
    pub unexpected_properties: Vec<String>,
    /// Ordered per-field issues.
    pub field_errors: Vec<FieldError>,
    /// Smallest valid argument object, when the tool declares one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_arguments_minimal: Option<Value>,
    /// Representative argument object, when the tool declares one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_arguments_typical: Option<Value>,
}

/// Discriminator value carried in every [`ValidationErrorPayload`].
pub const VALIDATION_ERROR_MARKER: &str = "VALIDATION_ERROR";

// ============================================================================
// SECTION: Tests
// ============================================================================

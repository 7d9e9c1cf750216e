// crates/moodle-gate-mcp/src/format.rs
// ============================================================================
// Module: Error Formatter
// Description: Folds raw schema violations into the caller-facing payload.
// Purpose: Give calling agents enough structure to self-correct arguments.
// Dependencies: moodle-gate-core, serde_json
// ============================================================================

//! ## Overview
//! Raw validator output is noisy: the same missing property can surface
//! several times and unexpected-property reports arrive one keyword at a
//! time. The formatter deduplicates names, classifies each violation into a
//! small issue vocabulary, and attaches the tool's allowed properties and
//! example payloads so the agent can repair its call without a schema dump.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use moodle_gate_core::FieldError;
use moodle_gate_core::FieldIssue;
use moodle_gate_core::ToolSpec;
use moodle_gate_core::VALIDATION_ERROR_MARKER;
use moodle_gate_core::ValidationErrorPayload;
use moodle_gate_core::Violation;
use serde_json::Value;

// ============================================================================
// SECTION: Formatter
// ============================================================================

/// Folds violations into the structured payload returned to the caller.
#[must_use]
pub fn format_violations(spec: &ToolSpec, violations: &[Violation]) -> ValidationErrorPayload {
    let allowed_properties = top_level_properties(&spec.input_schema);
    let mut missing: BTreeSet<String> = BTreeSet::new();
    let mut unexpected: BTreeSet<String> = BTreeSet::new();
    let mut field_errors: Vec<FieldError> = Vec::new();

    for violation in violations {
        let error = classify(violation, &allowed_properties);
        if let Some(name) = &violation.params.missing_property {
            missing.insert(name.clone());
        }
        if let Some(name) = &violation.params.unexpected_property {
            unexpected.insert(name.clone());
        }
        if !field_errors.contains(&error) {
            field_errors.push(error);
        }
    }

    ValidationErrorPayload {
        error: VALIDATION_ERROR_MARKER,
        tool: spec.name.to_string(),
        message: summary(spec.name, &missing, &unexpected, &field_errors),
        allowed_properties,
        missing_required: missing.into_iter().collect(),
        unexpected_properties: unexpected.into_iter().collect(),
        field_errors,
        example_arguments_minimal: spec.examples.minimal.clone(),
        example_arguments_typical: spec.examples.typical.clone(),
    }
}

/// Classifies one violation into a field error.
fn classify(violation: &Violation, allowed: &[String]) -> FieldError {
    match violation.keyword.as_str() {
        "required" => FieldError {
            path: required_path(violation),
            issue: FieldIssue::MissingRequired,
            expected: None,
            details: None,
        },
        "additionalProperties" => FieldError {
            path: unexpected_path(violation),
            issue: FieldIssue::UnexpectedProperty,
            expected: Some(format!("only: {}", allowed.join(", "))),
            details: None,
        },
        "type" | "format" | "enum" | "pattern" | "minLength" | "maxLength" => FieldError {
            path: violation.path.clone(),
            issue: FieldIssue::WrongType,
            expected: violation.params.expected.clone(),
            details: Some(violation.keyword.clone()),
        },
        keyword => FieldError {
            path: violation.path.clone(),
            issue: FieldIssue::Other,
            expected: violation.params.expected.clone(),
            details: Some(keyword.to_string()),
        },
    }
}

/// Path for a missing-property error, pointing at the absent field.
fn required_path(violation: &Violation) -> String {
    violation.params.missing_property.as_ref().map_or_else(
        || violation.path.clone(),
        |name| format!("{}/{name}", violation.path),
    )
}

/// Path for an unexpected-property error, pointing at the offending field.
fn unexpected_path(violation: &Violation) -> String {
    violation.params.unexpected_property.as_ref().map_or_else(
        || violation.path.clone(),
        |name| format!("{}/{name}", violation.path),
    )
}

/// Builds the one-line summary for the payload.
fn summary(
    tool: &str,
    missing: &BTreeSet<String>,
    unexpected: &BTreeSet<String>,
    field_errors: &[FieldError],
) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing: {}", missing.iter().cloned().collect::<Vec<_>>().join(", ")));
    }
    if !unexpected.is_empty() {
        parts.push(format!(
            "unexpected: {}",
            unexpected.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    let other = field_errors
        .iter()
        .filter(|error| {
            !matches!(error.issue, FieldIssue::MissingRequired | FieldIssue::UnexpectedProperty)
        })
        .count();
    if other > 0 {
        parts.push(format!("{other} invalid value(s)"));
    }
    if parts.is_empty() {
        format!("Invalid arguments for {tool}")
    } else {
        format!("Invalid arguments for {tool}: {}", parts.join("; "))
    }
}

/// Reads the top-level property names from an object schema.
fn top_level_properties(schema: &Value) -> Vec<String> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

// crates/moodle-gate-mcp/src/validate.rs
// ============================================================================
// Module: Schema Validator
// Description: Compiled schema cache and structured violation reporting.
// Purpose: Check tool arguments and remote results against declared schemas.
// Dependencies: jsonschema, moodle-gate-core, serde_json
// ============================================================================

//! ## Overview
//! Each tool declares an input schema and an output schema. Both are
//! compiled exactly once, at catalogue construction, and cached by tool
//! name; a schema that fails to compile is a fatal startup error. Checks
//! return the full ordered violation sequence rather than a bare boolean so
//! the error formatter can build an actionable payload.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use jsonschema::Draft;
use jsonschema::Validator;
use jsonschema::error::ValidationErrorKind;
use moodle_gate_core::ToolRegistry;
use moodle_gate_core::ValidationOutcome;
use moodle_gate_core::Violation;
use moodle_gate_core::ViolationParams;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fatal schema compilation failure at catalogue construction.
#[derive(Debug, Error)]
#[error("schema for tool {tool} failed to compile: {detail}")]
pub struct SchemaCompileError {
    /// Tool whose schema is malformed.
    pub tool: String,
    /// Compiler diagnostic.
    pub detail: String,
}

// ============================================================================
// SECTION: Compiled Schema Set
// ============================================================================

/// Compiled input and output validators for one tool.
struct ToolValidators {
    /// Validator for the argument object.
    input: Validator,
    /// Validator for the remote result.
    output: Validator,
}

/// Compiled schema cache keyed by tool name.
///
/// # Invariants
/// - Holds exactly one entry per registered tool.
/// - Immutable after construction; safe for concurrent reads.
pub struct SchemaSet {
    /// Compiled validators per tool.
    validators: BTreeMap<String, ToolValidators>,
}

impl SchemaSet {
    /// Compiles every schema in the registry.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaCompileError`] on the first malformed schema. This is
    /// a fatal startup condition, never a runtime one.
    pub fn compile(registry: &ToolRegistry) -> Result<Self, SchemaCompileError> {
        let mut validators = BTreeMap::new();
        for spec in registry.iter() {
            let input = compile_schema(spec.name, &spec.input_schema)?;
            let output = compile_schema(spec.name, &spec.output_schema)?;
            validators.insert(spec.name.to_string(), ToolValidators {
                input,
                output,
            });
        }
        Ok(Self {
            validators,
        })
    }

    /// Checks tool arguments against the input schema.
    #[must_use]
    pub fn check_input(&self, tool: &str, value: &Value) -> ValidationOutcome {
        self.check(tool, value, true)
    }

    /// Checks a remote result against the output schema.
    #[must_use]
    pub fn check_output(&self, tool: &str, value: &Value) -> ValidationOutcome {
        self.check(tool, value, false)
    }

    /// Runs one compiled validator and collects ordered violations.
    fn check(&self, tool: &str, value: &Value, input: bool) -> ValidationOutcome {
        let Some(entry) = self.validators.get(tool) else {
            // Unregistered tools are caught by lookup before validation.
            return ValidationOutcome::invalid(vec![Violation {
                path: String::new(),
                keyword: "schema".to_string(),
                params: ViolationParams::default(),
            }]);
        };
        let validator = if input { &entry.input } else { &entry.output };
        if validator.is_valid(value) {
            return ValidationOutcome::valid();
        }
        let mut violations = Vec::new();
        for err in validator.iter_errors(value) {
            violations.extend(violations_from_error(&err.instance_path().to_string(), err.kind()));
        }
        ValidationOutcome::invalid(violations)
    }
}

/// Compiles one schema document under draft 2020-12 with format assertions.
fn compile_schema(tool: &str, schema: &Value) -> Result<Validator, SchemaCompileError> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .should_validate_formats(true)
        .build(schema)
        .map_err(|err| SchemaCompileError {
            tool: tool.to_string(),
            detail: err.to_string(),
        })
}

/// Translates one validator error into violation records.
fn violations_from_error(path: &str, kind: &ValidationErrorKind) -> Vec<Violation> {
    match kind {
        ValidationErrorKind::Required {
            property,
        } => {
            let name = property
                .as_str()
                .map_or_else(|| property.to_string(), ToString::to_string);
            vec![Violation {
                path: path.to_string(),
                keyword: "required".to_string(),
                params: ViolationParams {
                    missing_property: Some(name),
                    ..ViolationParams::default()
                },
            }]
        }
        ValidationErrorKind::AdditionalProperties {
            unexpected,
        } => unexpected
            .iter()
            .map(|name| Violation {
                path: path.to_string(),
                keyword: "additionalProperties".to_string(),
                params: ViolationParams {
                    unexpected_property: Some(name.clone()),
                    ..ViolationParams::default()
                },
            })
            .collect(),
        ValidationErrorKind::Type {
            ..
        } => vec![Violation {
            path: path.to_string(),
            keyword: "type".to_string(),
            params: ViolationParams::default(),
        }],
        ValidationErrorKind::Format {
            format,
        } => vec![Violation {
            path: path.to_string(),
            keyword: "format".to_string(),
            params: ViolationParams {
                expected: Some(format.to_string()),
                ..ViolationParams::default()
            },
        }],
        ValidationErrorKind::Enum {
            ..
        } => vec![Violation {
            path: path.to_string(),
            keyword: "enum".to_string(),
            params: ViolationParams::default(),
        }],
        ValidationErrorKind::Pattern {
            ..
        } => vec![Violation {
            path: path.to_string(),
            keyword: "pattern".to_string(),
            params: ViolationParams::default(),
        }],
        ValidationErrorKind::MinLength {
            ..
        } => vec![Violation {
            path: path.to_string(),
            keyword: "minLength".to_string(),
            params: ViolationParams::default(),
        }],
        ValidationErrorKind::MaxLength {
            ..
        } => vec![Violation {
            path: path.to_string(),
            keyword: "maxLength".to_string(),
            params: ViolationParams::default(),
        }],
        ValidationErrorKind::MinItems {
            ..
        } => vec![Violation {
            path: path.to_string(),
            keyword: "minItems".to_string(),
            params: ViolationParams::default(),
        }],
        _ => vec![Violation {
            path: path.to_string(),
            keyword: "schema".to_string(),
            params: ViolationParams::default(),
        }],
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

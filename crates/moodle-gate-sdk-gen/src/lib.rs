// crates/moodle-gate-sdk-gen/src/lib.rs
// ============================================================================
// Module: Service Definition Generator
// Description: Deterministic per-tier service artifacts for Moodle.
// Purpose: Expand tool allow-lists into tiered Moodle service definitions.
// Dependencies: moodle-gate-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Moodle restricts each web-service token to the functions its service
//! definition lists. This crate derives those definitions from the in-memory
//! tool registry, so the artifact can never drift from what the gateway
//! actually dispatches. Allow-lists are expanded by privilege: a function
//! granted to a role is reachable from every higher tier, so the `admin`
//! service is always a superset of `user`.
//!
//! ### Design Notes
//! - Output is deterministic: tiers render in descending privilege order and
//!   function names are sorted within each tier.
//! - Two artifacts are produced from the same expansion: a JSON mapping for
//!   tooling and a PHP definitions file for the Moodle local plugin.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use moodle_gate_core::Role;
use moodle_gate_core::ToolRegistry;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Public API
// ============================================================================

/// Prefix of every generated Moodle service shortname.
pub const SERVICE_PREFIX: &str = "moodlemcp";
/// Filename of the generated JSON artifact.
pub const JSON_ARTIFACT: &str = "services.json";
/// Filename of the generated PHP artifact.
pub const PHP_ARTIFACT: &str = "service_functions.php";

/// Errors raised by the generator.
#[derive(Debug, Error)]
pub enum SdkGenError {
    /// IO error while writing artifacts.
    #[error("io error: {0}")]
    Io(String),
    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(String),
}

/// Expands the registry into the per-tier function sets.
///
/// A tier's set holds every function whose allow-list contains that tier or
/// any lower one, so higher tiers are supersets of lower ones.
#[must_use]
pub fn tier_functions(registry: &ToolRegistry) -> BTreeMap<Role, BTreeSet<String>> {
    let mut tiers: BTreeMap<Role, BTreeSet<String>> = Role::ALL
        .into_iter()
        .map(|role| (role, BTreeSet::new()))
        .collect();
    for spec in registry.iter() {
        for granted in &spec.allowed_roles {
            for (tier, functions) in &mut tiers {
                if tier.outranks_or_equals(*granted) {
                    functions.insert(spec.moodle_function.to_string());
                }
            }
        }
    }
    tiers
}

/// Returns the service shortname for a tier.
#[must_use]
pub fn service_name(role: Role) -> String {
    format!("{SERVICE_PREFIX}_{role}")
}

/// Renders the JSON artifact mapping each service to its function list.
///
/// # Errors
///
/// Returns [`SdkGenError::Json`] when serialization fails.
pub fn generate_json(registry: &ToolRegistry) -> Result<String, SdkGenError> {
    let mut services = Map::new();
    for (tier, functions) in tier_functions(registry) {
        let names: Vec<Value> =
            functions.into_iter().map(Value::String).collect();
        services.insert(service_name(tier), Value::Array(names));
    }
    let mut rendered = serde_json::to_string_pretty(&Value::Object(services))
        .map_err(|err| SdkGenError::Json(err.to_string()))?;
    rendered.push('\n');
    Ok(rendered)
}

/// Renders the PHP definitions file consumed by the Moodle local plugin.
#[must_use]
pub fn generate_php(registry: &ToolRegistry) -> String {
    let mut out = String::new();
    out.push_str("<?php\n");
    out.push_str("// Auto-generated service definitions. Do not edit.\n");
    out.push('\n');
    out.push_str("defined('MOODLE_INTERNAL') || die();\n");
    out.push('\n');
    out.push_str("function local_moodlemcp_get_service_definitions(): array {\n");
    out.push_str("    return [\n");
    for (tier, functions) in tier_functions(registry) {
        let name = service_name(tier);
        let _ = writeln!(out, "        '{name}' => [");
        out.push_str("            'functions' => [\n");
        for function in &functions {
            let _ = writeln!(out, "                '{function}',");
        }
        out.push_str("            ],\n");
        out.push_str("            'restrictedusers' => 1,\n");
        out.push_str("            'enabled' => 1,\n");
        let _ = writeln!(out, "            'shortname' => '{name}',");
        out.push_str("        ],\n");
    }
    out.push_str("    ];\n");
    out.push_str("}\n");
    out
}

/// Writes both artifacts into a directory.
///
/// # Errors
///
/// Returns [`SdkGenError`] when rendering or writing fails.
pub fn write_artifacts(registry: &ToolRegistry, dir: &Path) -> Result<(), SdkGenError> {
    fs::create_dir_all(dir).map_err(|err| SdkGenError::Io(err.to_string()))?;
    fs::write(dir.join(JSON_ARTIFACT), generate_json(registry)?)
        .map_err(|err| SdkGenError::Io(err.to_string()))?;
    fs::write(dir.join(PHP_ARTIFACT), generate_php(registry))
        .map_err(|err| SdkGenError::Io(err.to_string()))?;
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

// crates/moodle-gate-core/src/tools.rs
// ============================================================================
// Module: Tool Registry
// Description: Immutable catalogue of callable tools with role allow-lists.
// Purpose: Provide lookup, role gating, and role-scoped views over tools.
// Dependencies: serde, serde_json, crate::roles
// ============================================================================

//! ## Overview
//! Every gateway tool is a declarative record mapping one tool name to one
//! Moodle web-service function, with JSON schemas for both directions and a
//! non-empty role allow-list. The registry is built once at startup from the
//! static catalogue, rejects duplicate names, and is read-only afterwards,
//! so any number of sessions may consult it concurrently without locking.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::roles::Role;

// ============================================================================
// SECTION: Tool Specification
// ============================================================================

/// HTTP method used when forwarding a tool call to Moodle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoteMethod {
    /// Query-string request (Moodle default).
    #[default]
    Get,
    /// Url-encoded form body; used for mutating functions.
    Post,
}

/// Example argument payloads attached to a tool for self-correction hints.
///
/// # Invariants
/// - `minimal` satisfies the tool's input schema; `typical` does when present.
#[derive(Debug, Clone, Default)]
pub struct ToolExamples {
    /// Smallest valid argument object.
    pub minimal: Option<Value>,
    /// Representative argument object with optional fields.
    pub typical: Option<Value>,
}

/// Declarative specification of one callable tool.
///
/// # Invariants
/// - `name` is unique across the registry.
/// - `allowed_roles` is a non-empty subset of the role enumeration.
/// - Schemas are valid JSON Schema documents; compilation failures are fatal
///   at startup, not runtime conditions.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Unique tool name exposed to callers.
    pub name: &'static str,
    /// Moodle web-service function invoked by this tool.
    pub moodle_function: &'static str,
    /// Human-readable description for tool listings.
    pub description: &'static str,
    /// JSON schema for the argument object.
    pub input_schema: Value,
    /// JSON schema for the Moodle response.
    pub output_schema: Value,
    /// Roles permitted to invoke the tool.
    pub allowed_roles: BTreeSet<Role>,
    /// HTTP method used for the remote call.
    pub method: RemoteMethod,
    /// Example argument payloads.
    pub examples: ToolExamples,
}

/// Wire-form tool descriptor for `tools/list` responses.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON schema for the argument object.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolSpec {
    /// Returns the wire-form descriptor for this tool.
    #[must_use]
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.to_string(),
            description: self.description.to_string(),
            input_schema: self.input_schema.clone(),
        }
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Errors raised while constructing the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two tools share a name; the catalogue is malformed.
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),
    /// A tool declared an empty role allow-list.
    #[error("tool {0} has an empty role allow-list")]
    EmptyAllowList(String),
}

/// Immutable catalogue of callable tools.
///
/// # Invariants
/// - Tool names are unique.
/// - Safe for concurrent read access; never mutated after construction.
pub struct ToolRegistry {
    /// Tools keyed by name.
    tools: BTreeMap<&'static str, Arc<ToolSpec>>,
}

impl ToolRegistry {
    /// Builds a registry from a tool catalogue.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when two tools share a name or a tool has an
    /// empty allow-list. Both are fatal startup conditions.
    pub fn register(specs: Vec<ToolSpec>) -> Result<Self, RegistryError> {
        let mut tools = BTreeMap::new();
        for spec in specs {
            if spec.allowed_roles.is_empty() {
                return Err(RegistryError::EmptyAllowList(spec.name.to_string()));
            }
            let name = spec.name;
            if tools.insert(name, Arc::new(spec)).is_some() {
                return Err(RegistryError::DuplicateTool(name.to_string()));
            }
        }
        Ok(Self {
            tools,
        })
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<ToolSpec>> {
        self.tools.get(name).cloned()
    }

    /// Returns the allow-list for a tool, or `None` when the tool is absent.
    #[must_use]
    pub fn roles_for(&self, name: &str) -> Option<&BTreeSet<Role>> {
        self.tools.get(name).map(|spec| &spec.allowed_roles)
    }

    /// Returns the tools visible to a tenant holding the given role set,
    /// in registry order.
    #[must_use]
    pub fn visible_to(&self, roles: &BTreeSet<Role>) -> Vec<Arc<ToolSpec>> {
        self.tools
            .values()
            .filter(|spec| spec.allowed_roles.iter().any(|role| roles.contains(role)))
            .cloned()
            .collect()
    }

    /// Iterates over every registered tool in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ToolSpec>> {
        self.tools.values()
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true when the registry holds no tools.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use std::collections::BTreeSet;

    use serde_json::json;

    use super::RegistryError;
    use super::RemoteMethod;
    use super::ToolExamples;
    use super::ToolRegistry;
    use super::ToolSpec;
    use crate::roles::Role;

    /// Builds a minimal tool spec with the given name and allow-list.
    fn spec(name: &'static str, allowed: &[Role]) -> ToolSpec {
        ToolSpec {
            name,
            moodle_function: name,
            description: "test tool",
            input_schema: json!({"type": "object", "additionalProperties": false}),
            output_schema: json!({"type": "object"}),
            allowed_roles: allowed.iter().copied().collect(),
            method: RemoteMethod::Get,
            examples: ToolExamples::default(),
        }
    }

    #[test]
    fn duplicate_names_fail_registration() {
        let result = ToolRegistry::register(vec![
            spec("core_course_get_courses", &[Role::Admin]),
            spec("core_course_get_courses", &[Role::Manager]),
        ]);
        assert!(matches!(result, Err(RegistryError::DuplicateTool(name)) if name == "core_course_get_courses"));
    }

    #[test]
    fn empty_allow_list_fails_registration() {
        let result = ToolRegistry::register(vec![spec("core_course_get_courses", &[])]);
        assert!(matches!(result, Err(RegistryError::EmptyAllowList(_))));
    }

    #[test]
    fn lookup_and_roles_for_round_trip() {
        let registry = ToolRegistry::register(vec![spec("a_tool", &[Role::Admin])]).unwrap();
        assert!(registry.lookup("a_tool").is_some());
        assert!(registry.lookup("missing").is_none());
        let allowed: BTreeSet<Role> = [Role::Admin].into_iter().collect();
        assert_eq!(registry.roles_for("a_tool"), Some(&allowed));
        assert_eq!(registry.roles_for("missing"), None);
    }

    #[test]
    fn visible_to_filters_by_role_intersection() {
        let registry = ToolRegistry::register(vec![
            spec("admin_only", &[Role::Admin]),
            spec("teacher_plus", &[Role::Admin, Role::Teacher]),
        ])
        .unwrap();

        let teacher: BTreeSet<Role> = [Role::Teacher].into_iter().collect();
        let visible = registry.visible_to(&teacher);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "teacher_plus");

        let admin: BTreeSet<Role> = [Role::Admin].into_iter().collect();
        assert_eq!(registry.visible_to(&admin).len(), 2);
    }
}

// crates/moodle-gate-core/src/roles.rs
// ============================================================================
// Module: Role Enumeration
// Description: Closed privilege enumeration for Moodle Gate tenants and tools.
// Purpose: Provide a strongly typed role tier with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Roles form a closed, totally ordered privilege enumeration. Every tool's
//! allow-list and every resolved tenant's role set is a subset of this
//! enumeration; anything outside it is rejected at the resolution boundary.
//! Security posture: role strings from the control plane are untrusted and
//! must pass [`Role::parse`] before entering the gateway.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Role Type
// ============================================================================

/// Privilege tier for a tenant or tool allow-list.
///
/// # Invariants
/// - Ordering is by privilege: `Admin` is the highest tier, `User` the lowest.
/// - Wire form is the lowercase Moodle shortname (`"editingteacher"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Site administrator.
    Admin,
    /// Course-category manager.
    Manager,
    /// Teacher with course editing rights.
    #[serde(rename = "editingteacher")]
    EditingTeacher,
    /// Non-editing teacher.
    Teacher,
    /// Enrolled student.
    Student,
    /// Authenticated user without course-level privileges.
    User,
}

impl Role {
    /// All roles in descending privilege order.
    pub const ALL: [Self; 6] =
        [Self::Admin, Self::Manager, Self::EditingTeacher, Self::Teacher, Self::Student, Self::User];

    /// Parses a role shortname, returning `None` for anything outside the enumeration.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "editingteacher" => Some(Self::EditingTeacher),
            "teacher" => Some(Self::Teacher),
            "student" => Some(Self::Student),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    /// Returns the stable Moodle shortname for the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::EditingTeacher => "editingteacher",
            Self::Teacher => "teacher",
            Self::Student => "student",
            Self::User => "user",
        }
    }

    /// Returns true when `self` is at least as privileged as `other`.
    ///
    /// `Admin` outranks every tier; `User` outranks none but itself.
    #[must_use]
    pub fn outranks_or_equals(self, other: Self) -> bool {
        self <= other
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

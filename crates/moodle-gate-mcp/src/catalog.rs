// crates/moodle-gate-mcp/src/catalog.rs
// ============================================================================
// Module: Tool Catalogue
// Description: Static declarations of the built-in Moodle tools.
// Purpose: Declare name, schemas, allow-list, and method for each tool.
// Dependencies: moodle-gate-core, serde_json
// ============================================================================

//! ## Overview
//! The catalogue is the single place a tool is declared: its Moodle
//! function, both schemas, the role allow-list, the HTTP method, and
//! example arguments. The registry and the compiled schema cache are both
//! built from this list at startup. Read tools default to GET; mutating
//! functions go over POST so argument size is not bounded by the query
//! string.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use moodle_gate_core::RemoteMethod;
use moodle_gate_core::Role;
use moodle_gate_core::ToolExamples;
use moodle_gate_core::ToolSpec;
use serde_json::json;

// ============================================================================
// SECTION: Catalogue
// ============================================================================

/// Builds a role set from a slice.
fn roles(list: &[Role]) -> BTreeSet<Role> {
    list.iter().copied().collect()
}

/// Returns the built-in tool catalogue.
#[must_use]
pub fn builtin_tools() -> Vec<ToolSpec> {
    vec![
        site_info(),
        get_courses(),
        users_courses(),
        calendar_events(),
        create_users(),
        delete_users(),
    ]
}

/// Site metadata probe, available to every tier.
fn site_info() -> ToolSpec {
    ToolSpec {
        name: "core_webservice_get_site_info",
        moodle_function: "core_webservice_get_site_info",
        description: "Return site metadata and the capabilities of the service account.",
        input_schema: json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
        output_schema: json!({
            "type": "object",
            "properties": {
                "sitename": {"type": "string"},
                "username": {"type": "string"},
                "userid": {"type": "integer"},
                "siteurl": {"type": "string"},
                "release": {"type": "string"}
            },
            "required": ["sitename", "username"]
        }),
        allowed_roles: roles(&Role::ALL),
        method: RemoteMethod::Get,
        examples: ToolExamples {
            minimal: Some(json!({})),
            typical: None,
        },
    }
}

/// Course listing, restricted to administrative tiers.
fn get_courses() -> ToolSpec {
    ToolSpec {
        name: "core_course_get_courses",
        moodle_function: "core_course_get_courses",
        description: "List courses by id, or every course when no ids are given.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "options": {
                    "type": "object",
                    "properties": {
                        "ids": {
                            "type": "array",
                            "items": {"type": "integer"}
                        }
                    },
                    "additionalProperties": false
                }
            },
            "additionalProperties": false
        }),
        output_schema: json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "id": {"type": "integer"},
                    "shortname": {"type": "string"},
                    "fullname": {"type": "string"}
                },
                "required": ["id", "shortname", "fullname"]
            }
        }),
        allowed_roles: roles(&[Role::Admin, Role::Manager]),
        method: RemoteMethod::Get,
        examples: ToolExamples {
            minimal: Some(json!({})),
            typical: Some(json!({"options": {"ids": [2, 7]}})),
        },
    }
}

/// Per-user course enrolment listing.
fn users_courses() -> ToolSpec {
    ToolSpec {
        name: "core_enrol_get_users_courses",
        moodle_function: "core_enrol_get_users_courses",
        description: "List the courses a user is enrolled in.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "userid": {"type": "integer", "minimum": 1},
                "returnusercount": {"type": "integer", "enum": [0, 1]}
            },
            "required": ["userid"],
            "additionalProperties": false
        }),
        output_schema: json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "id": {"type": "integer"},
                    "shortname": {"type": "string"},
                    "fullname": {"type": "string"}
                },
                "required": ["id"]
            }
        }),
        allowed_roles: roles(&[
            Role::Admin,
            Role::Manager,
            Role::EditingTeacher,
            Role::Teacher,
            Role::Student,
        ]),
        method: RemoteMethod::Get,
        examples: ToolExamples {
            minimal: Some(json!({"userid": 5})),
            typical: Some(json!({"userid": 5, "returnusercount": 1})),
        },
    }
}

/// Calendar event listing, available to every enrolled tier.
fn calendar_events() -> ToolSpec {
    ToolSpec {
        name: "core_calendar_get_calendar_events",
        moodle_function: "core_calendar_get_calendar_events",
        description: "List calendar events, optionally filtered by event, course, or group ids.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "events": {
                    "type": "object",
                    "properties": {
                        "eventids": {"type": "array", "items": {"type": "integer"}},
                        "courseids": {"type": "array", "items": {"type": "integer"}},
                        "groupids": {"type": "array", "items": {"type": "integer"}}
                    },
                    "additionalProperties": false
                },
                "options": {
                    "type": "object",
                    "properties": {
                        "userevents": {"type": "integer", "enum": [0, 1]},
                        "siteevents": {"type": "integer", "enum": [0, 1]},
                        "timestart": {"type": "integer"},
                        "timeend": {"type": "integer"},
                        "ignorehidden": {"type": "integer", "enum": [0, 1]}
                    },
                    "additionalProperties": false
                }
            },
            "additionalProperties": false
        }),
        output_schema: json!({
            "type": "object",
            "properties": {
                "events": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "integer"},
                            "name": {"type": "string"},
                            "eventtype": {"type": "string"},
                            "courseid": {"type": "integer"},
                            "timestart": {"type": "integer"},
                            "timeduration": {"type": "integer"}
                        },
                        "required": ["id", "name"]
                    }
                },
                "warnings": {"type": "array"}
            },
            "required": ["events"]
        }),
        allowed_roles: roles(&[
            Role::Admin,
            Role::Manager,
            Role::EditingTeacher,
            Role::Teacher,
            Role::Student,
        ]),
        method: RemoteMethod::Get,
        examples: ToolExamples {
            minimal: Some(json!({})),
            typical: Some(json!({
                "events": {"courseids": [2]},
                "options": {"timestart": 1_704_067_200, "timeend": 1_706_745_600}
            })),
        },
    }
}

/// User creation; mutating, administrative tiers only.
fn create_users() -> ToolSpec {
    ToolSpec {
        name: "core_user_create_users",
        moodle_function: "core_user_create_users",
        description: "Create user accounts.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "users": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "username": {"type": "string", "pattern": "^\\S+$"},
                            "password": {"type": "string"},
                            "createpassword": {"type": "integer", "enum": [0, 1]},
                            "firstname": {"type": "string", "minLength": 1},
                            "lastname": {"type": "string", "minLength": 1},
                            "email": {"type": "string", "format": "email"},
                            "auth": {"type": "string"},
                            "idnumber": {"type": "string"},
                            "lang": {"type": "string"},
                            "timezone": {"type": "string"},
                            "mailformat": {"type": "integer", "enum": [0, 1]},
                            "maildisplay": {"type": "integer", "enum": [0, 1]},
                            "city": {"type": "string"},
                            "country": {"type": "string", "minLength": 2, "maxLength": 2},
                            "description": {"type": "string"},
                            "customfields": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "type": {"type": "string"},
                                        "value": {"type": "string"}
                                    },
                                    "required": ["type", "value"],
                                    "additionalProperties": false
                                }
                            },
                            "preferences": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "type": {"type": "string"},
                                        "value": {"type": "string"}
                                    },
                                    "required": ["type", "value"],
                                    "additionalProperties": false
                                }
                            }
                        },
                        "required": ["username", "firstname", "lastname", "email"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["users"],
            "additionalProperties": false
        }),
        output_schema: json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "id": {"type": "integer"},
                    "username": {"type": "string"}
                },
                "required": ["id", "username"]
            }
        }),
        allowed_roles: roles(&[Role::Admin, Role::Manager]),
        method: RemoteMethod::Post,
        examples: ToolExamples {
            minimal: Some(json!({
                "users": [{
                    "username": "jdoe",
                    "firstname": "John",
                    "lastname": "Doe",
                    "email": "jdoe@example.com"
                }]
            })),
            typical: Some(json!({
                "users": [{
                    "username": "jdoe",
                    "createpassword": 1,
                    "firstname": "John",
                    "lastname": "Doe",
                    "email": "jdoe@example.com",
                    "city": "Madrid",
                    "country": "ES",
                    "maildisplay": 0
                }]
            })),
        },
    }
}

/// User deletion; mutating, administrative tiers only.
fn delete_users() -> ToolSpec {
    ToolSpec {
        name: "core_user_delete_users",
        moodle_function: "core_user_delete_users",
        description: "Delete user accounts by id.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "userids": {
                    "type": "array",
                    "minItems": 1,
                    "items": {"type": "integer", "minimum": 1}
                }
            },
            "required": ["userids"],
            "additionalProperties": false
        }),
        // Moodle reports success as a bare boolean or a warnings object.
        output_schema: json!({
            "anyOf": [
                {"type": "boolean"},
                {"type": "object"},
                {"type": "null"}
            ]
        }),
        allowed_roles: roles(&[Role::Admin, Role::Manager]),
        method: RemoteMethod::Post,
        examples: ToolExamples {
            minimal: Some(json!({"userids": [42]})),
            typical: None,
        },
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

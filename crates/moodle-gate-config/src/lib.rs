// crates/moodle-gate-config/src/lib.rs
// ============================================================================
// Module: Moodle Gate Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for moodle-gate.toml semantics.
// Dependencies: serde, toml, url
// ============================================================================

//! ## Overview
//! `moodle-gate-config` defines the canonical configuration model for the
//! gateway. It provides strict, fail-closed validation: the gateway refuses
//! to start with a malformed file rather than guessing defaults for
//! security-relevant settings.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;

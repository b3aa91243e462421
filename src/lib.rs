//! `Quartermaster` - a Discord bot for guild supply management
//!
//! This crate provides a community-management bot whose commands and
//! scheduled tasks are loaded from definition files on disk and hot-reloaded
//! on change, with a process-wide reload lock that gates interaction
//! dispatch and a recovery buffer that preserves in-flight modal submissions
//! across reload windows.

// Deny the most critical lints that could lead to bugs or security issues
#![deny(
    // Security and correctness
    unsafe_code,
    unsafe_op_in_unsafe_fn,

    // Code quality - things that are almost always bugs
    unreachable_code,
    unreachable_patterns,
    unused_must_use,

    // Documentation - broken links are bugs
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links,
)]
// Warn on things that should be fixed but aren't necessarily bugs
#![warn(
    // Clippy categories for overall code quality
    clippy::all,

    // Performance
    clippy::inefficient_to_string,
    clippy::needless_pass_by_value,

    // Correctness
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::exit,
    clippy::float_cmp,
    clippy::todo,
    clippy::unimplemented,

    // Complexity and readability
    clippy::cognitive_complexity,
    clippy::large_enum_variant,
    clippy::match_same_arms,

    // Future compatibility
    future_incompatible,
    rust_2018_idioms,
)]
#![allow(
    clippy::module_name_repetitions,  // Common pattern in Rust
)]

/// TOML application configuration loading
pub mod config;
/// The injected application context: lock flag, registries, collaborators
pub mod context;
/// Database pool, schema, and the narrow row-CRUD surface
pub mod db;
/// Discord interface - serenity client, event handler, capability impls
pub mod discord;
/// Unified error types and result handling
pub mod errors;
/// The interaction gate: lock checks, routing, error containment
pub mod gate;
/// Built-in command and task entry points and their lookup tables
pub mod handlers;
/// Versioned correlation identifiers for buttons, menus, and modals
pub mod ids;
/// Platform capability traits and the normalized interaction model
pub mod platform;
/// Modal recovery buffering across reload windows
pub mod recovery;
/// Hot-reloadable command and task catalogs
pub mod registry;
/// File watching and the reload controller
pub mod reload;
/// The clock utility and the periodic task runner
pub mod schedule;

#[cfg(test)]
pub mod test_utils;

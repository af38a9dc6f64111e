//! Plugins shipped with the core.

pub mod admin;

//! Subcommand implementations.

pub mod consume;
pub mod validate;

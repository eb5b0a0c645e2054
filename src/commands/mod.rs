//! Subcommand implementations

pub mod lock;
pub mod sync;

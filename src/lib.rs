//! # lockstep - one fact table, every file in step
//!
//! Declare each version or shared fact once, say where it appears and in
//! what surrounding text, and let `check` find drift or `fix` rewrite it.
//! Only the value between two capture groups is ever touched; every other
//! byte of a file is preserved.

// Module declarations
pub mod commands;
pub mod config;
pub mod executor;
pub mod hash;
pub mod logging;
pub mod matcher;
pub mod scanner;
pub mod types;
pub mod ui;

// Re-export commonly used types
pub use config::Config;
pub use types::{ConfigError, LockError, LockTable, Mode, Report, RuleSet};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Glob parsing and file resolution

mod glob;
mod walker;

pub use glob::{GlobPattern, Segment};
pub use walker::{resolve_glob, IGNORE_FILE_NAME};

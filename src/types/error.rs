//! Error types for lockstep

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Problems found while loading the declarative specification.
///
/// Every variant is fatal: the run stops before any target file is read.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No specification file given and none of the default names exist
    #[error("No lock specification found under {root} (looked for {candidates})")]
    NotFound { root: PathBuf, candidates: String },

    /// Specification file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Extension does not map to a supported format
    #[error("Unsupported specification format for {path} (expected .yml, .yaml or .toml)")]
    UnsupportedFormat { path: PathBuf },

    /// YAML/TOML syntax or shape error
    #[error("Failed to parse {format} specification: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    /// Same key declared twice within one section
    #[error("Duplicate entry '{key}' in {section}")]
    DuplicateEntry { section: String, key: String },

    /// Two line rules own the same (glob, pattern) pair
    #[error("Duplicate rule: pattern '{pattern}' is declared more than once for glob '{glob}'")]
    DuplicateRule { glob: String, pattern: String },

    /// Regex failed to compile
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Regex does not have exactly a prefix and a suffix group
    #[error("Pattern '{pattern}' must have exactly 2 capture groups, found {found}")]
    CaptureGroups { pattern: String, found: usize },

    /// Glob failed to compile
    #[error("Invalid glob '{glob}': {reason}")]
    InvalidGlob { glob: String, reason: String },

    /// Line rule refers to a key missing from the lock table
    #[error("Unknown lock key '{key}' referenced by pattern '{pattern}' under '{glob}'")]
    UnknownKey {
        glob: String,
        pattern: String,
        key: String,
    },

    /// Copy rule path is not usable as a plain relative file path
    #[error("Malformed path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },

    /// Copy rules whose destinations overwrite or feed each other
    #[error("Conflicting copy rules for '{path}': {reason}")]
    CopyConflict { path: String, reason: String },

    /// Lock value type that has no canonical text form
    #[error("Lock value for '{key}' must be a string, integer or boolean")]
    UnsupportedValue { key: String },

    /// Invalid runtime option
    #[error("{0}")]
    Invalid(String),
}

/// Error types for lockstep operations
#[derive(Debug, Error)]
pub enum LockError {
    /// Standard IO error (automatically converted via #[from])
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid specification or runtime configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A literal path rule names a file that does not exist
    #[error("Path does not exist: {path}")]
    GlobResolution { path: PathBuf },

    /// A wildcard glob matched nothing
    #[error("Glob '{glob}' matched no files")]
    ZeroMatchFiles { glob: String },

    /// The rule found no match site in the file
    #[error("Pattern '{pattern}' not found")]
    PatternNotFound { pattern: String },

    /// The rule matched more than once in the file
    #[error("Pattern '{pattern}' matched {count} times (lines {lines:?})")]
    AmbiguousMatch {
        pattern: String,
        count: usize,
        lines: Vec<usize>,
    },

    /// A capture group did not participate, or the groups overlap
    #[error("Pattern '{pattern}' matched but its capture groups do not bracket a hole")]
    UnboundedHole { pattern: String },

    /// Writing the value would not read back as the same value
    #[error("Pattern '{pattern}' would not read back '{key}' after rewriting")]
    NonConvergent { pattern: String, key: String },

    /// Copy rule source could not be read
    #[error("Copy source unreadable: {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file is both a copy destination and a line rule target
    #[error("Written by copy rule '{copy}' and line rule '{line}'; neither is applied")]
    RuleConflict { copy: String, line: String },

    /// Permission denied for specific path
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Skipped because the run was interrupted
    #[error("Interrupted before this file was processed")]
    Interrupted,

    /// Worker pool or task failure
    #[error("Worker pool failure: {0}")]
    Pool(String),

    /// Report could not be serialized
    #[error("Failed to render report: {0}")]
    Render(#[from] serde_json::Error),
}

/// Stable classification of a [`LockError`], used for grouping and JSON output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Io,
    Config,
    GlobResolution,
    ZeroMatchFiles,
    PatternNotFound,
    AmbiguousMatch,
    UnboundedHole,
    NonConvergent,
    SourceUnreadable,
    RuleConflict,
    PermissionDenied,
    Interrupted,
    Pool,
    Render,
}

impl ErrorKind {
    /// Human label used in report headings
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Io => "I/O error",
            ErrorKind::Config => "Configuration error",
            ErrorKind::GlobResolution => "Missing path",
            ErrorKind::ZeroMatchFiles => "Empty glob",
            ErrorKind::PatternNotFound => "Pattern not found",
            ErrorKind::AmbiguousMatch => "Ambiguous match",
            ErrorKind::UnboundedHole => "Unbounded hole",
            ErrorKind::NonConvergent => "Non-convergent rewrite",
            ErrorKind::SourceUnreadable => "Unreadable copy source",
            ErrorKind::RuleConflict => "Conflicting rules",
            ErrorKind::PermissionDenied => "Permission denied",
            ErrorKind::Interrupted => "Interrupted",
            ErrorKind::Pool => "Worker failure",
            ErrorKind::Render => "Render failure",
        }
    }
}

impl LockError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LockError::Io(_) => ErrorKind::Io,
            LockError::Config(_) => ErrorKind::Config,
            LockError::GlobResolution { .. } => ErrorKind::GlobResolution,
            LockError::ZeroMatchFiles { .. } => ErrorKind::ZeroMatchFiles,
            LockError::PatternNotFound { .. } => ErrorKind::PatternNotFound,
            LockError::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            LockError::UnboundedHole { .. } => ErrorKind::UnboundedHole,
            LockError::NonConvergent { .. } => ErrorKind::NonConvergent,
            LockError::SourceUnreadable { .. } => ErrorKind::SourceUnreadable,
            LockError::RuleConflict { .. } => ErrorKind::RuleConflict,
            LockError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            LockError::Interrupted => ErrorKind::Interrupted,
            LockError::Pool(_) => ErrorKind::Pool,
            LockError::Render(_) => ErrorKind::Render,
        }
    }

    /// Fatal errors abort the whole run before anything is touched
    pub fn is_fatal(&self) -> bool {
        matches!(self, LockError::Config(_))
    }

    /// Warnings never fail a run unless strict mode promotes them
    pub fn is_warning(&self) -> bool {
        matches!(self, LockError::ZeroMatchFiles { .. })
    }

    /// Map an IO error on `path`, singling out permission problems
    pub fn from_io(path: &std::path::Path, error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::PermissionDenied {
            LockError::PermissionDenied {
                path: path.to_path_buf(),
            }
        } else {
            LockError::Io(error)
        }
    }
}

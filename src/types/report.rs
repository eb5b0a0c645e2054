//! Report records produced by a check or fix run

use super::{ErrorKind, LockError};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Run mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Compare only, never write
    Check,

    /// Rewrite drifted holes and copies
    Fix,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Check => f.write_str("check"),
            Mode::Fix => f.write_str("fix"),
        }
    }
}

/// Where in a file a record applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "line", rename_all = "snake_case")]
pub enum Location {
    /// 1-based line where the hole starts
    Line(usize),

    /// The whole file (copy rules)
    WholeFile,
}

/// What a record is measured against
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Subject {
    /// Lock table key of a line rule
    Key(String),

    /// Source file of a copy rule
    Source(Utf8PathBuf),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Key(key) => f.write_str(key),
            Subject::Source(path) => write!(f, "copy of {}", path),
        }
    }
}

/// Mismatch between a file and the value it should carry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftRecord {
    pub file: Utf8PathBuf,
    pub location: Location,
    pub subject: Subject,
    pub expected: String,
    pub actual: String,
}

/// A write performed by fix mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    pub file: Utf8PathBuf,
    pub location: Location,
    pub subject: Subject,
}

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// A problem attributed to one rule and, when known, one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub kind: ErrorKind,
    pub rule: String,
    pub file: Option<Utf8PathBuf>,
    pub message: String,
}

impl Issue {
    /// Build an issue from an error; `strict` promotes warnings to errors
    pub fn new(
        rule: impl Into<String>,
        file: Option<Utf8PathBuf>,
        error: &LockError,
        strict: bool,
    ) -> Self {
        let severity = if error.is_warning() && !strict {
            Severity::Warning
        } else {
            Severity::Error
        };
        Self {
            severity,
            kind: error.kind(),
            rule: rule.into(),
            file,
            message: error.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Aggregated outcome of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub mode: Mode,

    /// Drift found (check mode)
    pub drift: Vec<DriftRecord>,

    /// Writes performed (fix mode)
    pub changed: Vec<ChangeRecord>,

    /// Warnings and errors, attributed to (rule, file)
    pub issues: Vec<Issue>,

    /// Distinct target files visited
    pub files_visited: usize,
}

impl Report {
    /// Create an empty report
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            drift: Vec::new(),
            changed: Vec::new(),
            issues: Vec::new(),
            files_visited: 0,
        }
    }

    /// Check if any issue has error severity
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(Issue::is_error)
    }

    /// Iterator over error-severity issues
    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|issue| issue.is_error())
    }

    /// Iterator over warning-severity issues
    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|issue| !issue.is_error())
    }

    /// Distinct files written by fix mode, sorted
    pub fn changed_files(&self) -> Vec<&Utf8Path> {
        self.changed
            .iter()
            .map(|record| record.file.as_path())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// No drift and no errors remain
    pub fn is_clean(&self) -> bool {
        self.drift.is_empty() && !self.has_errors()
    }

    /// Process exit status for this report
    pub fn exit_code(&self) -> u8 {
        if self.is_clean() {
            0
        } else {
            1
        }
    }
}

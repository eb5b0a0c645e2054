//! Core type definitions for lockstep

mod error;
mod lock;
mod report;
mod rule;

pub use error::{ConfigError, ErrorKind, LockError};
pub use lock::LockTable;
pub use report::{ChangeRecord, DriftRecord, Issue, Location, Mode, Report, Severity, Subject};
pub use rule::{CopyRule, LineGroup, LineRule, Rule, RuleSet};

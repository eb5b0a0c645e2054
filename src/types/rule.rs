//! Rule model - copy rules and line rules

use super::LockTable;
use crate::matcher::HoleTemplate;
use crate::scanner::GlobPattern;
use camino::Utf8PathBuf;

/// Keeps every destination byte-identical to one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRule {
    /// Canonical file, relative to the run root
    pub source: Utf8PathBuf,

    /// Files that must mirror the source, in declared order
    pub destinations: Vec<Utf8PathBuf>,
}

/// Locates one hole in every file matched by a glob and ties it to a lock key
#[derive(Debug, Clone)]
pub struct LineRule {
    /// Glob the rule was declared under
    pub glob: GlobPattern,

    /// Two-group regex bracketing the hole
    pub template: HoleTemplate,

    /// Lock table key supplying the value
    pub key: String,
}

impl LineRule {
    /// Short label used when attributing problems to this rule
    pub fn label(&self) -> String {
        format!("{} [{}]", self.glob, self.template.as_str())
    }
}

/// All line rules declared under one glob
#[derive(Debug, Clone)]
pub struct LineGroup {
    pub glob: GlobPattern,
    pub rules: Vec<LineRule>,
}

/// One declared rule, either kind
#[derive(Debug, Clone)]
pub enum Rule {
    /// Entry of the `files` section
    Copy(CopyRule),

    /// Entry of the `lines` section
    Lines(LineGroup),
}

impl Rule {
    /// Short label used in reports
    pub fn label(&self) -> String {
        match self {
            Rule::Copy(rule) => format!("copy {}", rule.source),
            Rule::Lines(group) => format!("lines {}", group.glob),
        }
    }
}

/// Validated rules plus the lock table they refer to
#[derive(Debug, Clone)]
pub struct RuleSet {
    /// Copy rules first, then line groups, each in declaration order
    pub rules: Vec<Rule>,

    pub lock: LockTable,
}

impl RuleSet {
    /// Iterate over copy rules
    pub fn copy_rules(&self) -> impl Iterator<Item = &CopyRule> {
        self.rules.iter().filter_map(|rule| match rule {
            Rule::Copy(copy) => Some(copy),
            Rule::Lines(_) => None,
        })
    }

    /// Iterate over every line rule across all groups
    pub fn line_rules(&self) -> impl Iterator<Item = &LineRule> {
        self.rules.iter().flat_map(|rule| {
            let rules: &[LineRule] = match rule {
                Rule::Copy(_) => &[],
                Rule::Lines(group) => &group.rules,
            };
            rules.iter()
        })
    }
}

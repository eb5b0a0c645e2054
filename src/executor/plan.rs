//! Planning: expand rules into one job per target file

use super::copy::CopySource;
use super::relative_to;
use crate::config::Config;
use crate::scanner::resolve_glob;
use crate::types::{CopyRule, Issue, LineRule, LockError, Rule, RuleSet};
use camino::Utf8PathBuf;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Report position of an operation: rule, then rule-or-destination, then file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seq {
    /// Index of the rule in the rule set
    pub rule: usize,

    /// Line rule index within its group, or destination index of a copy rule
    pub sub: usize,

    /// Index of the file in the sorted glob resolution
    pub item: usize,
}

/// One unit of work against one file
#[derive(Debug, Clone)]
pub enum Operation {
    Line { seq: Seq, rule: Arc<LineRule> },
    Copy { seq: Seq, source: Arc<CopySource> },
}

impl Operation {
    pub fn seq(&self) -> Seq {
        match self {
            Operation::Line { seq, .. } | Operation::Copy { seq, .. } => *seq,
        }
    }

    /// Label of the rule this operation belongs to
    pub fn label(&self) -> String {
        match self {
            Operation::Line { rule, .. } => rule.label(),
            Operation::Copy { source, .. } => source.label.clone(),
        }
    }
}

/// Every operation targeting one path, in report order
#[derive(Debug, Clone)]
pub struct FileJob {
    /// Absolute path
    pub path: PathBuf,

    /// Path shown in reports
    pub display: Utf8PathBuf,

    pub ops: Vec<Operation>,
}

/// Copy rule whose source is read only once the line jobs have run
#[derive(Debug, Clone)]
pub struct PendingCopy {
    /// Index of the rule in the rule set
    pub rule_index: usize,

    pub rule: CopyRule,

    /// Destination index and absolute path, conflicting destinations removed
    pub destinations: Vec<(usize, PathBuf)>,
}

/// Jobs plus the problems found while resolving rules
#[derive(Debug, Default)]
pub struct Plan {
    /// Sorted by path
    pub jobs: Vec<FileJob>,

    /// Copies to run after `jobs`, in declaration order
    pub copies: Vec<PendingCopy>,

    pub issues: Vec<(Seq, Issue)>,
}

impl Plan {
    /// Total number of operations across all jobs and pending copies
    pub fn operation_count(&self) -> usize {
        let copies: usize = self.copies.iter().map(|c| c.destinations.len()).sum();
        self.jobs.iter().map(|job| job.ops.len()).sum::<usize>() + copies
    }

    /// Distinct files the plan will visit
    pub fn file_count(&self) -> usize {
        let copies: usize = self.copies.iter().map(|c| c.destinations.len()).sum();
        self.jobs.len() + copies
    }
}

/// Resolve every rule into line jobs and pending copies
///
/// Line rules are grouped into one job per target path. Copy sources are
/// not read here: a line rule may still rewrite a source, so copies are
/// loaded by [`plan_copies`] after the line jobs have finished. A path that
/// is both a copy destination and a line target is reported as a conflict
/// and left alone, since the two rules would keep undoing each other.
///
/// A missing literal path or an empty glob becomes an issue for that rule
/// and planning continues with the next one.
pub fn build_plan(rules: &RuleSet, config: &Config) -> Plan {
    let mut by_path: BTreeMap<PathBuf, Vec<Operation>> = BTreeMap::new();
    let mut copies = Vec::new();
    let mut issues = Vec::new();

    for (rule_index, rule) in rules.rules.iter().enumerate() {
        let rule_seq = Seq {
            rule: rule_index,
            ..Seq::default()
        };

        match rule {
            Rule::Copy(copy) => copies.push(PendingCopy {
                rule_index,
                rule: copy.clone(),
                destinations: copy
                    .destinations
                    .iter()
                    .enumerate()
                    .map(|(sub, destination)| (sub, config.resolve(destination.as_std_path())))
                    .collect(),
            }),
            Rule::Lines(group) => {
                let files = match resolve_glob(&group.glob, config) {
                    Ok(files) => files,
                    Err(e) => {
                        warn!(rule = %rule.label(), "{}", e);
                        let file = Utf8PathBuf::from(group.glob.normalized());
                        issues.push((
                            rule_seq,
                            Issue::new(rule.label(), Some(file), &e, config.strict),
                        ));
                        continue;
                    }
                };

                if files.is_empty() {
                    let e = LockError::ZeroMatchFiles {
                        glob: group.glob.to_string(),
                    };
                    warn!(rule = %rule.label(), "{}", e);
                    issues.push((rule_seq, Issue::new(rule.label(), None, &e, config.strict)));
                    continue;
                }

                for (sub, line_rule) in group.rules.iter().enumerate() {
                    let line_rule = Arc::new(line_rule.clone());
                    for (item, path) in files.iter().enumerate() {
                        by_path.entry(path.clone()).or_default().push(Operation::Line {
                            seq: Seq {
                                rule: rule_index,
                                sub,
                                item,
                            },
                            rule: Arc::clone(&line_rule),
                        });
                    }
                }
            }
        }
    }

    for pending in &mut copies {
        let label = format!("copy {}", pending.rule.source);
        let rule_index = pending.rule_index;
        pending.destinations.retain(|(sub, path)| {
            let Some(ops) = by_path.remove(path) else {
                return true;
            };
            let line = ops.first().map(Operation::label).unwrap_or_default();
            let e = LockError::RuleConflict {
                copy: label.clone(),
                line,
            };
            warn!(file = %path.display(), "{}", e);
            issues.push((
                Seq {
                    rule: rule_index,
                    sub: *sub,
                    item: 0,
                },
                Issue::new(
                    label.clone(),
                    Some(relative_to(path, &config.root)),
                    &e,
                    config.strict,
                ),
            ));
            false
        });
    }

    let jobs = into_jobs(by_path, config);
    debug!(
        jobs = jobs.len(),
        copies = copies.len(),
        issues = issues.len(),
        "built plan"
    );
    Plan {
        jobs,
        copies,
        issues,
    }
}

/// Read copy sources and turn pending copies into jobs
///
/// Each source is read once, however many destinations it has. An
/// unreadable source becomes one issue for the whole rule.
pub fn plan_copies(copies: &[PendingCopy], config: &Config) -> Plan {
    let mut by_path: BTreeMap<PathBuf, Vec<Operation>> = BTreeMap::new();
    let mut issues = Vec::new();

    for pending in copies {
        let source = match CopySource::load(&pending.rule, &config.root) {
            Ok(source) => Arc::new(source),
            Err(e) => {
                let label = format!("copy {}", pending.rule.source);
                warn!(rule = %label, "{}", e);
                let seq = Seq {
                    rule: pending.rule_index,
                    ..Seq::default()
                };
                issues.push((
                    seq,
                    Issue::new(label, Some(pending.rule.source.clone()), &e, config.strict),
                ));
                continue;
            }
        };

        for (sub, path) in &pending.destinations {
            by_path.entry(path.clone()).or_default().push(Operation::Copy {
                seq: Seq {
                    rule: pending.rule_index,
                    sub: *sub,
                    item: 0,
                },
                source: Arc::clone(&source),
            });
        }
    }

    let jobs = into_jobs(by_path, config);
    debug!(jobs = jobs.len(), issues = issues.len(), "loaded copy sources");
    Plan {
        jobs,
        copies: Vec::new(),
        issues,
    }
}

fn into_jobs(by_path: BTreeMap<PathBuf, Vec<Operation>>, config: &Config) -> Vec<FileJob> {
    by_path
        .into_iter()
        .map(|(path, mut ops)| {
            ops.sort_by_key(Operation::seq);
            FileJob {
                display: relative_to(&path, &config.root),
                path,
                ops,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_rule_set, SpecFormat};
    use crate::types::{ErrorKind, Severity};
    use std::fs;
    use tempfile::TempDir;

    fn setup(spec: &str, files: &[(&str, &str)]) -> (TempDir, RuleSet, Config) {
        let dir = TempDir::new().expect("create tempdir");
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().expect("parent")).expect("create parent");
            fs::write(full, content).expect("write file");
        }
        let rules = parse_rule_set(spec, SpecFormat::Yaml).expect("parse spec");
        let config = Config {
            root: dir.path().to_path_buf(),
            ..Config::default()
        };
        (dir, rules, config)
    }

    #[test]
    fn test_operations_grouped_per_file_in_rule_order() {
        let spec = r#"
files:
  LICENSE: [a/LICENSE]
lines:
  "*/Cargo.toml":
    '(version = ")[^"]*(")': V
    '(edition = ")[^"]*(")': E
lock:
  V: 1.0.0
  E: "2021"
"#;
        let (_dir, rules, config) = setup(
            spec,
            &[
                ("LICENSE", "MIT"),
                ("a/Cargo.toml", "version = \"0\"\nedition = \"2018\"\n"),
                ("b/Cargo.toml", "version = \"0\"\nedition = \"2018\"\n"),
            ],
        );

        let plan = build_plan(&rules, &config);
        assert!(plan.issues.is_empty());

        let displays: Vec<_> = plan.jobs.iter().map(|j| j.display.as_str()).collect();
        assert_eq!(displays, vec!["a/Cargo.toml", "b/Cargo.toml"]);

        let seqs: Vec<_> = plan.jobs[0].ops.iter().map(Operation::seq).collect();
        assert_eq!(
            seqs,
            vec![
                Seq { rule: 1, sub: 0, item: 0 },
                Seq { rule: 1, sub: 1, item: 0 }
            ]
        );
        assert_eq!(plan.jobs[1].ops[0].seq().item, 1);

        assert_eq!(plan.copies.len(), 1);
        assert_eq!(plan.copies[0].rule_index, 0);
        assert_eq!(plan.copies[0].destinations.len(), 1);
        assert_eq!(plan.operation_count(), 5);
        assert_eq!(plan.file_count(), 3);
    }

    #[test]
    fn test_copy_destination_with_line_rule_is_a_conflict() {
        let spec = r#"
files:
  tpl.toml: [app.toml, other.toml]
lines:
  "*.toml":
    '(v = ")[^"]*(")': V
lock:
  V: "9"
"#;
        let (_dir, rules, config) = setup(
            spec,
            &[
                ("tpl.toml", "v = \"1\"\n"),
                ("app.toml", "v = \"1\"\n"),
            ],
        );

        let plan = build_plan(&rules, &config);

        // app.toml is dropped from both phases; tpl.toml keeps its line rule
        let displays: Vec<_> = plan.jobs.iter().map(|j| j.display.as_str()).collect();
        assert_eq!(displays, vec!["tpl.toml"]);
        assert_eq!(plan.copies[0].destinations.len(), 1);
        assert_eq!(plan.copies[0].destinations[0].0, 1);

        assert_eq!(plan.issues.len(), 1);
        let (seq, issue) = &plan.issues[0];
        assert_eq!(*seq, Seq { rule: 0, sub: 0, item: 0 });
        assert_eq!(issue.kind, ErrorKind::RuleConflict);
        assert_eq!(issue.severity, Severity::Error);
        assert_eq!(issue.file.as_ref().map(|f| f.as_str()), Some("app.toml"));
    }

    #[test]
    fn test_copy_sources_are_read_when_copies_are_planned() {
        let spec = "files:\n  README.md: [pkg/README.md, doc/README.md]\nlock: {}\n";
        let (dir, rules, config) = setup(spec, &[("README.md", "version 1\n")]);

        let plan = build_plan(&rules, &config);
        assert!(plan.jobs.is_empty());
        fs::write(dir.path().join("README.md"), "version 2\n").unwrap();

        let copy_plan = plan_copies(&plan.copies, &config);
        assert!(copy_plan.issues.is_empty());
        let displays: Vec<_> = copy_plan.jobs.iter().map(|j| j.display.as_str()).collect();
        assert_eq!(displays, vec!["doc/README.md", "pkg/README.md"]);
        match &copy_plan.jobs[0].ops[0] {
            Operation::Copy { seq, source } => {
                assert_eq!(source.bytes, b"version 2\n");
                assert_eq!(seq.sub, 1);
            }
            other => panic!("expected copy, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_match_glob_is_warning() {
        let spec = "lines:\n  'docs/**/*.md':\n    '(v)[0-9]+(;)': K\nlock:\n  K: 1\n";
        let (_dir, rules, config) = setup(spec, &[]);

        let plan = build_plan(&rules, &config);
        assert!(plan.jobs.is_empty());
        assert_eq!(plan.issues.len(), 1);
        let issue = &plan.issues[0].1;
        assert_eq!(issue.kind, ErrorKind::ZeroMatchFiles);
        assert_eq!(issue.severity, Severity::Warning);
        assert_eq!(issue.rule, "lines docs/**/*.md");
    }

    #[test]
    fn test_zero_match_glob_is_error_when_strict() {
        let spec = "lines:\n  'docs/**/*.md':\n    '(v)[0-9]+(;)': K\nlock:\n  K: 1\n";
        let (_dir, rules, mut config) = setup(spec, &[]);
        config.strict = true;

        let plan = build_plan(&rules, &config);
        assert_eq!(plan.issues[0].1.severity, Severity::Error);
    }

    #[test]
    fn test_missing_literal_and_source_are_errors() {
        let spec = r#"
files:
  LICENSE: [a/LICENSE]
lines:
  missing.toml:
    '(v)[0-9]+(;)': K
lock:
  K: 1
"#;
        let (_dir, rules, config) = setup(spec, &[]);

        let plan = build_plan(&rules, &config);
        assert!(plan.jobs.is_empty());
        assert_eq!(plan.issues.len(), 1);
        assert_eq!(plan.issues[0].1.kind, ErrorKind::GlobResolution);
        assert_eq!(
            plan.issues[0].1.file.as_ref().map(|f| f.as_str()),
            Some("missing.toml")
        );

        let copy_plan = plan_copies(&plan.copies, &config);
        assert!(copy_plan.jobs.is_empty());
        assert_eq!(copy_plan.issues.len(), 1);
        let (seq, issue) = &copy_plan.issues[0];
        assert_eq!(seq.rule, 0);
        assert_eq!(issue.kind, ErrorKind::SourceUnreadable);
        assert_eq!(issue.file.as_ref().map(|f| f.as_str()), Some("LICENSE"));
    }
}

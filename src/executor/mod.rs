//! Executor module: runs file jobs in check or fix mode

pub mod copy;
pub mod plan;
pub mod pool;

use crate::matcher::Rewrite;
use crate::types::{
    ChangeRecord, DriftRecord, Issue, LineRule, Location, LockError, LockTable, Mode, Subject,
};
use crate::ui::ProgressReporter;
use camino::Utf8PathBuf;
use copy::{apply_copy, check_copy, write_atomic, CopySource, CopyState};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub use plan::{build_plan, plan_copies, FileJob, Operation, PendingCopy, Plan, Seq};
pub use pool::{ParallelExecutor, PoolOutput, PoolStats};

/// Shared, read-only state every worker needs
#[derive(Debug, Clone)]
pub struct JobContext {
    pub mode: Mode,
    pub lock: Arc<LockTable>,
    pub strict: bool,
    pub progress: ProgressReporter,
}

/// What one operation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Drift(DriftRecord),
    Changed(ChangeRecord),
    Issue(Issue),
}

/// A record tagged with its report position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub seq: Seq,
    pub record: Record,
}

/// Run every operation of one job sequentially
///
/// Line rules see each other's writes: the file content is cached between
/// operations and refreshed after every write. A failing operation becomes
/// an issue and the remaining operations still run.
pub fn execute_job(ctx: &JobContext, job: &FileJob) -> Vec<Outcome> {
    let mut outcomes = Vec::new();
    let mut cache: Option<Vec<u8>> = None;

    for op in &job.ops {
        let result = match op {
            Operation::Line { rule, .. } => run_line(ctx, job, rule, &mut cache),
            Operation::Copy { source, .. } => run_copy(ctx, job, source),
        };

        match result {
            Ok(Some(record)) => outcomes.push(Outcome {
                seq: op.seq(),
                record,
            }),
            Ok(None) => {}
            Err(e) => {
                debug!(file = %job.display, rule = %op.label(), "{}", e);
                outcomes.push(Outcome {
                    seq: op.seq(),
                    record: Record::Issue(Issue::new(
                        op.label(),
                        Some(job.display.clone()),
                        &e,
                        ctx.strict,
                    )),
                });
            }
        }
    }

    outcomes
}

/// Outcomes for a job skipped because of an interrupt
pub fn interrupted(job: &FileJob) -> Vec<Outcome> {
    job.ops
        .iter()
        .map(|op| Outcome {
            seq: op.seq(),
            record: Record::Issue(Issue::new(
                op.label(),
                Some(job.display.clone()),
                &LockError::Interrupted,
                true,
            )),
        })
        .collect()
}

fn run_line(
    ctx: &JobContext,
    job: &FileJob,
    rule: &LineRule,
    cache: &mut Option<Vec<u8>>,
) -> Result<Option<Record>, LockError> {
    let expected = ctx.lock.get(&rule.key).ok_or_else(|| {
        LockError::Config(crate::types::ConfigError::UnknownKey {
            glob: rule.glob.to_string(),
            pattern: rule.template.as_str().to_string(),
            key: rule.key.clone(),
        })
    })?;

    if cache.is_none() {
        *cache = Some(fs::read(&job.path).map_err(|e| LockError::from_io(&job.path, e))?);
    }
    let content = cache.as_deref().unwrap_or_default();

    match ctx.mode {
        Mode::Check => {
            let hole = rule.template.locate(content)?;
            if hole.value == expected.as_bytes() {
                debug!(file = %job.display, key = %rule.key, line = hole.line, "in sync");
                return Ok(None);
            }
            Ok(Some(Record::Drift(DriftRecord {
                file: job.display.clone(),
                location: Location::Line(hole.line),
                subject: Subject::Key(rule.key.clone()),
                expected: expected.to_string(),
                actual: hole.value_lossy(),
            })))
        }
        Mode::Fix => match rule.template.render(content, expected, &rule.key)? {
            Rewrite::Unchanged { line } => {
                debug!(file = %job.display, key = %rule.key, line, "in sync");
                Ok(None)
            }
            Rewrite::Changed {
                content: rewritten,
                previous,
                line,
            } => {
                write_atomic(&job.path, &rewritten)?;
                *cache = Some(rewritten);
                info!(
                    file = %job.display,
                    key = %rule.key,
                    line,
                    "updated '{}' -> '{}'",
                    previous,
                    expected
                );
                Ok(Some(Record::Changed(ChangeRecord {
                    file: job.display.clone(),
                    location: Location::Line(line),
                    subject: Subject::Key(rule.key.clone()),
                })))
            }
        },
    }
}

fn run_copy(
    ctx: &JobContext,
    job: &FileJob,
    source: &CopySource,
) -> Result<Option<Record>, LockError> {
    match ctx.mode {
        Mode::Check => {
            let actual = match check_copy(source, &job.path)? {
                CopyState::Identical => {
                    debug!(file = %job.display, source = %source.path, "identical");
                    return Ok(None);
                }
                CopyState::Missing => "missing".to_string(),
                CopyState::Differs { fingerprint } => fingerprint,
            };
            Ok(Some(Record::Drift(DriftRecord {
                file: job.display.clone(),
                location: Location::WholeFile,
                subject: Subject::Source(source.path.clone()),
                expected: source.fingerprint(),
                actual,
            })))
        }
        Mode::Fix => {
            if !apply_copy(source, &job.path)? {
                debug!(file = %job.display, source = %source.path, "identical");
                return Ok(None);
            }
            info!(file = %job.display, source = %source.path, "copied");
            Ok(Some(Record::Changed(ChangeRecord {
                file: job.display.clone(),
                location: Location::WholeFile,
                subject: Subject::Source(source.path.clone()),
            })))
        }
    }
}

/// Report path of `path`: relative to `root` when below it, `/`-separated
pub fn relative_to(path: &Path, root: &Path) -> Utf8PathBuf {
    match path.strip_prefix(root) {
        Ok(relative) => Utf8PathBuf::from(
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/"),
        ),
        Err(_) => Utf8PathBuf::from(path.to_string_lossy().into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_rule_set, Config, SpecFormat};
    use crate::types::{ErrorKind, RuleSet};
    use tempfile::TempDir;

    const SPEC: &str = r#"
lines:
  Cargo.toml:
    '(^version = ")[^"]*(")': VERSION
    '(^rust-version = ")[^"]*(")': RUST
lock:
  VERSION: 0.3.0
  RUST: 1.72.1
"#;

    fn context(rules: &RuleSet, mode: Mode) -> JobContext {
        JobContext {
            mode,
            lock: Arc::new(rules.lock.clone()),
            strict: false,
            progress: ProgressReporter::new(false),
        }
    }

    fn single_job(dir: &TempDir, rules: &RuleSet) -> FileJob {
        let config = Config {
            root: dir.path().to_path_buf(),
            ..Config::default()
        };
        let mut plan = build_plan(rules, &config);
        assert_eq!(plan.jobs.len(), 1);
        plan.jobs.remove(0)
    }

    #[test]
    fn test_check_reports_drift_without_writing() {
        let dir = TempDir::new().unwrap();
        let original = "[package]\nversion = \"0.2.0\"\nrust-version = \"1.72.1\"\n";
        fs::write(dir.path().join("Cargo.toml"), original).unwrap();
        let rules = parse_rule_set(SPEC, SpecFormat::Yaml).unwrap();

        let job = single_job(&dir, &rules);
        let outcomes = execute_job(&context(&rules, Mode::Check), &job);

        assert_eq!(outcomes.len(), 1);
        match &outcomes[0].record {
            Record::Drift(drift) => {
                assert_eq!(drift.file.as_str(), "Cargo.toml");
                assert_eq!(drift.location, Location::Line(2));
                assert_eq!(drift.expected, "0.3.0");
                assert_eq!(drift.actual, "0.2.0");
            }
            other => panic!("expected drift, got {:?}", other),
        }
        assert_eq!(
            fs::read_to_string(dir.path().join("Cargo.toml")).unwrap(),
            original
        );
    }

    #[test]
    fn test_fix_applies_every_rule_in_one_job() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Cargo.toml"),
            "version = \"0.1.0\"\nrust-version = \"1.70\"\n",
        )
        .unwrap();
        let rules = parse_rule_set(SPEC, SpecFormat::Yaml).unwrap();

        let job = single_job(&dir, &rules);
        let outcomes = execute_job(&context(&rules, Mode::Fix), &job);

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.record, Record::Changed(_))));
        assert_eq!(
            fs::read_to_string(dir.path().join("Cargo.toml")).unwrap(),
            "version = \"0.3.0\"\nrust-version = \"1.72.1\"\n"
        );

        let again = execute_job(&context(&rules, Mode::Fix), &job);
        assert!(again.is_empty());
    }

    #[test]
    fn test_match_failure_becomes_issue_and_job_continues() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Cargo.toml"), "rust-version = \"1.0\"\n").unwrap();
        let rules = parse_rule_set(SPEC, SpecFormat::Yaml).unwrap();

        let job = single_job(&dir, &rules);
        let outcomes = execute_job(&context(&rules, Mode::Check), &job);

        assert_eq!(outcomes.len(), 2);
        match &outcomes[0].record {
            Record::Issue(issue) => {
                assert_eq!(issue.kind, ErrorKind::PatternNotFound);
                assert!(issue.is_error());
                assert_eq!(issue.file.as_ref().map(|f| f.as_str()), Some("Cargo.toml"));
            }
            other => panic!("expected issue, got {:?}", other),
        }
        assert!(matches!(outcomes[1].record, Record::Drift(_)));
    }

    #[test]
    fn test_interrupted_job_reports_every_operation() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Cargo.toml"),
            "version = \"0\"\nrust-version = \"0\"\n",
        )
        .unwrap();
        let rules = parse_rule_set(SPEC, SpecFormat::Yaml).unwrap();

        let job = single_job(&dir, &rules);
        let outcomes = interrupted(&job);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| matches!(
            &o.record,
            Record::Issue(issue) if issue.kind == ErrorKind::Interrupted
        )));
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(
            relative_to(Path::new("/repo/a/b.txt"), Path::new("/repo")).as_str(),
            "a/b.txt"
        );
        assert_eq!(
            relative_to(Path::new("/elsewhere/c.txt"), Path::new("/repo")).as_str(),
            "/elsewhere/c.txt"
        );
    }
}

//! Check and fix commands

use crate::config::{load_rule_set, Config};
use crate::executor::{
    build_plan, interrupted, plan_copies, FileJob, JobContext, Outcome, ParallelExecutor, Record,
    Seq,
};
use crate::types::{Issue, LockError, Mode, Report, RuleSet};
use crate::ui::ProgressReporter;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

/// Jobs buffered per worker inbox
const QUEUE_CAPACITY: usize = 64;

/// Load the specification and run it in `mode`
///
/// Only configuration problems are returned as `Err`; everything that goes
/// wrong with a single rule or file is collected into the report.
pub fn run(config: &Config, mode: Mode) -> Result<Report, LockError> {
    let spec_path = config.locate_spec()?;
    info!(spec = %spec_path.display(), %mode, "loading lock specification");
    let rules = load_rule_set(&spec_path)?;
    run_rules(&rules, config, mode)
}

/// Run an already loaded rule set in `mode`
///
/// Line rules run first. Copy sources are read afterwards, so a copy always
/// carries the values the line rules just wrote into its source.
pub fn run_rules(rules: &RuleSet, config: &Config, mode: Mode) -> Result<Report, LockError> {
    let progress = ProgressReporter::new(config.progress);

    progress.start_plan(rules.rules.len());
    let plan = build_plan(rules, config);
    progress.finish_plan(plan.file_count(), plan.operation_count());

    let ctx = Arc::new(JobContext {
        mode,
        lock: Arc::new(rules.lock.clone()),
        strict: config.strict,
        progress: progress.clone(),
    });
    progress.start_jobs(plan.file_count() as u64);

    let mut outcomes = issue_outcomes(plan.issues);
    let lines = run_jobs(plan.jobs, config, &ctx)?;
    outcomes.extend(lines.outcomes);

    let copy_plan = plan_copies(&plan.copies, config);
    outcomes.extend(issue_outcomes(copy_plan.issues));
    let files_visited = lines.files + copy_plan.jobs.len();
    if lines.interrupted {
        outcomes.extend(copy_plan.jobs.iter().flat_map(interrupted));
    } else {
        outcomes.extend(run_jobs(copy_plan.jobs, config, &ctx)?.outcomes);
    }

    let mut report = Report::new(mode);
    report.files_visited = files_visited;
    merge_outcomes(&mut report, outcomes);
    progress.finish_jobs(
        report.drift.len(),
        report.changed_files().len(),
        report.errors().count(),
    );

    Ok(report)
}

/// Outcomes of one pool run
struct PhaseOutput {
    outcomes: Vec<Outcome>,
    files: usize,
    interrupted: bool,
}

fn run_jobs(
    jobs: Vec<FileJob>,
    config: &Config,
    ctx: &Arc<JobContext>,
) -> Result<PhaseOutput, LockError> {
    let files = jobs.len();
    if jobs.is_empty() {
        return Ok(PhaseOutput {
            outcomes: Vec::new(),
            files,
            interrupted: false,
        });
    }

    let pool = ParallelExecutor::new(config.threads, QUEUE_CAPACITY, Arc::clone(ctx))?;
    let cancelled = pool.cancel_flag();
    for job in jobs {
        pool.enqueue(job)?;
    }
    let output = pool.close_and_wait()?;
    debug!(stats = ?output.stats, "worker pool finished");

    Ok(PhaseOutput {
        outcomes: output.outcomes,
        files,
        interrupted: cancelled.load(Ordering::SeqCst),
    })
}

fn issue_outcomes(issues: Vec<(Seq, Issue)>) -> Vec<Outcome> {
    issues
        .into_iter()
        .map(|(seq, issue)| Outcome {
            seq,
            record: Record::Issue(issue),
        })
        .collect()
}

/// Sort outcomes into report order and file them by kind
fn merge_outcomes(report: &mut Report, mut outcomes: Vec<Outcome>) {
    outcomes.sort_by_key(|outcome| outcome.seq);

    for Outcome { record, .. } in outcomes {
        match record {
            Record::Drift(drift) => report.drift.push(drift),
            Record::Changed(change) => report.changed.push(change),
            Record::Issue(issue) => report.issues.push(issue),
        }
    }
}

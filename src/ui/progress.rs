//! Progress reporting

use camino::Utf8Path;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt;
use std::time::{Duration, Instant};

/// Progress reporter for check and fix runs
///
/// Cheap to clone; every clone drives the same bars, so workers update it
/// without locking. When disabled the bars still count but draw nothing.
#[derive(Clone)]
pub struct ProgressReporter {
    plan_bar: ProgressBar,
    job_bar: ProgressBar,
    started_at: Instant,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new(enabled: bool) -> Self {
        let plan_bar = if enabled {
            let bar = ProgressBar::new_spinner();
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden())
        };
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            plan_bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
        }

        let job_bar = if enabled {
            ProgressBar::new(0)
        } else {
            ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden())
        };
        if let Ok(style) = ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} files | {msg}")
        {
            job_bar.set_style(style.progress_chars("=>-"));
        }

        Self {
            plan_bar,
            job_bar,
            started_at: Instant::now(),
        }
    }

    /// Mark start of rule resolution.
    pub fn start_plan(&self, rules: usize) {
        self.plan_bar
            .set_message(format!("Resolving {} rules...", rules));
    }

    /// Mark end of rule resolution.
    pub fn finish_plan(&self, files: usize, operations: usize) {
        self.plan_bar.finish_with_message(format!(
            "Resolved {} operations across {} files",
            operations, files
        ));
    }

    /// Initialize job phase progress.
    pub fn start_jobs(&self, total_files: u64) {
        self.job_bar.set_length(total_files);
        self.job_bar.set_position(0);
        self.job_bar.set_message("Starting...".to_string());
    }

    /// Update current file indicator.
    pub fn set_current_file(&self, path: &Utf8Path) {
        self.job_bar.set_message(path.to_string());
    }

    /// Mark one file job complete.
    pub fn complete_job(&self) {
        self.job_bar.inc(1);
    }

    /// Finalize job phase.
    pub fn finish_jobs(&self, drift: usize, changed: usize, errors: usize) {
        self.job_bar.finish_with_message(format!(
            "{} drift, {} changed, {} errors | {:.2?}",
            drift,
            changed,
            errors,
            self.started_at.elapsed()
        ));
    }

    /// Number of completed jobs
    pub fn position(&self) -> u64 {
        self.job_bar.position()
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("position", &self.job_bar.position())
            .field("length", &self.job_bar.length())
            .finish()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

//! Report rendering for the terminal and for machines

use crate::types::{ErrorKind, Issue, Location, LockError, Mode, Report, Severity};
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Counts shown at the end of a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub files_visited: usize,
    pub drift: usize,
    pub changed: usize,
    pub changed_files: usize,
    pub errors: usize,
    pub warnings: usize,
    pub exit_code: u8,
}

impl Summary {
    pub fn of(report: &Report) -> Self {
        Self {
            files_visited: report.files_visited,
            drift: report.drift.len(),
            changed: report.changed.len(),
            changed_files: report.changed_files().len(),
            errors: report.errors().count(),
            warnings: report.warnings().count(),
            exit_code: report.exit_code(),
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    report: &'a Report,
    summary: Summary,
}

/// Pretty-printed JSON document for `--format json`
pub fn render_json(report: &Report) -> Result<String, LockError> {
    let document = JsonReport {
        generated_at: Utc::now(),
        report,
        summary: Summary::of(report),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// One-line hint printed under each issue group
pub fn suggestion(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::ZeroMatchFiles => {
            "Check the glob for typos or drop the rule; --strict turns this into an error"
        }
        ErrorKind::GlobResolution => "Create the file or fix the path in the lock specification",
        ErrorKind::PatternNotFound => {
            "Make sure the file still contains the text around the value, or update the pattern"
        }
        ErrorKind::AmbiguousMatch => {
            "Anchor the pattern (e.g. with ^) or add more surrounding context so it matches once"
        }
        ErrorKind::UnboundedHole => {
            "Make both capture groups mandatory and keep group 1 before group 2"
        }
        ErrorKind::NonConvergent => {
            "Bound the value with a negated class like [^\"]* so the new value reads back unchanged"
        }
        ErrorKind::SourceUnreadable => "Restore the copy source or fix its path",
        ErrorKind::RuleConflict => {
            "Set the value in the copy source and drop the line rule, or drop the copy rule"
        }
        ErrorKind::PermissionDenied => "Check file permissions and ownership",
        ErrorKind::Interrupted => "Run the command again to process the remaining files",
        ErrorKind::Io | ErrorKind::Pool | ErrorKind::Render => {
            "Re-run with -v for more detail"
        }
        ErrorKind::Config => "Fix the lock specification and run again",
    }
}

/// Human-readable report
pub fn render_human(report: &Report) -> String {
    let mut out = String::new();

    match report.mode {
        Mode::Check => render_drift(report, &mut out),
        Mode::Fix => render_changes(report, &mut out),
    }
    render_issues(&report.issues, &mut out);

    let summary = Summary::of(report);
    let status = if report.is_clean() {
        style("ok").green().bold()
    } else {
        style("failed").red().bold()
    };
    let _ = writeln!(
        out,
        "{} {}: {} files visited, {} drift, {} updated, {} errors, {} warnings",
        report.mode,
        status,
        summary.files_visited,
        summary.drift,
        summary.changed_files,
        summary.errors,
        summary.warnings
    );

    out
}

fn render_drift(report: &Report, out: &mut String) {
    if report.drift.is_empty() {
        let _ = writeln!(out, "No drift found.\n");
        return;
    }

    let _ = writeln!(out, "{}", style(format!("Drift ({}):", report.drift.len())).yellow().bold());
    for record in &report.drift {
        let _ = writeln!(
            out,
            "  {}  {}",
            style(site(&record.file, record.location)).bold(),
            record.subject
        );
        let _ = writeln!(out, "    expected: {}", display_value(&record.expected));
        let _ = writeln!(out, "    actual:   {}", display_value(&record.actual));
    }
    out.push('\n');
}

fn render_changes(report: &Report, out: &mut String) {
    let files = report.changed_files();
    if files.is_empty() {
        let _ = writeln!(out, "Everything already in sync.\n");
        return;
    }

    let _ = writeln!(out, "{}", style(format!("Updated ({} files):", files.len())).green().bold());
    for record in &report.changed {
        let _ = writeln!(
            out,
            "  {}  {}",
            style(site(&record.file, record.location)).bold(),
            record.subject
        );
    }
    out.push('\n');
}

fn render_issues(issues: &[Issue], out: &mut String) {
    let mut groups: BTreeMap<(Reverse<Severity>, ErrorKind), Vec<&Issue>> = BTreeMap::new();
    for issue in issues {
        groups
            .entry((Reverse(issue.severity), issue.kind))
            .or_default()
            .push(issue);
    }

    for ((Reverse(severity), kind), members) in groups {
        let heading = format!("{} ({}):", kind.label(), members.len());
        let heading = match severity {
            Severity::Error => style(format!("error: {}", heading)).red().bold(),
            Severity::Warning => style(format!("warning: {}", heading)).yellow().bold(),
        };
        let _ = writeln!(out, "{}", heading);

        for issue in members {
            match &issue.file {
                Some(file) => {
                    let _ = writeln!(out, "  {} ({}): {}", file, issue.rule, issue.message);
                }
                None => {
                    let _ = writeln!(out, "  {}: {}", issue.rule, issue.message);
                }
            }
        }
        let _ = writeln!(out, "  {} {}\n", style("Try:").cyan(), suggestion(kind));
    }
}

fn site(file: &Utf8Path, location: Location) -> String {
    match location {
        Location::Line(line) => format!("{}:{}", file, line),
        Location::WholeFile => file.to_string(),
    }
}

/// Values with line breaks or edge whitespace are shown quoted and escaped
fn display_value(value: &str) -> String {
    if value.is_empty() || value.contains(['\n', '\r']) || value.trim() != value {
        format!("{:?}", value)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeRecord, DriftRecord, Subject};
    use camino::Utf8PathBuf;

    fn check_report() -> Report {
        let mut report = Report::new(Mode::Check);
        report.files_visited = 3;
        report.drift.push(DriftRecord {
            file: Utf8PathBuf::from("rust-toolchain.toml"),
            location: Location::Line(2),
            subject: Subject::Key("RUST_VERSION".to_string()),
            expected: "1.72.1".to_string(),
            actual: "1.70.0".to_string(),
        });
        report.issues.push(Issue::new(
            "lines docs/**/*.md",
            None,
            &LockError::ZeroMatchFiles {
                glob: "docs/**/*.md".to_string(),
            },
            false,
        ));
        report.issues.push(Issue::new(
            "Cargo.toml [(v)x(y)]",
            Some(Utf8PathBuf::from("Cargo.toml")),
            &LockError::PatternNotFound {
                pattern: "(v)x(y)".to_string(),
            },
            false,
        ));
        report
    }

    #[test]
    fn test_human_check_lists_drift_and_grouped_issues() {
        let text = render_human(&check_report());

        assert!(text.contains("rust-toolchain.toml:2"));
        assert!(text.contains("RUST_VERSION"));
        assert!(text.contains("expected: 1.72.1"));
        assert!(text.contains("actual:   1.70.0"));
        assert!(text.contains("Pattern not found (1):"));
        assert!(text.contains("Empty glob (1):"));
        assert!(text.contains(suggestion(ErrorKind::ZeroMatchFiles)));
        assert!(text.contains("3 files visited, 1 drift, 0 updated, 1 errors, 1 warnings"));

        let error_at = text.find("Pattern not found").unwrap();
        let warning_at = text.find("Empty glob").unwrap();
        assert!(error_at < warning_at, "errors are listed before warnings");
    }

    #[test]
    fn test_human_fix_lists_changed_files() {
        let mut report = Report::new(Mode::Fix);
        report.changed.push(ChangeRecord {
            file: Utf8PathBuf::from("typegate/LICENSE"),
            location: Location::WholeFile,
            subject: Subject::Source(Utf8PathBuf::from("LICENSE")),
        });
        let text = render_human(&report);
        assert!(text.contains("Updated (1 files):"));
        assert!(text.contains("typegate/LICENSE"));
        assert!(text.contains("copy of LICENSE"));

        let text = render_human(&Report::new(Mode::Fix));
        assert!(text.contains("Everything already in sync."));
    }

    #[test]
    fn test_multiline_values_are_escaped() {
        assert_eq!(display_value("1.0"), "1.0");
        assert_eq!(display_value("a\nb\n"), "\"a\\nb\\n\"");
        assert_eq!(display_value(""), "\"\"");
    }

    #[test]
    fn test_json_report_shape() {
        let json = render_json(&check_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value["generated_at"].is_string());
        assert_eq!(value["mode"], "check");
        assert_eq!(value["drift"][0]["expected"], "1.72.1");
        assert_eq!(value["issues"][0]["severity"], "warning");
        assert_eq!(value["issues"][1]["kind"], "pattern_not_found");
        assert_eq!(value["summary"]["exit_code"], 1);
        assert_eq!(value["summary"]["warnings"], 1);
    }

    #[test]
    fn test_every_kind_has_a_suggestion() {
        for kind in [
            ErrorKind::Io,
            ErrorKind::Config,
            ErrorKind::GlobResolution,
            ErrorKind::ZeroMatchFiles,
            ErrorKind::PatternNotFound,
            ErrorKind::AmbiguousMatch,
            ErrorKind::UnboundedHole,
            ErrorKind::NonConvergent,
            ErrorKind::SourceUnreadable,
            ErrorKind::PermissionDenied,
            ErrorKind::Interrupted,
        ] {
            assert!(!suggestion(kind).is_empty());
        }
    }
}

//! Configuration management

pub mod loader;

use crate::types::{ConfigError, LockError};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

pub use loader::{load_rule_set, parse_rule_set, SpecFormat};

/// Specification file names searched under the root, in order
pub const SPEC_CANDIDATES: [&str; 4] = ["lock.yml", "lock.yaml", "lock.toml", "dev/lock.yml"];

/// Keep one fact table consistent across every file of a repository
#[derive(Debug, Parser)]
#[command(name = "lockstep", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Lock specification file (default: lock.yml, lock.yaml, lock.toml or dev/lock.yml under the root)
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory relative globs and paths resolve against (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Treat globs that match no files as errors
    #[arg(long, global = true)]
    pub strict: bool,

    /// Number of worker threads
    #[arg(short = 'j', long, global = true, value_name = "N")]
    pub jobs: Option<usize>,

    /// Report format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,

    /// Never draw a progress bar
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Also match files hidden by .gitignore, .ignore and .lockstepignore
    #[arg(long, global = true)]
    pub no_ignore: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Subcommands
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Report drift without touching any file
    Check,

    /// Rewrite drifted values and copies
    Fix,

    /// Print one lock value
    Get {
        /// Lock table key
        key: String,
    },

    /// Print every lock value
    List,
}

/// Report rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

/// Runtime configuration for one run
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for relative globs and copy paths
    pub root: PathBuf,

    /// Explicit specification file
    pub spec_path: Option<PathBuf>,

    /// Promote zero-match warnings to errors
    pub strict: bool,

    /// Number of worker threads
    pub threads: usize,

    /// Report format
    pub format: OutputFormat,

    /// Draw a progress bar
    pub progress: bool,

    /// Honour .gitignore/.ignore/.lockstepignore while walking
    pub respect_ignore_files: bool,

    /// Log verbosity from -v
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            spec_path: None,
            strict: false,
            threads: default_threads(),
            format: OutputFormat::Human,
            progress: false,
            respect_ignore_files: true,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), LockError> {
        if !self.root.is_dir() {
            return Err(ConfigError::Invalid(format!(
                "Root is not a directory: {}",
                self.root.display()
            ))
            .into());
        }

        if self.threads == 0 {
            return Err(ConfigError::Invalid("--jobs must be at least 1".to_string()).into());
        }

        Ok(())
    }

    /// Path of the specification file to load
    ///
    /// An explicit path is used as given; otherwise the first existing
    /// candidate under the root wins.
    pub fn locate_spec(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.spec_path {
            return Ok(path.clone());
        }

        SPEC_CANDIDATES
            .iter()
            .map(|name| self.root.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| ConfigError::NotFound {
                root: self.root.clone(),
                candidates: SPEC_CANDIDATES.join(", "),
            })
    }

    /// Resolve a root-relative path
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }
}

impl TryFrom<&Cli> for Config {
    type Error = LockError;

    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        let root = match &cli.root {
            Some(root) => root.clone(),
            None => std::env::current_dir()?,
        };
        let root = std::fs::canonicalize(&root).map_err(|e| {
            ConfigError::Invalid(format!("Root {} is not accessible: {}", root.display(), e))
        })?;

        let progress = !cli.no_progress
            && cli.format == OutputFormat::Human
            && console::Term::stderr().is_term();

        let config = Config {
            root,
            spec_path: cli.config.clone(),
            strict: cli.strict,
            threads: cli.jobs.unwrap_or_else(default_threads),
            format: cli.format,
            progress,
            respect_ignore_files: !cli.no_ignore,
            verbosity: cli.verbose,
        };
        config.validate()?;
        Ok(config)
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

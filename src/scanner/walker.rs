//! Glob resolution against the file system

use super::GlobPattern;
use crate::config::Config;
use crate::types::LockError;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Per-directory ignore file honoured alongside `.gitignore` and `.ignore`
pub const IGNORE_FILE_NAME: &str = ".lockstepignore";

/// Resolve a glob to the files it names
///
/// A literal glob resolves to its one path and must exist as a file. A
/// wildcard glob walks its literal base recursively and keeps every file
/// whose remaining segments match.
///
/// # Returns
/// * `Ok(paths)` - absolute paths, deduplicated and sorted (possibly empty)
/// * `Err(LockError::GlobResolution)` - literal path missing or not a file
///
/// # Errors
/// * Unreadable directories are logged and skipped
/// * Directory symlinks are not followed and `.git` is never entered
pub fn resolve_glob(pattern: &GlobPattern, config: &Config) -> Result<Vec<PathBuf>, LockError> {
    let base = pattern.base_path(&config.root);

    if pattern.is_literal() {
        return if base.is_file() {
            Ok(vec![base])
        } else {
            Err(LockError::GlobResolution { path: base })
        };
    }

    if !base.is_dir() {
        debug!(glob = %pattern, base = %base.display(), "glob base does not exist");
        return Ok(Vec::new());
    }

    let mut builder = ignore::WalkBuilder::new(&base);
    builder
        .standard_filters(config.respect_ignore_files)
        .hidden(false)
        .require_git(false)
        .follow_links(false)
        .max_depth(pattern.max_depth())
        .filter_entry(|entry| entry.file_name() != ".git");
    if config.respect_ignore_files {
        builder.add_custom_ignore_filename(IGNORE_FILE_NAME);
    }

    let mut found = BTreeSet::new();
    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!(glob = %pattern, "skipping unreadable entry: {}", e);
                continue;
            }
        };

        let is_file = match entry.file_type() {
            Some(ft) if ft.is_file() => true,
            Some(ft) if ft.is_symlink() => entry.path().is_file(),
            _ => false,
        };
        if !is_file {
            continue;
        }

        let Some(parts) = relative_parts(entry.path(), &base) else {
            warn!(path = %entry.path().display(), "skipping path that is not valid UTF-8");
            continue;
        };
        if pattern.matches_relative(&parts) {
            found.insert(entry.into_path());
        }
    }

    debug!(glob = %pattern, matched = found.len(), "resolved glob");
    Ok(found.into_iter().collect())
}

fn relative_parts<'a>(path: &'a Path, base: &Path) -> Option<Vec<&'a str>> {
    path.strip_prefix(base)
        .ok()?
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect()
}

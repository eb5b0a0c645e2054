//! Glob patterns with segment-wise matching
//!
//! `*` stays inside one path segment and `**` must be a whole segment
//! matching zero or more segments. Single segments are compiled with
//! globset; the `**` expansion is done here so the walk can stop at the
//! deepest level a pattern can reach.

use crate::types::ConfigError;
use globset::{GlobBuilder, GlobMatcher};
use std::fmt;
use std::path::{Path, PathBuf};

/// One path segment after the literal base
#[derive(Debug, Clone)]
pub enum Segment {
    /// `**`
    AnyDepth,

    /// Any other segment, wildcard or literal
    Name(GlobMatcher),
}

/// Parsed glob
#[derive(Debug, Clone)]
pub struct GlobPattern {
    raw: String,
    normalized: String,

    /// Leading literal segments, walked from directly
    base: Vec<String>,

    /// Segments matched against paths below the base
    segments: Vec<Segment>,
}

impl GlobPattern {
    /// Parse and compile a glob
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidGlob {
            glob: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.contains('\0') {
            return Err(invalid("glob contains a NUL byte"));
        }

        if raw.starts_with('/') {
            return Err(invalid("glob must be relative to the root"));
        }

        let parts: Vec<&str> = raw
            .split('/')
            .filter(|part| !part.is_empty() && *part != ".")
            .collect();
        if parts.is_empty() {
            return Err(invalid("glob names no file"));
        }
        if parts.contains(&"..") {
            return Err(invalid("'..' segments are not allowed"));
        }

        let mut base = Vec::new();
        let mut segments = Vec::new();
        for part in &parts {
            let wild = *part == "**" || has_wildcard(part);
            if segments.is_empty() && !wild {
                base.push(part.to_string());
                continue;
            }

            if *part == "**" {
                segments.push(Segment::AnyDepth);
            } else if part.contains("**") {
                return Err(invalid("'**' must be a whole path segment"));
            } else {
                let matcher = GlobBuilder::new(part)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| invalid(&e.kind().to_string()))?
                    .compile_matcher();
                segments.push(Segment::Name(matcher));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            normalized: parts.join("/"),
            base,
            segments,
        })
    }

    /// The glob as declared
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Canonical spelling (`./a//b` -> `a/b`)
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// True when the glob has no wildcard and names exactly one path
    pub fn is_literal(&self) -> bool {
        self.segments.is_empty()
    }

    /// Directory to walk from (or the file itself for a literal glob)
    pub fn base_path(&self, root: &Path) -> PathBuf {
        self.base
            .iter()
            .fold(root.to_path_buf(), |path, part| path.join(part))
    }

    /// Deepest level below the base a match can sit at, `None` when unbounded
    pub fn max_depth(&self) -> Option<usize> {
        if self
            .segments
            .iter()
            .any(|segment| matches!(segment, Segment::AnyDepth))
        {
            None
        } else {
            Some(self.segments.len())
        }
    }

    /// Match a path given as its segments relative to the base
    pub fn matches_relative(&self, parts: &[&str]) -> bool {
        match_segments(&self.segments, parts)
    }
}

impl PartialEq for GlobPattern {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for GlobPattern {}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn has_wildcard(part: &str) -> bool {
    part.contains(['*', '?', '[', '{'])
}

fn match_segments(segments: &[Segment], parts: &[&str]) -> bool {
    match segments.split_first() {
        None => parts.is_empty(),
        Some((Segment::AnyDepth, rest)) => {
            (0..=parts.len()).any(|skip| match_segments(rest, &parts[skip..]))
        }
        Some((Segment::Name(matcher), rest)) => match parts.split_first() {
            Some((part, tail)) => matcher.is_match(part) && match_segments(rest, tail),
            None => false,
        },
    }
}

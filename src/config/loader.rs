//! Declarative specification loader
//!
//! Reads `lock.yml`/`lock.toml`, validates every rule and produces a
//! [`RuleSet`]. Validation runs to completion before any target file is
//! touched; the first problem aborts loading.

use crate::matcher::HoleTemplate;
use crate::scanner::GlobPattern;
use crate::types::{ConfigError, CopyRule, LineGroup, LineRule, LockTable, Rule, RuleSet};
use camino::Utf8PathBuf;
use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use tracing::debug;

/// Serialization format of a specification file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Yaml,
    Toml,
}

impl SpecFormat {
    /// Pick the format from the file extension
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yml") | Some("yaml") => Ok(SpecFormat::Yaml),
            Some("toml") => Ok(SpecFormat::Toml),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SpecFormat::Yaml => "YAML",
            SpecFormat::Toml => "TOML",
        }
    }
}

/// Read and validate a specification file
pub fn load_rule_set(path: &Path) -> Result<RuleSet, ConfigError> {
    let format = SpecFormat::from_path(path)?;
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let rules = parse_rule_set(&text, format)?;
    debug!(
        spec = %path.display(),
        rules = rules.rules.len(),
        keys = rules.lock.len(),
        "loaded lock specification"
    );
    Ok(rules)
}

/// Parse and validate specification text
pub fn parse_rule_set(text: &str, format: SpecFormat) -> Result<RuleSet, ConfigError> {
    let raw: RawSpec = match format {
        SpecFormat::Yaml => serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
            format: format.name(),
            message: e.to_string(),
        })?,
        SpecFormat::Toml => toml::from_str(text).map_err(|e| ConfigError::Parse {
            format: format.name(),
            message: e.to_string(),
        })?,
    };

    raw.into_rule_set()
}

/// Top-level document shape
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSpec {
    #[serde(default)]
    files: Entries<Vec<String>>,

    #[serde(default)]
    lines: Entries<Entries<String>>,

    lock: Entries<LockScalar>,
}

/// Mapping kept in declaration order, duplicates included
///
/// Both YAML and TOML mappings lose order and silently drop repeated keys
/// when read into a map type, so entries are collected as a list and
/// checked afterwards.
#[derive(Debug)]
struct Entries<V>(Vec<(String, V)>);

impl<V> Default for Entries<V> {
    fn default() -> Self {
        Entries(Vec::new())
    }
}

impl<V> Entries<V> {
    /// Fail on the first key seen twice
    fn check_unique(&self, section: &str) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (key, _) in &self.0 {
            if !seen.insert(key.as_str()) {
                return Err(ConfigError::DuplicateEntry {
                    section: section.to_string(),
                    key: key.clone(),
                });
            }
        }
        Ok(())
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Entries<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
            type Value = Entries<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(Entries(Vec::new()))
            }

            fn visit_none<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(Entries(Vec::new()))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_any(EntriesVisitor(PhantomData))
    }
}

/// Lock value as written in the document
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LockScalar {
    Text(String),
    Integer(i64),
    Flag(bool),
    Other(IgnoredAny),
}

impl LockScalar {
    fn into_text(self, key: &str) -> Result<String, ConfigError> {
        match self {
            LockScalar::Text(text) => Ok(text),
            LockScalar::Integer(n) => Ok(n.to_string()),
            LockScalar::Flag(b) => Ok(b.to_string()),
            LockScalar::Other(_) => Err(ConfigError::UnsupportedValue {
                key: key.to_string(),
            }),
        }
    }
}

impl RawSpec {
    fn into_rule_set(self) -> Result<RuleSet, ConfigError> {
        let lock = build_lock_table(self.lock)?;

        let mut rules = Vec::with_capacity(self.files.0.len() + self.lines.0.len());
        rules.extend(build_copy_rules(self.files)?.into_iter().map(Rule::Copy));
        rules.extend(build_line_groups(self.lines, &lock)?.into_iter().map(Rule::Lines));

        Ok(RuleSet { rules, lock })
    }
}

fn build_lock_table(entries: Entries<LockScalar>) -> Result<LockTable, ConfigError> {
    entries.check_unique("lock")?;

    let mut table = LockTable::new();
    for (key, value) in entries.0 {
        let text = value.into_text(&key)?;
        table.insert(key, text);
    }
    Ok(table)
}

fn build_copy_rules(entries: Entries<Vec<String>>) -> Result<Vec<CopyRule>, ConfigError> {
    entries.check_unique("files")?;

    let mut sources = HashSet::new();
    let mut rules = Vec::with_capacity(entries.0.len());

    for (raw_source, raw_destinations) in entries.0 {
        let source = normalize_copy_path(&raw_source)?;
        if !sources.insert(source.clone()) {
            return Err(ConfigError::DuplicateEntry {
                section: "files".to_string(),
                key: raw_source,
            });
        }

        let mut seen = HashSet::new();
        let mut destinations = Vec::with_capacity(raw_destinations.len());
        for raw_destination in raw_destinations {
            let destination = normalize_copy_path(&raw_destination)?;
            if destination == source {
                return Err(ConfigError::MalformedPath {
                    path: raw_destination,
                    reason: "destination is the copy source itself".to_string(),
                });
            }
            if !seen.insert(destination.clone()) {
                return Err(ConfigError::DuplicateEntry {
                    section: format!("files.{}", raw_source),
                    key: raw_destination,
                });
            }
            destinations.push(destination);
        }

        rules.push(CopyRule {
            source,
            destinations,
        });
    }

    check_copy_outputs(&rules)?;
    Ok(rules)
}

/// Every destination has exactly one writer and feeds no other copy
fn check_copy_outputs(rules: &[CopyRule]) -> Result<(), ConfigError> {
    let mut writers: HashMap<&Utf8PathBuf, &Utf8PathBuf> = HashMap::new();

    for rule in rules {
        for destination in &rule.destinations {
            if let Some(other) = writers.insert(destination, &rule.source) {
                return Err(ConfigError::CopyConflict {
                    path: destination.to_string(),
                    reason: format!("written by copies of '{}' and '{}'", other, rule.source),
                });
            }
            if rules.iter().any(|r| &r.source == destination) {
                return Err(ConfigError::CopyConflict {
                    path: destination.to_string(),
                    reason: "a copy destination cannot be the source of another copy rule"
                        .to_string(),
                });
            }
        }
    }

    Ok(())
}

fn build_line_groups(
    entries: Entries<Entries<String>>,
    lock: &LockTable,
) -> Result<Vec<LineGroup>, ConfigError> {
    entries.check_unique("lines")?;

    let mut owned: HashSet<(String, String)> = HashSet::new();
    let mut groups = Vec::with_capacity(entries.0.len());

    for (raw_glob, patterns) in entries.0 {
        patterns.check_unique(&format!("lines.{}", raw_glob))?;
        let glob = GlobPattern::parse(&raw_glob)?;

        let mut rules = Vec::with_capacity(patterns.0.len());
        for (pattern, key) in patterns.0 {
            if !owned.insert((glob.normalized().to_string(), pattern.clone())) {
                return Err(ConfigError::DuplicateRule {
                    glob: raw_glob,
                    pattern,
                });
            }

            let template = HoleTemplate::compile(&pattern)?;
            if !lock.contains(&key) {
                return Err(ConfigError::UnknownKey {
                    glob: raw_glob,
                    pattern,
                    key,
                });
            }

            rules.push(LineRule {
                glob: glob.clone(),
                template,
                key,
            });
        }

        if rules.is_empty() {
            debug!(glob = %raw_glob, "skipping line group without rules");
            continue;
        }
        groups.push(LineGroup { glob, rules });
    }

    Ok(groups)
}

/// Validate a copy rule path and bring it to `a/b/c` form
fn normalize_copy_path(raw: &str) -> Result<Utf8PathBuf, ConfigError> {
    let malformed = |reason: &str| ConfigError::MalformedPath {
        path: raw.to_string(),
        reason: reason.to_string(),
    };

    if raw.trim().is_empty() {
        return Err(malformed("path is empty"));
    }
    if raw.contains('\0') {
        return Err(malformed("path contains a NUL byte"));
    }
    if raw.contains(['*', '?', '[', ']', '{', '}']) {
        return Err(malformed("copy paths are literal, glob characters are not allowed"));
    }
    if raw.starts_with('/') {
        return Err(malformed("path must be relative to the root"));
    }

    let mut segments = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(malformed("'..' segments are not allowed")),
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(malformed("path names the root directory"));
    }
    Ok(Utf8PathBuf::from(segments.join("/")))
}

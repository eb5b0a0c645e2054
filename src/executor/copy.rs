//! Copy rule engine and atomic file replacement

use crate::hash::{compute_hash, describe, hash_bytes};
use crate::types::{CopyRule, LockError};
use camino::Utf8PathBuf;
use std::ffi::OsString;
use std::fs::{self, File, Permissions};
use std::io::{self, Write};
use std::path::Path;

/// Suffix of the staging file written next to a destination
const PART_SUFFIX: &str = ".lockstep-part";

/// Copy source loaded once per run
#[derive(Debug)]
pub struct CopySource {
    /// Rule label used in issues
    pub label: String,

    /// Source path relative to the root
    pub path: Utf8PathBuf,

    pub bytes: Vec<u8>,
    pub hash: [u8; 32],
}

impl CopySource {
    /// Read the source of `rule` under `root`
    pub fn load(rule: &CopyRule, root: &Path) -> Result<Self, LockError> {
        let full_path = root.join(rule.source.as_std_path());
        let bytes = fs::read(&full_path).map_err(|source| LockError::SourceUnreadable {
            path: full_path.clone(),
            source,
        })?;

        Ok(Self {
            label: format!("copy {}", rule.source),
            path: rule.source.clone(),
            hash: hash_bytes(&bytes),
            bytes,
        })
    }

    /// Short digest description shown in drift records
    pub fn fingerprint(&self) -> String {
        describe(&self.hash, self.bytes.len() as u64)
    }
}

/// Destination state relative to its source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyState {
    Identical,
    Missing,
    Differs { fingerprint: String },
}

/// Compare a destination against the source (length first, then digest)
pub fn check_copy(source: &CopySource, destination: &Path) -> Result<CopyState, LockError> {
    let metadata = match fs::metadata(destination) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CopyState::Missing),
        Err(e) => return Err(LockError::from_io(destination, e)),
    };

    if !metadata.is_file() {
        return Err(LockError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", destination.display()),
        )));
    }

    // A length mismatch settles it without reading the destination
    if metadata.len() != source.bytes.len() as u64 {
        return Ok(CopyState::Differs {
            fingerprint: format!("{} bytes", metadata.len()),
        });
    }

    let hash = compute_hash(destination).map_err(|e| LockError::from_io(destination, e))?;
    if hash == source.hash {
        Ok(CopyState::Identical)
    } else {
        Ok(CopyState::Differs {
            fingerprint: describe(&hash, metadata.len()),
        })
    }
}

/// Make `destination` byte-identical to the source
///
/// # Returns
/// * `Ok(true)` - the destination was written
/// * `Ok(false)` - already identical, nothing touched
pub fn apply_copy(source: &CopySource, destination: &Path) -> Result<bool, LockError> {
    match check_copy(source, destination)? {
        CopyState::Identical => Ok(false),
        CopyState::Missing | CopyState::Differs { .. } => {
            write_atomic(destination, &source.bytes)?;
            Ok(true)
        }
    }
}

/// Replace a whole file atomically
///
/// 1. Write to a hidden `.part` sibling
/// 2. Flush and sync to disk
/// 3. Carry over permissions of the file being replaced
/// 4. Rename over the destination
///
/// Parent directories are created as needed. The staging file is removed if
/// any step fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LockError> {
    let file_name = path.file_name().ok_or_else(|| {
        LockError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} does not name a file", path.display()),
        ))
    })?;
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    fs::create_dir_all(parent).map_err(|e| LockError::from_io(parent, e))?;

    let mut part_name = OsString::from(".");
    part_name.push(file_name);
    part_name.push(PART_SUFFIX);
    let part_path = parent.join(part_name);

    let permissions = fs::metadata(path).ok().map(|m| m.permissions());

    let result = stage_and_commit(&part_path, path, bytes, permissions);
    if result.is_err() {
        let _ = fs::remove_file(&part_path);
    }
    result.map_err(|e| LockError::from_io(path, e))
}

fn stage_and_commit(
    part_path: &Path,
    destination: &Path,
    bytes: &[u8],
    permissions: Option<Permissions>,
) -> io::Result<()> {
    let mut part_file = File::create(part_path)?;
    part_file.write_all(bytes)?;
    part_file.sync_all()?;

    // Drop the handle before rename (required on Windows)
    drop(part_file);

    if let Some(permissions) = permissions {
        fs::set_permissions(part_path, permissions)?;
    }

    fs::rename(part_path, destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source_in(dir: &TempDir, content: &[u8]) -> CopySource {
        fs::write(dir.path().join("LICENSE"), content).expect("write source");
        let rule = CopyRule {
            source: Utf8PathBuf::from("LICENSE"),
            destinations: vec![Utf8PathBuf::from("a/LICENSE")],
        };
        CopySource::load(&rule, dir.path()).expect("load source")
    }

    #[test]
    fn test_load_missing_source() {
        let dir = TempDir::new().expect("create tempdir");
        let rule = CopyRule {
            source: Utf8PathBuf::from("LICENSE"),
            destinations: vec![],
        };
        let err = CopySource::load(&rule, dir.path()).expect_err("missing source");
        assert!(matches!(err, LockError::SourceUnreadable { .. }));
    }

    #[test]
    fn test_check_states() {
        let dir = TempDir::new().expect("create tempdir");
        let source = source_in(&dir, b"MIT License\n");
        let destination = dir.path().join("copy");

        assert_eq!(check_copy(&source, &destination).unwrap(), CopyState::Missing);

        fs::write(&destination, b"MIT License\n").unwrap();
        assert_eq!(check_copy(&source, &destination).unwrap(), CopyState::Identical);

        fs::write(&destination, b"MIT Licence\n").unwrap();
        assert!(matches!(
            check_copy(&source, &destination).unwrap(),
            CopyState::Differs { .. }
        ));
    }

    #[test]
    fn test_apply_creates_parents_and_skips_identical() {
        let dir = TempDir::new().expect("create tempdir");
        let source = source_in(&dir, b"Apache License\r\nVersion 2.0\r\n");
        let destination = dir.path().join("nested/deeper/LICENSE");

        assert!(apply_copy(&source, &destination).unwrap());
        assert_eq!(fs::read(&destination).unwrap(), source.bytes);
        assert!(!apply_copy(&source, &destination).unwrap());
    }

    #[test]
    fn test_write_atomic_leaves_no_staging_file() {
        let dir = TempDir::new().expect("create tempdir");
        let path = dir.path().join("out.txt");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"two");
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![OsString::from("out.txt")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("create tempdir");
        let path = dir.path().join("script.sh");
        fs::write(&path, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, Permissions::from_mode(0o755)).unwrap();

        write_atomic(&path, b"#!/bin/sh\necho hi\n").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_directory_destination_is_error() {
        let dir = TempDir::new().expect("create tempdir");
        let source = source_in(&dir, b"text");
        fs::create_dir(dir.path().join("taken")).unwrap();
        assert!(check_copy(&source, &dir.path().join("taken")).is_err());
    }

    #[test]
    fn test_fingerprint_mentions_length() {
        let dir = TempDir::new().expect("create tempdir");
        let source = source_in(&dir, b"12345");
        assert!(source.fingerprint().ends_with("(5 bytes)"));
    }
}

//! Hashing utilities

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Compute Blake3 hash of a file
///
/// The file is streamed in 64KB chunks so large destinations are never held
/// in memory just to be compared.
///
/// # Example
/// ```no_run
/// use lockstep::hash::compute_hash;
/// use std::path::Path;
///
/// let hash = compute_hash(Path::new("LICENSE"))?;
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn compute_hash(file_path: &Path) -> io::Result<[u8; 32]> {
    let mut file = File::open(file_path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(*hasher.finalize().as_bytes())
}

/// Blake3 hash of an in-memory buffer
pub fn hash_bytes(bytes: &[u8]) -> [u8; 32] {
    *blake3::hash(bytes).as_bytes()
}

/// First 12 hex digits of a digest
pub fn short_hex(hash: &[u8; 32]) -> String {
    hash[..6].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Compact content description for reports: `blake3:<prefix> (<n> bytes)`
pub fn describe(hash: &[u8; 32], len: u64) -> String {
    format!("blake3:{} ({} bytes)", short_hex(hash), len)
}

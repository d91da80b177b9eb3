//! Deterministic content hashing of directory trees.
//!
//! The same hash is computed at install time and at validation time, so it
//! must be stable across filesystems: enumeration order, timestamps, and
//! permissions never influence the result. Only relative paths and file
//! bytes do.

use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

pub struct DirectoryChecksumCalculator;

impl DirectoryChecksumCalculator {
    /// Compute a `sha256:<hex>` hash over every file under `dir`.
    ///
    /// Relative paths are normalized to `/` separators and sorted before
    /// hashing. Each file contributes its path, its length, and its bytes.
    pub fn checksum(dir: &Path) -> io::Result<String> {
        let mut files = Vec::new();
        Self::collect(dir, "", &mut files)?;
        files.sort();

        let mut hasher = Sha256::new();
        for rel in &files {
            hasher.update(rel.as_bytes());
            hasher.update([0u8]);
            let bytes = fs::read(dir.join(rel))?;
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }
        Ok(format!("sha256:{:x}", hasher.finalize()))
    }

    fn collect(dir: &Path, prefix: &str, out: &mut Vec<String>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let rel = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            if entry.file_type()?.is_dir() {
                Self::collect(&entry.path(), &rel, out)?;
            } else {
                out.push(rel);
            }
        }
        Ok(())
    }
}

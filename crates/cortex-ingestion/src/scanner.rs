//! The folder scanner (spec §4.3.2): walks a folder's file tree, applying
//! an extension allowlist and a per-file size cap, and reports a content
//! hash for every surviving file so the caller (`CodeIndexer`) can classify
//! each as unchanged/new/changed/deleted against its prior scan.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use cortex_core::error::{CortexError, Result};
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};

/// Default per-file size cap: 1 MiB (spec §4.3.2).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Source-code extensions the scanner will read. Binary/media files and
/// vendored dependency trees are excluded via `IGNORED_DIR_NAMES` below and
/// by falling outside this allowlist.
const ALLOWED_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "mjs", "py", "go", "java", "c", "h", "cc", "cpp", "cxx",
    "hpp", "rb", "php", "swift", "kt", "kts", "md", "markdown", "toml", "yaml", "yml", "json",
    "sh", "bash",
];

const IGNORED_DIR_NAMES: &[&str] = &["node_modules", "vendor", "target", ".git", "dist", "build"];

pub fn is_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub content_hash: String,
    pub size: u64,
    pub mod_time: DateTime<Utc>,
    pub extension: String,
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Walks `root`, returning every file that passes the extension allowlist
/// and size cap. Directories named in `IGNORED_DIR_NAMES` are pruned
/// entirely, matching `ignore`'s `.gitignore`-aware walk (teacher-grounded
/// on `ignore::WalkBuilder` usage across the pack's indexers).
pub fn scan_folder(root: &Path, max_file_size: u64) -> Result<Vec<ScannedFile>> {
    if !root.is_dir() {
        return Err(CortexError::invalid_argument(format!(
            "{} is not a readable directory",
            root.display()
        )));
    }

    let mut out = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| !IGNORED_DIR_NAMES.contains(&name))
                .unwrap_or(true)
        })
        .build();

    for entry in walker {
        let entry = entry.map_err(|e| CortexError::internal(format!("scan failed: {e}")))?;
        let path = entry.path();
        if !entry.file_type().is_some_and(|t| t.is_file()) || !is_allowed_extension(path) {
            continue;
        }
        let metadata = std::fs::metadata(path)?;
        if metadata.len() > max_file_size {
            continue;
        }
        let bytes = std::fs::read(path)?;
        let relative_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        out.push(ScannedFile {
            relative_path,
            absolute_path: path.to_path_buf(),
            content_hash: hash_bytes(&bytes),
            size: metadata.len(),
            mod_time: metadata
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH)
                .into(),
            extension: path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_string(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scans_only_allowed_extensions_and_respects_size_cap() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();
        fs::write(dir.path().join("logo.png"), [0u8; 10]).unwrap();
        fs::write(dir.path().join("huge.rs"), "x".repeat(100)).unwrap();

        let found = scan_folder(dir.path(), 50).unwrap();
        let names: Vec<_> = found.iter().map(|f| f.relative_path.clone()).collect();
        assert!(names.contains(&"main.rs".to_string()));
        assert!(!names.contains(&"logo.png".to_string()));
        assert!(!names.contains(&"huge.rs".to_string()));
    }

    #[test]
    fn prunes_ignored_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/dep.js"), "x").unwrap();
        fs::write(dir.path().join("app.js"), "x").unwrap();

        let found = scan_folder(dir.path(), DEFAULT_MAX_FILE_SIZE).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relative_path, "app.js");
    }

    #[test]
    fn identical_content_hashes_identically() {
        assert_eq!(hash_bytes(b"same"), hash_bytes(b"same"));
        assert_ne!(hash_bytes(b"same"), hash_bytes(b"different"));
    }
}

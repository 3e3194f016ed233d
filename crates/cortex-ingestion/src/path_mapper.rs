//! The `PathMapper` collaborator (spec §6.1): translates between the
//! caller's logical path and the path the watcher actually observes on
//! disk, e.g. when the indexer runs inside a container that bind-mounts
//! the host tree at a different prefix.

use std::path::{Path, PathBuf};

use cortex_core::error::{CortexError, Result};

#[derive(Debug, Clone, Default)]
pub struct PathMapper {
    /// `(logical_prefix, observed_prefix)`, longest logical prefix first so
    /// `resolve` picks the most specific match.
    mappings: Vec<(String, String)>,
}

impl PathMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the `"/a\u{2192}/b,/c\u{2192}/d"` format from spec §6.1
    /// (`code_index.path_mappings`).
    pub fn parse(spec: &str) -> Result<Self> {
        let mut mappings = Vec::new();
        for pair in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (logical, observed) = pair.split_once('\u{2192}').ok_or_else(|| {
                CortexError::invalid_argument(format!(
                    "path mapping '{pair}' is not of the form 'logical\u{2192}observed'"
                ))
            })?;
            mappings.push((logical.trim().to_string(), observed.trim().to_string()));
        }
        mappings.sort_by_key(|(logical, _)| std::cmp::Reverse(logical.len()));
        Ok(Self { mappings })
    }

    pub fn resolve(&self, logical_path: &Path) -> PathBuf {
        let logical_str = logical_path.to_string_lossy();
        for (logical_prefix, observed_prefix) in &self.mappings {
            if let Some(rest) = logical_str.strip_prefix(logical_prefix.as_str()) {
                return PathBuf::from(format!("{observed_prefix}{rest}"));
            }
        }
        logical_path.to_path_buf()
    }

    pub fn reverse(&self, observed_path: &Path) -> PathBuf {
        let observed_str = observed_path.to_string_lossy();
        for (logical_prefix, observed_prefix) in &self.mappings {
            if let Some(rest) = observed_str.strip_prefix(observed_prefix.as_str()) {
                return PathBuf::from(format!("{logical_prefix}{rest}"));
            }
        }
        observed_path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_and_reverse_round_trip() {
        let mapper = PathMapper::parse("/workspace\u{2192}/host/project").unwrap();
        let observed = mapper.resolve(Path::new("/workspace/src/main.rs"));
        assert_eq!(observed, PathBuf::from("/host/project/src/main.rs"));
        let logical = mapper.reverse(&observed);
        assert_eq!(logical, PathBuf::from("/workspace/src/main.rs"));
    }

    #[test]
    fn unmapped_paths_pass_through_unchanged() {
        let mapper = PathMapper::parse("/a\u{2192}/b").unwrap();
        let path = Path::new("/unrelated/file.rs");
        assert_eq!(mapper.resolve(path), path.to_path_buf());
    }

    #[test]
    fn most_specific_prefix_wins() {
        let mapper = PathMapper::parse("/a\u{2192}/x,/a/b\u{2192}/y").unwrap();
        assert_eq!(
            mapper.resolve(Path::new("/a/b/c.rs")),
            PathBuf::from("/y/c.rs")
        );
    }

    #[test]
    fn malformed_pair_is_invalid_argument() {
        assert!(PathMapper::parse("/a-no-arrow-/b").is_err());
    }

    #[test]
    fn empty_spec_is_identity() {
        let mapper = PathMapper::parse("").unwrap();
        let path = Path::new("/anything");
        assert_eq!(mapper.resolve(path), path.to_path_buf());
    }
}

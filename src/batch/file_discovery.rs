//! File discovery for batch processing.

use std::path::{Path, PathBuf};

use crate::error::{Result, TranscodeError};

/// Finds DICOM files under a directory.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// Whether to scan recursively.
    recursive: bool,

    /// File name patterns to match; empty matches every file.
    patterns: Vec<String>,

    /// Maximum depth for recursive scanning (None = unlimited).
    max_depth: Option<usize>,
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl FileDiscovery {
    /// Match `*.dcm` (case-insensitive), non-recursive.
    pub fn new() -> Self {
        Self {
            recursive: false,
            patterns: vec!["*.dcm".to_string()],
            max_depth: None,
        }
    }

    /// Enable recursive scanning.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set maximum depth for recursive scanning.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set file patterns to match.
    pub fn patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }

    /// Discover files in the given directory, sorted by path.
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(TranscodeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Directory not found: {}", dir.display()),
            )));
        }

        let mut files = Vec::new();
        self.discover_recursive(dir, 0, &mut files)?;
        files.sort();

        log::debug!("Discovered {} files in {}", files.len(), dir.display());
        Ok(files)
    }

    fn discover_recursive(&self, dir: &Path, depth: usize, files: &mut Vec<PathBuf>) -> Result<()> {
        if let Some(max) = self.max_depth {
            if depth > max {
                return Ok(());
            }
        }

        let entries = std::fs::read_dir(dir).map_err(|e| {
            TranscodeError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read directory {}: {}", dir.display(), e),
            ))
        })?;

        for entry in entries {
            let path = entry?.path();

            // symlinks are not followed
            let metadata = match std::fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            if metadata.is_dir() {
                if self.recursive {
                    self.discover_recursive(&path, depth + 1, files)?;
                }
            } else if metadata.is_file() && self.matches_pattern(&path) {
                files.push(path);
            }
        }

        Ok(())
    }

    fn matches_pattern(&self, path: &Path) -> bool {
        let file_name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_lowercase(),
            None => return false,
        };

        self.patterns.is_empty()
            || self
                .patterns
                .iter()
                .any(|pattern| glob_match(file_name.as_bytes(), pattern.to_lowercase().as_bytes()))
    }
}

/// Glob matching supporting `*` and `?`.
fn glob_match(text: &[u8], pattern: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|i| glob_match(&text[i..], rest)),
        Some((&pc, rest)) => match text.split_first() {
            Some((&tc, text_rest)) if pc == b'?' || pc == tc => glob_match(text_rest, rest),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_directory() -> TempDir {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("test1.dcm"), "content").unwrap();
        fs::write(dir.path().join("test2.DCM"), "content").unwrap();
        fs::write(dir.path().join("notes.txt"), "content").unwrap();

        let subdir = dir.path().join("series");
        fs::create_dir(&subdir).unwrap();
        fs::write(subdir.join("nested.dcm"), "content").unwrap();

        dir
    }

    #[test]
    fn test_discovery_non_recursive() {
        let dir = create_test_directory();
        let files = FileDiscovery::new().discover(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_discovery_recursive() {
        let dir = create_test_directory();
        let files = FileDiscovery::new().recursive(true).discover(dir.path()).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().any(|f| f.ends_with("series/nested.dcm")));
    }

    #[test]
    fn test_discovery_max_depth() {
        let dir = create_test_directory();
        let files = FileDiscovery::new()
            .recursive(true)
            .max_depth(0)
            .discover(dir.path())
            .unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_empty_patterns_match_everything() {
        let dir = create_test_directory();
        let files = FileDiscovery::new()
            .patterns(Vec::new())
            .discover(dir.path())
            .unwrap();
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_discovery_nonexistent_directory() {
        let result = FileDiscovery::new().discover(Path::new("/nonexistent/path"));
        assert!(result.is_err());
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match(b"test.dcm", b"*.dcm"));
        assert!(glob_match(b"test.dcm", b"test.*"));
        assert!(glob_match(b"test.dcm", b"t?st.dcm"));
        assert!(glob_match(b"img0001", b"img*"));
        assert!(!glob_match(b"test.dcm", b"*.txt"));
        assert!(!glob_match(b"test.dcm", b"foo.dcm"));
    }
}

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::types::{PaperdocError, Result};

/// Default maximum file size (1MB)
const DEFAULT_MAX_FILE_SIZE: u64 = 1_048_576;

/// Walks a directory tree and yields files matching an extension filter.
///
/// Honors `.gitignore`, never follows symlinks, and returns files sorted by
/// path so every consumer sees the same order across runs.
pub struct FileScanner {
    root: PathBuf,
    extensions: Vec<String>,
    exclude: Vec<glob::Pattern>,
    max_file_size: u64,
}

impl FileScanner {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extensions: Vec::new(),
            exclude: Vec::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Restrict to these extensions (case-insensitive, leading dot optional)
    pub fn with_extensions(mut self, extensions: &[String]) -> Self {
        self.extensions = extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Exclude paths (relative to root) matching these globs; invalid globs are ignored
    pub fn with_exclude(mut self, patterns: &[String]) -> Self {
        self.exclude = patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Ignoring invalid exclude pattern");
                    None
                }
            })
            .collect();
        self
    }

    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate matching files.
    ///
    /// Fails only when the root itself cannot be read; per-entry problems
    /// are returned as skipped files.
    pub fn scan(&self) -> Result<ScanResult> {
        let metadata = std::fs::metadata(&self.root).map_err(|e| PaperdocError::SourceTree {
            path: self.root.display().to_string(),
            message: e.to_string(),
        })?;
        if !metadata.is_dir() {
            return Err(PaperdocError::SourceTree {
                path: self.root.display().to_string(),
                message: "not a directory".to_string(),
            });
        }

        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .require_git(false)
            .follow_links(false) // Security: prevent symlink traversal attacks
            .build();

        let mut result = ScanResult::default();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    result.skipped.push(SkippedFile {
                        path: error_path(&e).map(|p| self.relative(p)).unwrap_or_default(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let relative = self.relative(path);
            if self.should_exclude(&relative) || !self.check_extension(path) {
                continue;
            }

            match entry.metadata() {
                Ok(metadata) if metadata.len() > self.max_file_size => {
                    debug!(path = %relative, size = metadata.len(), "Skipping oversized file");
                    result.skipped.push(SkippedFile {
                        path: relative,
                        reason: format!(
                            "file size {} exceeds limit {}",
                            metadata.len(),
                            self.max_file_size
                        ),
                    });
                }
                Ok(metadata) => result.files.push(ScannedFile {
                    path: path.to_path_buf(),
                    relative,
                    size: metadata.len(),
                }),
                Err(e) => {
                    warn!(path = %relative, error = %e, "Skipping unreadable file");
                    result.skipped.push(SkippedFile {
                        path: relative,
                        reason: e.to_string(),
                    });
                }
            }
        }

        result.files.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(result)
    }

    /// Root-relative, `/`-separated path
    fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn should_exclude(&self, relative: &str) -> bool {
        self.exclude.iter().any(|p| p.matches(relative))
    }

    fn check_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

/// Path carried by a walk error, if any
fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// Root-relative, `/`-separated path
    pub relative: String,
    pub size: u64,
}

/// A file excluded from the run, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub files: Vec<ScannedFile>,
    pub skipped: Vec<SkippedFile>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_filters_by_extension_and_sorts() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "src/b.cpp", "int b() { return 1; }");
        touch(temp.path(), "src/a.hpp", "int a();");
        touch(temp.path(), "README.md", "# readme");

        let result = FileScanner::new(temp.path())
            .with_extensions(&["cpp".to_string(), ".HPP".to_string()])
            .scan()
            .unwrap();

        let paths: Vec<_> = result.files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(paths, vec!["src/a.hpp", "src/b.cpp"]);
    }

    #[test]
    fn test_scan_excludes_globs() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "build/gen.cpp", "");
        touch(temp.path(), "lib/keep.cpp", "");

        let result = FileScanner::new(temp.path())
            .with_extensions(&["cpp".to_string()])
            .with_exclude(&["build/**".to_string()])
            .scan()
            .unwrap();

        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].relative, "lib/keep.cpp");
    }

    #[test]
    fn test_oversized_file_is_skipped() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "big.cpp", &"x".repeat(64));

        let result = FileScanner::new(temp.path())
            .with_extensions(&["cpp".to_string()])
            .with_max_file_size(16)
            .scan()
            .unwrap();

        assert!(result.files.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].path, "big.cpp");
    }

    #[test]
    fn test_missing_root_is_error() {
        let temp = TempDir::new().unwrap();
        let err = FileScanner::new(temp.path().join("nope")).scan().unwrap_err();
        assert!(err.is_run_fatal());
    }
}

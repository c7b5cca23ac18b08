//! File tools: `list_files`, `read_file` and `write_file`.
//!
//! Every path goes through [`PathPolicy::check`] first. With no allowed
//! directories configured, any path is accepted.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::ToolError;

/// Directories the file tools may touch.
#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    allowed_paths: Vec<PathBuf>,
}

impl PathPolicy {
    /// Creates a policy over `allowed_paths`. Empty means unrestricted.
    #[must_use]
    pub const fn new(allowed_paths: Vec<PathBuf>) -> Self {
        Self { allowed_paths }
    }

    /// Returns `true` if every path is accepted.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.allowed_paths.is_empty()
    }

    /// Validates that a path is within one of the allowed paths.
    ///
    /// A path that does not exist yet is resolved through its nearest
    /// existing ancestor, so files in directories `write_file` is about to
    /// create are checked too.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::AccessDenied`] if the path escapes every allowed
    /// directory, or [`ToolError::Path`] if it cannot be resolved.
    pub fn check(&self, filepath: &str) -> Result<(), ToolError> {
        if self.is_unrestricted() {
            return Ok(());
        }

        let canonical_path = resolve(Path::new(filepath)).ok_or_else(|| ToolError::Path {
            message: "cannot resolve path",
            path: filepath.to_string(),
        })?;

        for allowed in &self.allowed_paths {
            let Ok(canonical_allowed) = allowed.canonicalize() else {
                continue; // Skip non-existent allowed paths
            };

            if canonical_path.starts_with(&canonical_allowed) {
                return Ok(());
            }
        }

        // The error does not name the allowed directories.
        Err(ToolError::AccessDenied)
    }
}

/// Canonicalises the longest existing prefix of `path` and appends the rest.
///
/// The non-existent remainder may not contain `..`.
fn resolve(path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for component in missing.iter().rev() {
                resolved.push(component);
            }
            return Some(resolved);
        }

        let mut components = existing.components();
        match components.next_back()? {
            Component::Normal(name) => missing.push(name.to_os_string()),
            Component::CurDir => {}
            _ => return None,
        }
        existing = components.as_path();
    }
}

/// Lists a directory, directories first, each group sorted by name.
///
/// # Errors
///
/// Fails if the path is denied, missing, not a directory, or unreadable.
pub fn list_files(policy: &PathPolicy, directory: &str) -> Result<String, ToolError> {
    policy.check(directory)?;

    let path = Path::new(directory);
    if !path.exists() {
        return Err(ToolError::Path {
            message: "directory does not exist",
            path: directory.to_string(),
        });
    }
    if !path.is_dir() {
        return Err(ToolError::Path {
            message: "not a directory",
            path: directory.to_string(),
        });
    }

    let io_error = |source| ToolError::Io {
        action: "failed to list",
        path: path.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(path).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type().map_err(io_error)?;
        if file_type.is_dir() {
            entries.push(format!("📁 {name}/"));
        } else {
            entries.push(format!("📄 {name}"));
        }
    }
    entries.sort();

    Ok(format!("Files in {directory}:\n{}", entries.join("\n")))
}

/// Reads a UTF-8 text file no larger than `max_bytes`.
///
/// # Errors
///
/// Fails if the path is denied, missing, too large, or not valid UTF-8.
pub fn read_file(
    policy: &PathPolicy,
    filepath: &str,
    max_bytes: u64,
) -> Result<String, ToolError> {
    policy.check(filepath)?;

    let path = Path::new(filepath);
    if !path.is_file() {
        return Err(ToolError::Path {
            message: "file does not exist",
            path: filepath.to_string(),
        });
    }

    let io_error = |source| ToolError::Io {
        action: "failed to read",
        path: path.to_path_buf(),
        source,
    };

    let size = fs::metadata(path).map_err(io_error)?.len();
    if size > max_bytes {
        return Err(ToolError::InvalidArgument {
            name: "filepath".to_string(),
            message: format!("file is {size} bytes, over the {max_bytes}-byte read limit"),
        });
    }

    let content = fs::read_to_string(path).map_err(io_error)?;
    Ok(format!("Contents of {filepath}:\n\n{content}"))
}

/// Writes `content` to a file, creating parent directories as needed.
///
/// # Errors
///
/// Fails if the path is denied or the write fails.
pub fn write_file(
    policy: &PathPolicy,
    filepath: &str,
    content: &str,
) -> Result<String, ToolError> {
    policy.check(filepath)?;

    let path = Path::new(filepath);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ToolError::Io {
            action: "failed to create directory",
            path: parent.to_path_buf(),
            source,
        })?;
    }

    fs::write(path, content).map_err(|source| ToolError::Io {
        action: "failed to write",
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = %filepath, bytes = content.len(), "Wrote file");
    Ok(format!(
        "Successfully wrote {} characters to {filepath}",
        content.chars().count()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn path_str(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let file = path_str(&dir.path().join("nested/deeper/note.txt"));
        let policy = PathPolicy::default();

        let written = write_file(&policy, &file, "héllo").unwrap();
        assert_eq!(written, format!("Successfully wrote 5 characters to {file}"));

        let read = read_file(&policy, &file, 1024).unwrap();
        assert_eq!(read, format!("Contents of {file}:\n\nhéllo"));
    }

    #[test]
    fn read_missing_file() {
        let dir = TempDir::new().unwrap();
        let file = path_str(&dir.path().join("absent.txt"));

        let err = read_file(&PathPolicy::default(), &file, 1024).unwrap_err();
        assert_eq!(err.to_string(), format!("file does not exist: {file}"));
    }

    #[test]
    fn read_respects_size_limit() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("big.txt");
        fs::write(&file, "0123456789").unwrap();

        let err = read_file(&PathPolicy::default(), &path_str(&file), 4).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument { .. }));
    }

    #[test]
    fn list_sorts_directories_first() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let root = path_str(dir.path());
        let listing = list_files(&PathPolicy::default(), &root).unwrap();
        assert_eq!(
            listing,
            format!("Files in {root}:\n📁 sub/\n📄 a.txt\n📄 b.txt")
        );
    }

    #[test]
    fn list_missing_directory() {
        let err = list_files(&PathPolicy::default(), "/nonexistent/toolwire-dir").unwrap_err();
        assert!(err.to_string().starts_with("directory does not exist"));
    }

    #[test]
    fn policy_allows_inside_and_denies_outside() {
        let allowed = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let policy = PathPolicy::new(vec![allowed.path().to_path_buf()]);

        let inside = path_str(&allowed.path().join("new/dir/file.txt"));
        assert!(policy.check(&inside).is_ok());
        assert!(write_file(&policy, &inside, "ok").is_ok());

        let denied = path_str(&outside.path().join("file.txt"));
        assert!(matches!(policy.check(&denied), Err(ToolError::AccessDenied)));
        assert!(matches!(
            write_file(&policy, &denied, "no"),
            Err(ToolError::AccessDenied)
        ));
    }

    #[test]
    fn policy_rejects_parent_escape() {
        let allowed = TempDir::new().unwrap();
        let policy = PathPolicy::new(vec![allowed.path().to_path_buf()]);

        let escape = path_str(&allowed.path().join("missing/../../escape.txt"));
        assert!(policy.check(&escape).is_err());
    }
}

//! Confinement of task paths to the data root.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("path `{path}` is outside the data root {}", root.display())]
pub struct PathViolation {
    pub path: String,
    pub root: PathBuf,
}

/// The single directory every managed file operation must stay under.
#[derive(Debug, Clone)]
pub struct DataRoot {
    root: PathBuf,
}

impl DataRoot {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: normalize(root.as_ref()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve `raw` to an absolute path under the root.
    ///
    /// Relative paths are joined onto the root. `..` is resolved lexically, and
    /// the deepest existing entry is canonicalized so a symlink cannot lead
    /// outside the root either. A dangling symlink is rejected outright, since
    /// writing through it would create its target wherever that points.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, PathViolation> {
        let violation = || PathViolation {
            path: raw.to_string(),
            root: self.root.clone(),
        };

        let raw_path = Path::new(raw.trim());
        let joined = if raw_path.is_absolute() {
            raw_path.to_path_buf()
        } else {
            self.root.join(raw_path)
        };
        let resolved = normalize(&joined);

        if !resolved.starts_with(&self.root) {
            return Err(violation());
        }

        let real = canonicalize_existing(&resolved).ok_or_else(violation)?;
        let real_root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        if !real.starts_with(&real_root) {
            return Err(violation());
        }

        Ok(resolved)
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the deepest existing entry and re-append the rest.
///
/// An entry counts as existing when `symlink_metadata` sees it, so a dangling
/// symlink is found here and fails to canonicalize, yielding `None`.
fn canonicalize_existing(path: &Path) -> Option<PathBuf> {
    let ancestor = path
        .ancestors()
        .find(|ancestor| std::fs::symlink_metadata(ancestor).is_ok())?;
    let real = ancestor.canonicalize().ok()?;
    let rest = path.strip_prefix(ancestor).ok()?;
    Some(real.join(rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_and_absolute_paths_inside_root_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let root = DataRoot::new(dir.path());

        assert_eq!(
            root.resolve("logs/a.log").unwrap(),
            root.path().join("logs/a.log")
        );
        let absolute = root.path().join("docs/./index.json");
        assert_eq!(
            root.resolve(absolute.to_str().unwrap()).unwrap(),
            root.path().join("docs/index.json")
        );
    }

    #[test]
    fn parent_traversal_and_foreign_absolute_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = DataRoot::new(dir.path());

        assert!(root.resolve("../secret.txt").is_err());
        assert!(root.resolve("docs/../../secret.txt").is_err());
        assert!(root.resolve("/etc/passwd").is_err());
        assert!(root.resolve("docs/../ok.txt").is_ok());
    }

    #[test]
    fn sibling_with_shared_prefix_is_rejected() {
        let root = DataRoot::new("/data");
        assert!(root.resolve("/data-other/file.txt").is_err());
        assert!(root.resolve("/data/file.txt").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_root_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();
        let root = DataRoot::new(dir.path());

        let err = root.resolve("escape/file.txt").unwrap_err();
        assert_eq!(err.path, "escape/file.txt");
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let target = outside.path().join("planted.txt");
        std::os::unix::fs::symlink(&target, dir.path().join("link.txt")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("gone"), dir.path().join("gone")).unwrap();
        let root = DataRoot::new(dir.path());

        assert!(root.resolve("link.txt").is_err());
        assert!(root.resolve("gone/file.txt").is_err());
        assert!(!target.exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_within_root_resolves() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();
        let root = DataRoot::new(dir.path());

        assert_eq!(
            root.resolve("alias/new.txt").unwrap(),
            root.path().join("alias/new.txt")
        );
    }
}

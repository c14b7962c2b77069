use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::sanitize::{sanitize_file_name, sanitize_path};

/// Exclusive extraction directory for one scan session.
///
/// Dropping the sandbox removes everything extracted into it. Call
/// [`Sandbox::persist`] to hand teardown to the caller instead.
#[derive(Debug)]
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("flatline-scan-")
            .tempdir()
            .map_err(|source| Error::Sandbox { source })?;
        Ok(Self { dir })
    }

    /// Create a fresh session directory below `parent`.
    pub fn new_in(parent: impl AsRef<Path>) -> Result<Self> {
        let parent = parent.as_ref();
        std::fs::create_dir_all(parent).map_err(|source| Error::Sandbox { source })?;
        let dir = tempfile::Builder::new()
            .prefix("flatline-scan-")
            .tempdir_in(parent)
            .map_err(|source| Error::Sandbox { source })?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Reserve a unique extraction path derived from the logical path.
    ///
    /// The name is `<aa>/<sha256(logical_path)[..16]>_<file name>`. Keying on
    /// the logical path rather than the entry bytes keeps two identical
    /// documents from different containers in separate files, and lets the
    /// path be reserved before anything is read. The physical name never
    /// reuses directory components from the archive.
    pub fn allocate(&self, logical_path: &str, file_name: &str) -> Result<PathBuf> {
        let digest = hex::encode(Sha256::digest(logical_path.as_bytes()));
        let name = format!(
            "{}/{}_{}",
            &digest[..2],
            &digest[..16],
            sanitize_file_name(file_name)
        );
        let sanitized = sanitize_path(&name, self.root())?;

        if let Some(parent) = sanitized.resolved.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::ExtractionFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        Ok(sanitized.resolved)
    }

    /// Whether `path` lies strictly inside the sandbox root.
    pub fn contains(&self, path: &Path) -> bool {
        path != self.root() && path.starts_with(self.root())
    }

    /// Keep the directory on disk and return its path.
    pub fn persist(self) -> PathBuf {
        self.dir.into_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_stays_inside_root() {
        let sandbox = Sandbox::new().unwrap();
        let path = sandbox.allocate("a.zip/../../etc/passwd", "../../passwd").unwrap();
        assert!(sandbox.contains(&path));
        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn allocation_is_unique_per_logical_path() {
        let sandbox = Sandbox::new().unwrap();
        let a = sandbox.allocate("root.zip/AR/a.xml", "a.xml").unwrap();
        let b = sandbox.allocate("root.zip/GL/a.xml", "a.xml").unwrap();
        let again = sandbox.allocate("root.zip/AR/a.xml", "a.xml").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, again);
    }

    #[test]
    fn drop_removes_directory() {
        let sandbox = Sandbox::new().unwrap();
        let root = sandbox.root().to_path_buf();
        assert!(root.exists());
        drop(sandbox);
        assert!(!root.exists());
    }

    #[test]
    fn persist_keeps_directory() {
        let parent = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new_in(parent.path().join("sessions")).unwrap();
        let root = sandbox.persist();
        assert!(root.exists());
        assert!(root.starts_with(parent.path()));
    }

    #[test]
    fn sessions_are_exclusive() {
        let parent = tempfile::tempdir().unwrap();
        let a = Sandbox::new_in(parent.path()).unwrap();
        let b = Sandbox::new_in(parent.path()).unwrap();
        assert_ne!(a.root(), b.root());
    }
}

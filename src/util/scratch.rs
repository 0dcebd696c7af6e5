//! Per-call scratch directories for extracted module files.
//!
//! Each extraction call gets its own uniquely-named directory; dropping
//! the handle removes it best-effort. Diff correctness never depends on
//! cleanup succeeding, but long-running processes must not accumulate
//! extracted modules without bound, which the drop-based lifetime
//! guarantees for every non-crash path.

use std::path::Path;

use tempfile::TempDir;

use crate::error::Error;

/// A uniquely-named temporary directory holding one call's modules.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a fresh scratch directory under the system temp location.
    pub fn new() -> Result<ScratchDir, Error> {
        let dir = tempfile::Builder::new()
            .prefix("nudiff-")
            .tempdir()
            .map_err(Error::Scratch)?;
        Ok(ScratchDir { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_dirs_are_unique_and_cleaned() {
        let a = ScratchDir::new().unwrap();
        let b = ScratchDir::new().unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().exists());

        let kept = a.path().to_path_buf();
        drop(a);
        assert!(!kept.exists());
        assert!(b.path().exists());
    }
}

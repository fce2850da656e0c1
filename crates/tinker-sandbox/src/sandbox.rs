//! Scoped sandbox directories for a single compile.
//!
//! A [`Sandbox`] owns a fresh temporary directory laid out as:
//!
//! ```text
//! tinker-sketch-XXXXXX/
//! ├── sketch/sketch.ino
//! └── stubs/<header>.h
//! ```
//!
//! The directory is removed when the sandbox is closed or dropped, so an
//! early return, a timeout or a cancelled request all clean up.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::stubs::StubHeader;
use crate::{Result, SandboxError};

const SANDBOX_PREFIX: &str = "tinker-sketch-";

/// Directory holding the sketch. arduino-cli requires it to match the file stem.
pub const SKETCH_DIR: &str = "sketch";

/// Sketch file name inside [`SKETCH_DIR`].
pub const SKETCH_FILE: &str = "sketch.ino";

/// Directory holding synthesized stub headers.
pub const STUBS_DIR: &str = "stubs";

/// A temporary directory for one compile.
#[derive(Debug)]
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    /// Creates a sandbox under `root`, or under the system temp dir.
    ///
    /// `root` is created if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Create`] if the directory cannot be created.
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SANDBOX_PREFIX);

        let dir = match root {
            Some(root) => {
                fs::create_dir_all(root).map_err(SandboxError::Create)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(SandboxError::Create)?;

        debug!(path = %dir.path().display(), "Created sandbox");
        Ok(Self { dir })
    }

    /// Returns the sandbox root.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the sketch directory passed to the compiler.
    #[must_use]
    pub fn sketch_dir(&self) -> PathBuf {
        self.path().join(SKETCH_DIR)
    }

    /// Returns the stub include directory.
    #[must_use]
    pub fn stubs_dir(&self) -> PathBuf {
        self.path().join(STUBS_DIR)
    }

    /// Writes `code` as the sketch and returns the sketch directory.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Write`] on any filesystem failure.
    pub async fn write_sketch(&self, code: &str) -> Result<PathBuf> {
        let sketch_dir = self.sketch_dir();
        tokio::fs::create_dir_all(&sketch_dir)
            .await
            .map_err(|e| SandboxError::write(&sketch_dir, e))?;

        let sketch = sketch_dir.join(SKETCH_FILE);
        tokio::fs::write(&sketch, code)
            .await
            .map_err(|e| SandboxError::write(&sketch, e))?;
        Ok(sketch_dir)
    }

    /// Writes `stubs` into the stub directory and returns it.
    ///
    /// The directory is created even when there are no stubs, so it can
    /// always be put on the include path.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Write`] on any filesystem failure.
    pub async fn write_stubs(&self, stubs: &[&StubHeader]) -> Result<PathBuf> {
        let stubs_dir = self.stubs_dir();
        tokio::fs::create_dir_all(&stubs_dir)
            .await
            .map_err(|e| SandboxError::write(&stubs_dir, e))?;

        for stub in stubs {
            let path = stubs_dir.join(stub.name);
            tokio::fs::write(&path, stub.source)
                .await
                .map_err(|e| SandboxError::write(&path, e))?;
        }
        if !stubs.is_empty() {
            debug!(count = stubs.len(), "Wrote stub headers");
        }
        Ok(stubs_dir)
    }

    /// Removes the sandbox, reporting failures that a drop would swallow.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Cleanup`] if the directory cannot be removed.
    pub fn close(self) -> Result<()> {
        self.dir.close().map_err(SandboxError::Cleanup)
    }
}

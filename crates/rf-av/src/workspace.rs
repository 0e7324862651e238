//! Scratch directories for stage execution.
//!
//! ffmpeg reads and writes local files, so a stage run stages its input
//! artifact into a [`Workspace`], runs the tool there, and uploads the
//! output. The directory is removed when the workspace is dropped.

use std::path::{Path, PathBuf};

use rf_core::Error;
use tempfile::TempDir;

/// Temporary directory owned by one stage run.
///
/// # Example
///
/// ```no_run
/// use rf_av::Workspace;
///
/// let ws = Workspace::new("convert").unwrap();
/// let input = ws.file("input.webm");
/// let output = ws.file("video.mp4");
/// // ... fetch the artifact into `input`, run ffmpeg, upload `output` ...
/// ```
#[derive(Debug)]
pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    /// Create a workspace whose directory name starts with `rf-{label}-`.
    pub fn new(label: &str) -> rf_core::Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix(&format!("rf-{label}-"))
            .tempdir()
            .map_err(|e| Error::Storage(format!("failed to create temp dir: {e}")))?;
        Ok(Self { temp_dir })
    }

    /// Path to the temporary directory.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path for a named file inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Read a file produced inside the workspace, failing if the tool did not
    /// create it.
    pub async fn read_output(&self, name: &str) -> rf_core::Result<Vec<u8>> {
        let path = self.file(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::tool(
                "workspace",
                format!("output file does not exist: {}", path.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

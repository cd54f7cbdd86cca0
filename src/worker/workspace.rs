use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Temporary directory owned by the worker for the lifetime of one job.
///
/// Removed by [`Workspace::cleanup`] or, failing that, on drop.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl Workspace {
    pub fn create(root: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("snapgrab_");
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        debug!("Created workspace {}", dir.path().display());
        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the directory and everything in it. Calling it again is a no-op.
    pub fn cleanup(&mut self) -> io::Result<()> {
        match self.dir.take() {
            Some(dir) => match dir.close() {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                _ => {
                    debug!("Removed workspace {}", self.path.display());
                    Ok(())
                }
            },
            None => remove_dir_if_exists(&self.path),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("Failed to remove workspace {}: {}", self.path.display(), e);
        }
    }
}

/// Removes `path` recursively; a directory that is already gone is not an error.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

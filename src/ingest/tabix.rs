//! Companion index generation for staged VCF files.

use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait IndexGenerator: Send + Sync {
    /// Build the index beside `path` and return the index file's path.
    async fn generate(&self, path: &Path) -> Result<PathBuf>;
}

/// Runs `tabix -f <path>`, producing `<path>.tbi`.
#[derive(Debug, Clone)]
pub struct TabixCommand {
    binary: PathBuf,
}

impl TabixCommand {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for TabixCommand {
    fn default() -> Self {
        Self::new("tabix")
    }
}

/// `<path>.tbi`
pub fn tbi_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tbi");
    PathBuf::from(name)
}

#[async_trait]
impl IndexGenerator for TabixCommand {
    async fn generate(&self, path: &Path) -> Result<PathBuf> {
        let output = Command::new(&self.binary)
            .arg("-f")
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                Error::IndexGeneration(format!("cannot run {}: {}", self.binary.display(), e))
            })?;

        if !output.status.success() {
            return Err(Error::IndexGeneration(format!(
                "{} exited with {} for {}: {}",
                self.binary.display(),
                output.status,
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let index = tbi_path(path);
        debug!("generated {}", index.display());
        Ok(index)
    }
}

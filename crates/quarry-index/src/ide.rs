//! Host workspace access.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

/// What the pipeline needs from the host editor.
#[async_trait]
pub trait Ide: Send + Sync {
    async fn workspace_dirs(&self) -> Result<Vec<String>>;

    /// Files currently open in the editor, in tab order.
    async fn open_files(&self) -> Result<Vec<String>>;

    async fn read_file(&self, path: &str) -> Result<String>;
}

/// Host backed by the local file system, with a fixed set of open files.
#[derive(Debug, Clone, Default)]
pub struct LocalIde {
    workspace_dirs: Vec<PathBuf>,
    open_files: Vec<String>,
}

impl LocalIde {
    pub fn new(workspace_dirs: Vec<PathBuf>) -> Self {
        Self {
            workspace_dirs,
            open_files: Vec::new(),
        }
    }

    pub fn with_open_files(mut self, open_files: Vec<String>) -> Self {
        self.open_files = open_files;
        self
    }
}

#[async_trait]
impl Ide for LocalIde {
    async fn workspace_dirs(&self) -> Result<Vec<String>> {
        Ok(self
            .workspace_dirs
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect())
    }

    async fn open_files(&self) -> Result<Vec<String>> {
        Ok(self.open_files.clone())
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {path}"))
    }
}

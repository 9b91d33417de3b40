//! Check log persistence

use async_trait::async_trait;
use tracing::debug;

use crate::checklog::CheckLogBatch;
use crate::errors::EngineError;
use crate::filesys::file::File;

/// Append-only sink for check log batches
#[async_trait]
pub trait CheckLogStore: Send + Sync {
    /// Persist one batch
    async fn create(&self, batch: &CheckLogBatch) -> Result<(), EngineError>;

    /// Every batch persisted so far, oldest first
    async fn list(&self) -> Result<Vec<CheckLogBatch>, EngineError>;
}

/// Stores each batch as one JSON line
#[derive(Debug, Clone)]
pub struct FileCheckLogStore {
    file: File,
}

impl FileCheckLogStore {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

#[async_trait]
impl CheckLogStore for FileCheckLogStore {
    async fn create(&self, batch: &CheckLogBatch) -> Result<(), EngineError> {
        let line = serde_json::to_string(batch)?;
        self.file.append_line(&line).await?;
        debug!("Check log batch appended to {}", self.file.path().display());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<CheckLogBatch>, EngineError> {
        let mut batches = Vec::new();
        for line in self.file.read_lines().await? {
            batches.push(serde_json::from_str(&line)?);
        }
        Ok(batches)
    }
}

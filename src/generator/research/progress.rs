//! Outbound observers: progress snapshots and per-iteration audit records.

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tracing::info;

use super::types::{IterationRecord, Progress};

/// Receives progress snapshots. Return values are never consumed.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &Progress);
}

/// Reports progress as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, progress: &Progress) {
        info!(
            depth = progress.current_depth,
            total_depth = progress.total_depth,
            breadth = progress.current_breadth,
            total_breadth = progress.total_breadth,
            completed_queries = progress.completed_queries,
            total_queries = progress.total_queries,
            current_query = progress.current_query.as_deref().unwrap_or(""),
            "Research progress"
        );
    }
}

impl ProgressSink for mpsc::UnboundedSender<Progress> {
    fn report(&self, progress: &Progress) {
        // a dropped receiver just means nobody is listening any more
        let _ = self.send(progress.clone());
    }
}

/// Storage-agnostic consumer of iteration records.
#[async_trait]
pub trait IterationSink: Send + Sync {
    async fn record(&self, record: &IterationRecord) -> Result<()>;
}

/// Appends each iteration record as one JSON line.
pub struct JsonLinesIterationSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesIterationSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl IterationSink for JsonLinesIterationSink {
    async fn record(&self, record: &IterationRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

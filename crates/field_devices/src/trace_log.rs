use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::domain::TraceContext;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One line of the alarm trace log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub area: String,
    pub text: String,
    pub trace: TraceContext,
    pub logged_at: DateTime<Utc>,
}

/// Append-only JSON Lines file. Lines are written whole under a lock so
/// concurrent alerts never interleave.
pub struct TraceLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl TraceLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open trace log {}", path.display()))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &AlarmRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }
}

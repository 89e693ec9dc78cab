//! JSON Lines trace store: one trace per line, appended, never rewritten.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::RunTrace;
use crate::domain::ports::TraceRepository;

#[derive(Debug, Default)]
struct Recorded {
    order: Vec<String>,
    ids: HashSet<String>,
    /// The file ends in an unterminated line left by an interrupted write.
    torn_tail: bool,
}

/// Only the key is read when indexing an existing file.
#[derive(Deserialize)]
struct TraceKey {
    article_id: String,
}

/// Trace store backed by a single JSON Lines file.
///
/// Article ids are indexed in memory when the store is opened; appends are
/// serialized by a mutex so concurrent runs never interleave lines.
#[derive(Debug)]
pub struct JsonlTraceRepository {
    path: PathBuf,
    recorded: Mutex<Recorded>,
}

impl JsonlTraceRepository {
    /// Open the store at `path`, indexing any traces already in it. The file
    /// and its parent directories are created on first append.
    pub async fn open(path: impl Into<PathBuf>) -> DomainResult<Self> {
        let path = path.into();
        let mut recorded = Recorded::default();

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                recorded.torn_tail = !contents.is_empty() && !contents.ends_with('\n');
                for (number, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<TraceKey>(line) {
                        Ok(key) => {
                            if recorded.ids.insert(key.article_id.clone()) {
                                recorded.order.push(key.article_id);
                            }
                        }
                        Err(err) => warn!(line = number + 1, error = %err, "skipping unreadable trace line"),
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        if recorded.torn_tail {
            warn!(path = %path.display(), "trace file ends in a partial line");
        }
        debug!(path = %path.display(), traces = recorded.order.len(), "opened trace store");
        Ok(Self {
            path,
            recorded: Mutex::new(recorded),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TraceRepository for JsonlTraceRepository {
    async fn append(&self, trace: &RunTrace) -> DomainResult<()> {
        let mut recorded = self.recorded.lock().await;
        if recorded.ids.contains(&trace.article_id) {
            return Err(DomainError::TraceAlreadyRecorded(trace.article_id.clone()));
        }

        let mut line = String::new();
        if recorded.torn_tail {
            line.push('\n');
        }
        line.push_str(&serde_json::to_string(trace)?);
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let length_before = file.metadata().await?.len();

        let written = match file.write_all(line.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            // Cut the partial line so the next append starts clean.
            match file.set_len(length_before).await {
                Ok(()) => warn!(error = %err, "trace write failed; partial line removed"),
                Err(truncate_err) => {
                    warn!(error = %err, truncate_error = %truncate_err, "trace write failed; partial line kept");
                    recorded.torn_tail = true;
                }
            }
            return Err(err.into());
        }

        recorded.torn_tail = false;
        recorded.ids.insert(trace.article_id.clone());
        recorded.order.push(trace.article_id.clone());
        Ok(())
    }

    async fn get(&self, article_id: &str) -> DomainResult<Option<RunTrace>> {
        if !self.contains(article_id).await? {
            return Ok(None);
        }
        let contents = tokio::fs::read_to_string(&self.path).await?;
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let Ok(key) = serde_json::from_str::<TraceKey>(line) else {
                continue;
            };
            if key.article_id == article_id {
                return Ok(Some(serde_json::from_str(line)?));
            }
        }
        Ok(None)
    }

    async fn contains(&self, article_id: &str) -> DomainResult<bool> {
        Ok(self.recorded.lock().await.ids.contains(article_id))
    }

    async fn list_article_ids(&self) -> DomainResult<Vec<String>> {
        Ok(self.recorded.lock().await.order.clone())
    }
}

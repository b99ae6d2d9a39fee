//! Review corpus access.
//!
//! The corpus only grows. Readers take an `Arc` snapshot at request start and
//! never observe a concurrent append halfway through.

use crate::error::{CorpusError, Result};
use crate::types::ReviewRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Read/append access to the set of review records.
#[async_trait]
pub trait ReviewCorpus: Send + Sync {
    /// Current records, in insertion order.
    fn snapshot(&self) -> Arc<Vec<ReviewRecord>>;

    /// Append records and return the new total.
    async fn append(&self, reviews: Vec<ReviewRecord>) -> Result<usize>;

    fn len(&self) -> usize {
        self.snapshot().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// On-disk document layout.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReviewDocument {
    #[serde(default)]
    pub reviews: Vec<ReviewRecord>,
}

fn read_snapshot(lock: &RwLock<Arc<Vec<ReviewRecord>>>) -> Arc<Vec<ReviewRecord>> {
    match lock.read() {
        Ok(guard) => Arc::clone(&*guard),
        Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
    }
}

fn publish(lock: &RwLock<Arc<Vec<ReviewRecord>>>, next: Arc<Vec<ReviewRecord>>) {
    match lock.write() {
        Ok(mut guard) => *guard = next,
        Err(poisoned) => *poisoned.into_inner() = next,
    }
}

/// Corpus held only in memory.
#[derive(Debug, Default)]
pub struct InMemoryCorpus {
    reviews: RwLock<Arc<Vec<ReviewRecord>>>,
    writer: tokio::sync::Mutex<()>,
}

impl InMemoryCorpus {
    pub fn new(reviews: Vec<ReviewRecord>) -> Self {
        Self {
            reviews: RwLock::new(Arc::new(reviews)),
            writer: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl ReviewCorpus for InMemoryCorpus {
    fn snapshot(&self) -> Arc<Vec<ReviewRecord>> {
        read_snapshot(&self.reviews)
    }

    async fn append(&self, reviews: Vec<ReviewRecord>) -> Result<usize> {
        let _guard = self.writer.lock().await;
        let mut next = (*self.snapshot()).clone();
        next.extend(reviews);
        let total = next.len();
        publish(&self.reviews, Arc::new(next));
        Ok(total)
    }
}

/// Corpus persisted as a `{ "reviews": [...] }` JSON document.
#[derive(Debug)]
pub struct JsonFileCorpus {
    path: PathBuf,
    reviews: RwLock<Arc<Vec<ReviewRecord>>>,
    writer: tokio::sync::Mutex<()>,
}

impl JsonFileCorpus {
    /// Load the document at `path`. A missing file is an empty corpus.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reviews = Self::load(&path).await?;
        info!(path = %path.display(), reviews = reviews.len(), "Review corpus loaded");
        Ok(Self {
            path,
            reviews: RwLock::new(Arc::new(reviews)),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    async fn load(path: &Path) -> Result<Vec<ReviewRecord>> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Review store missing, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(CorpusError::Read {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
                .into());
            }
        };
        let doc: ReviewDocument = serde_json::from_str(&raw).map_err(|e| CorpusError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(doc.reviews)
    }

    async fn persist(&self, reviews: &[ReviewRecord]) -> Result<()> {
        let write_err = |message: String| CorpusError::Write {
            path: self.path.clone(),
            message,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_err(e.to_string()))?;
        }
        let body = serde_json::to_string_pretty(&serde_json::json!({ "reviews": reviews }))?;
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|e| write_err(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ReviewCorpus for JsonFileCorpus {
    fn snapshot(&self) -> Arc<Vec<ReviewRecord>> {
        read_snapshot(&self.reviews)
    }

    async fn append(&self, reviews: Vec<ReviewRecord>) -> Result<usize> {
        let _guard = self.writer.lock().await;
        let added = reviews.len();
        let mut next = (*self.snapshot()).clone();
        next.extend(reviews);
        self.persist(&next).await?;
        let total = next.len();
        publish(&self.reviews, Arc::new(next));
        info!(added, total, "Reviews appended");
        Ok(total)
    }
}

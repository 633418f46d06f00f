use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::listing::NormalizedListing;
use crate::{info_time, warn_time, Error, Result};

/// Which stored ids a dedup tracker starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdScope {
    All,
    /// Only records first stored under this queried title.
    QueriedTitle(String),
}

impl IdScope {
    fn admits(&self, queried_title: &str) -> bool {
        match self {
            Self::All => true,
            Self::QueriedTitle(title) => title == queried_title,
        }
    }
}

/// Durable store keyed by `job_id`. One record per id, whatever the number of writes.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn exists(&self, job_id: &str) -> Result<bool>;

    /// Stores `listing`, or leaves the store as it is when its id is already present.
    async fn upsert(&self, listing: &NormalizedListing) -> Result<()>;

    async fn list_existing_ids(&self, scope: &IdScope) -> Result<HashSet<String>>;
}

/// In-process store. Later writes replace earlier ones for the same id.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: RwLock<HashMap<String, NormalizedListing>>,
    upsert_calls: AtomicUsize,
    fail_on: RwLock<HashSet<String>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write of `job_id` fail.
    pub async fn fail_on(&self, job_id: impl Into<String>) {
        self.fail_on.write().await.insert(job_id.into());
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, job_id: &str) -> Option<NormalizedListing> {
        self.records.read().await.get(job_id).cloned()
    }

    pub async fn all(&self) -> Vec<NormalizedListing> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl JobRepository for MemoryRepository {
    async fn exists(&self, job_id: &str) -> Result<bool> {
        Ok(self.records.read().await.contains_key(job_id))
    }

    async fn upsert(&self, listing: &NormalizedListing) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.read().await.contains(&listing.job_id) {
            return Err(Error::Repository(format!(
                "write rejected for {}",
                listing.job_id
            )));
        }
        self.records
            .write()
            .await
            .insert(listing.job_id.clone(), listing.clone());
        Ok(())
    }

    async fn list_existing_ids(&self, scope: &IdScope) -> Result<HashSet<String>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|listing| scope.admits(&listing.queried_job_title))
            .map(|listing| listing.job_id.clone())
            .collect())
    }
}

/// Just enough of a stored line to rebuild the index.
#[derive(Deserialize)]
struct StoredKey {
    job_id: String,
    queried_job_title: String,
}

/// Append-only JSON lines file, one record per line. An id already in the file is never
/// written again.
pub struct JsonlRepository {
    path: PathBuf,
    /// job_id -> queried title it was first stored under.
    index: RwLock<HashMap<String, String>>,
    file: Mutex<File>,
}

impl JsonlRepository {
    /// Opens `path` for appending, creating it and its parent directory if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let start_time = Local::now();
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        // A last line without its newline was cut short by a crash, unless it parses.
        let body_len = raw.rfind('\n').map_or(0, |i| i + 1);
        let tail = &raw[body_len..];
        let torn = !tail.is_empty() && serde_json::from_str::<NormalizedListing>(tail).is_err();
        let readable = if torn { &raw[..body_len] } else { raw.as_str() };

        let mut index = HashMap::new();
        for (n, line) in readable.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredKey>(line) {
                Ok(key) => {
                    index.entry(key.job_id).or_insert(key.queried_job_title);
                }
                Err(e) => warn_time!("Skipping unreadable line {} in {:?}: {}", n + 1, path, e),
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        // The next append must start on a line of its own.
        if torn {
            warn_time!("Cutting a torn last line ({} bytes) off {:?}", tail.len(), path);
            file.set_len(body_len as u64).await?;
        } else if !tail.is_empty() {
            file.write_all(b"\n").await?;
            file.flush().await?;
        }
        info_time!(start_time, "Opened {:?} with {} stored jobs", path, index.len());

        Ok(Self {
            path,
            index: RwLock::new(index),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record in the file at `path`, in the order written.
    /// Unreadable lines are skipped, the same way `open` skips them.
    pub async fn read_all(path: impl AsRef<Path>) -> Result<Vec<NormalizedListing>> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).await?;
        let mut records = Vec::new();
        for (n, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => warn_time!("Skipping unreadable line {} in {:?}: {}", n + 1, path, e),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl JobRepository for JsonlRepository {
    async fn exists(&self, job_id: &str) -> Result<bool> {
        Ok(self.index.read().await.contains_key(job_id))
    }

    async fn upsert(&self, listing: &NormalizedListing) -> Result<()> {
        // Held across the write so two writers can't both see the id as new.
        let mut index = self.index.write().await;
        if index.contains_key(&listing.job_id) {
            return Ok(());
        }

        let mut line = serde_json::to_string(listing)?;
        line.push('\n');
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        index.insert(listing.job_id.clone(), listing.queried_job_title.clone());
        Ok(())
    }

    async fn list_existing_ids(&self, scope: &IdScope) -> Result<HashSet<String>> {
        Ok(self
            .index
            .read()
            .await
            .iter()
            .filter(|(_, title)| scope.admits(title))
            .map(|(id, _)| id.clone())
            .collect())
    }
}

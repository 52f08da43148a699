//! Resume store
//!
//! Durable record of which parts of an upload already completed, so an
//! interrupted upload restarts without re-sending them.
//!
//! # Design
//!
//! - Backed by an injected [`KeyValueStore`] (no ambient global state)
//! - Snapshots keyed by [`FileFingerprint`], with an index by object key
//! - Entries older than the TTL, or for a different file, are cache misses
//!
//! # Keys
//!
//! | Key | Value |
//! |-----|-------|
//! | `{namespace}:snapshot:{fingerprint}` | snapshot JSON |
//! | `{namespace}:key:{object_key}` | fingerprint |
//!
//! # Example
//!
//! ```
//! use kata_uploadr::resume::{FileFingerprint, MemoryStore, ResumeSnapshot, ResumeStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ResumeStore::new(Arc::new(MemoryStore::new()));
//! let fingerprint = FileFingerprint::new("intro.mp4", 26 * 1024 * 1024);
//!
//! let mut snapshot = ResumeSnapshot::new("upload-1", "videos/intro.mp4", 8 * 1024 * 1024, 4, fingerprint.clone());
//! snapshot.completed_parts.push((1, "\"etag-1\"".to_string()));
//! store.save(&snapshot).await?;
//!
//! let loaded = store.load(&fingerprint).await?.expect("fresh snapshot");
//! assert_eq!(loaded.completed_parts.len(), 1);
//! # Ok(())
//! # }
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod kv;
pub mod writer;

pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use writer::ResumeWriter;

/// Default snapshot lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default key namespace
pub const DEFAULT_NAMESPACE: &str = "kata-upload";

/// Resume store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to encode snapshot: {0}")]
    EncodeError(#[from] serde_json::Error),
}

/// Identity of a source file: SHA-256 of its name and byte size
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileFingerprint(String);

impl FileFingerprint {
    pub fn new(file_name: &str, file_size: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(file_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(file_size.to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted projection of an upload session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeSnapshot {
    pub upload_id: String,
    pub object_key: String,
    pub part_size: u64,
    pub part_count: u32,
    /// `(part_number, integrity_tag)` pairs, serialized as two-element arrays
    pub completed_parts: Vec<(u32, String)>,
    pub file_fingerprint: FileFingerprint,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl ResumeSnapshot {
    /// Empty snapshot stamped with the current time
    pub fn new(
        upload_id: impl Into<String>,
        object_key: impl Into<String>,
        part_size: u64,
        part_count: u32,
        file_fingerprint: FileFingerprint,
    ) -> Self {
        Self {
            upload_id: upload_id.into(),
            object_key: object_key.into(),
            part_size,
            part_count,
            completed_parts: Vec::new(),
            file_fingerprint,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Age relative to `now_millis`, zero if the timestamp is in the future
    pub fn age(&self, now_millis: i64) -> Duration {
        Duration::from_millis(u64::try_from(now_millis - self.timestamp).unwrap_or(0))
    }

    /// Completed parts with valid, unique part numbers
    pub fn valid_completed_parts(&self) -> impl Iterator<Item = &(u32, String)> {
        let part_count = self.part_count;
        self.completed_parts
            .iter()
            .filter(move |(n, tag)| *n >= 1 && *n <= part_count && !tag.is_empty())
    }
}

/// Snapshot persistence over a key-value store
#[derive(Clone)]
pub struct ResumeStore {
    kv: Arc<dyn KeyValueStore>,
    namespace: String,
    ttl: Duration,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl fmt::Debug for ResumeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeStore")
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ResumeStore {
    /// Create a store with the default namespace and TTL
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            namespace: DEFAULT_NAMESPACE.to_string(),
            ttl: DEFAULT_TTL,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn snapshot_key(&self, fingerprint: &FileFingerprint) -> String {
        format!("{}:snapshot:{}", self.namespace, fingerprint)
    }

    fn index_key(&self, object_key: &str) -> String {
        format!("{}:key:{}", self.namespace, object_key)
    }

    /// Create or overwrite the snapshot for its fingerprint
    pub async fn save(&self, snapshot: &ResumeSnapshot) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(snapshot)?;
        let _guard = self.write_lock.lock().await;
        self.kv
            .set(&self.snapshot_key(&snapshot.file_fingerprint), &encoded)
            .await?;
        self.kv
            .set(
                &self.index_key(&snapshot.object_key),
                snapshot.file_fingerprint.as_str(),
            )
            .await?;
        Ok(())
    }

    /// Load the snapshot for a file.
    ///
    /// Returns `None` when there is no entry, when the stored fingerprint
    /// differs, or when the entry is older than the TTL. Expired and
    /// undecodable entries are deleted.
    pub async fn load(
        &self,
        fingerprint: &FileFingerprint,
    ) -> Result<Option<ResumeSnapshot>, StoreError> {
        let key = self.snapshot_key(fingerprint);
        let Some(raw) = self.kv.get(&key).await? else {
            return Ok(None);
        };

        let snapshot: ResumeSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding undecodable resume snapshot");
                let _guard = self.write_lock.lock().await;
                self.kv.delete(&key).await?;
                return Ok(None);
            }
        };

        if &snapshot.file_fingerprint != fingerprint {
            tracing::debug!(key = %key, "Resume snapshot belongs to a different file");
            return Ok(None);
        }

        let age = snapshot.age(Utc::now().timestamp_millis());
        if age > self.ttl {
            tracing::info!(
                upload_id = %snapshot.upload_id,
                age_secs = age.as_secs(),
                "Resume snapshot expired"
            );
            self.remove(&snapshot).await?;
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    /// Remove the snapshot recorded for an object key
    pub async fn clear(&self, object_key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let index_key = self.index_key(object_key);
        if let Some(fingerprint) = self.kv.get(&index_key).await? {
            let snapshot_key = format!("{}:snapshot:{}", self.namespace, fingerprint);
            // Only drop the snapshot if it still belongs to this object
            if let Some(raw) = self.kv.get(&snapshot_key).await? {
                let owned = serde_json::from_str::<ResumeSnapshot>(&raw)
                    .map(|s| s.object_key == object_key)
                    .unwrap_or(true);
                if owned {
                    self.kv.delete(&snapshot_key).await?;
                }
            }
        }
        self.kv.delete(&index_key).await?;
        Ok(())
    }

    async fn remove(&self, snapshot: &ResumeSnapshot) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.kv
            .delete(&self.snapshot_key(&snapshot.file_fingerprint))
            .await?;
        self.kv.delete(&self.index_key(&snapshot.object_key)).await?;
        Ok(())
    }
}

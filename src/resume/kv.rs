//! Key-value backends for the resume store

use async_trait::async_trait;
use dashmap::DashMap;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

/// Minimal async key-value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> io::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> io::Result<()>;
    /// Deleting a missing key is not an error
    async fn delete(&self, key: &str) -> io::Result<()>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> io::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Longest file name most filesystems accept, in bytes
const MAX_FILE_NAME: usize = 255;

const EXTENSION: &str = ".json";

/// Separates the readable prefix of a hashed file name from its digest.
/// Percent-encoding escapes `~`, so it never appears in a plain name.
const HASH_MARKER: char = '~';

/// One file per key inside a directory.
///
/// Keys are percent-encoded into file names. A key whose encoded name would
/// exceed [`MAX_FILE_NAME`] is stored under a truncated prefix plus the
/// SHA-256 of the full key instead. Writes go to a temporary file that is
/// renamed into place, so a crash never leaves a torn value.
#[derive(Debug, Clone)]
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `directory`
    pub async fn open<P: AsRef<Path>>(directory: P) -> io::Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&directory).await?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.directory.join(file_name_for(key))
    }

    /// Keys currently stored.
    ///
    /// Keys stored under a hashed file name cannot be recovered and are not listed.
    pub async fn keys(&self) -> io::Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(|n| n.strip_suffix(EXTENSION)) else {
                continue;
            };
            if name.contains(HASH_MARKER) {
                continue;
            }
            if let Ok(key) = percent_decode_str(name).decode_utf8() {
                keys.push(key.into_owned());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn file_name_for(key: &str) -> String {
    let encoded = utf8_percent_encode(key, NON_ALPHANUMERIC).to_string();
    if encoded.len() + EXTENSION.len() <= MAX_FILE_NAME {
        return format!("{encoded}{EXTENSION}");
    }
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    // Encoded names are ASCII, so any byte offset is a char boundary
    let keep = MAX_FILE_NAME - EXTENSION.len() - HASH_MARKER.len_utf8() - digest.len();
    format!("{}{HASH_MARKER}{digest}{EXTENSION}", &encoded[..keep])
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let target = self.path_for(key);
        let temp = self
            .directory
            .join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&temp, value).await?;
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> io::Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);
        store.set("a", "1").await.unwrap();
        store.set("a", "2").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.len(), 1);
        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("resume")).await.unwrap();

        let key = "kata-upload:key:videos/intro 1.mp4";
        store.set(key, "{}").await.unwrap();
        assert_eq!(store.get(key).await.unwrap().as_deref(), Some("{}"));
        assert_eq!(store.keys().await.unwrap(), vec![key.to_string()]);

        store.delete(key).await.unwrap();
        assert_eq!(store.get(key).await.unwrap(), None);
        store.delete(key).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.set("k", "v").await.unwrap();
        }
        let store = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_long_keys_get_bounded_file_names() {
        let short = file_name_for("kata-upload:key:videos/a.mp4");
        assert!(!short.contains(HASH_MARKER));

        let long_key = format!("kata-upload:key:{}", "videos/lesson 01/".repeat(40));
        let long = file_name_for(&long_key);
        assert_eq!(long.len(), MAX_FILE_NAME);
        assert!(long.contains(HASH_MARKER));
        assert!(long.ends_with(EXTENSION));

        // Same prefix, different tail: distinct names
        let other = file_name_for(&format!("{long_key}x"));
        assert_ne!(long, other);
        assert_eq!(long, file_name_for(&long_key));
    }

    #[tokio::test]
    async fn test_file_store_handles_long_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        let key = format!("kata-upload:key:{}", "videos/lesson 01/".repeat(40));
        store.set(&key, "fingerprint").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("fingerprint"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        store.delete(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_file_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        for i in 0..5 {
            store.set("k", &i.to_string()).await.unwrap();
        }
        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 1);
    }
}

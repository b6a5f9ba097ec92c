use crate::domain::ports::KeyValueStorage;
use crate::utils::error::Result;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// One file per key under `base_path`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: String,
}

impl LocalStorage {
    pub fn new(base_path: String) -> Self {
        Self { base_path }
    }

    // Hex keeps distinct keys on distinct files whatever characters they hold.
    fn key_path(&self, key: &str) -> PathBuf {
        Path::new(&self.base_path).join(format!("{}.json", hex::encode(key)))
    }
}

impl KeyValueStorage for LocalStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.key_path(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, data: &[u8]) -> Result<()> {
        let full_path = self.key_path(key);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(full_path, data).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.key_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, data: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Cache backend picked from configuration at startup.
#[derive(Debug, Clone)]
pub enum CacheStorage {
    Local(LocalStorage),
    Memory(MemoryStorage),
}

impl CacheStorage {
    pub fn from_dir(dir: Option<&str>) -> Self {
        match dir {
            Some(dir) => CacheStorage::Local(LocalStorage::new(dir.to_string())),
            None => CacheStorage::Memory(MemoryStorage::new()),
        }
    }
}

impl KeyValueStorage for CacheStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self {
            CacheStorage::Local(s) => s.get(key).await,
            CacheStorage::Memory(s) => s.get(key).await,
        }
    }

    async fn set(&self, key: &str, data: &[u8]) -> Result<()> {
        match self {
            CacheStorage::Local(s) => s.set(key, data).await,
            CacheStorage::Memory(s) => s.set(key, data).await,
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match self {
            CacheStorage::Local(s) => s.remove(key).await,
            CacheStorage::Memory(s) => s.remove(key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_storage_roundtrip_and_missing_key() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().to_str().unwrap().to_string());

        assert!(storage.get("dashboard:all").await.unwrap().is_none());

        storage.set("dashboard:all", b"{}").await.unwrap();
        assert_eq!(storage.get("dashboard:all").await.unwrap(), Some(b"{}".to_vec()));
        assert!(temp_dir
            .path()
            .join(format!("{}.json", hex::encode("dashboard:all")))
            .exists());

        storage.remove("dashboard:all").await.unwrap();
        storage.remove("dashboard:all").await.unwrap();
        assert!(storage.get("dashboard:all").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_storage_keys_with_punctuation_stay_distinct() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().to_str().unwrap().to_string());

        storage.set("dashboard:acme.eu", b"1").await.unwrap();
        storage.set("dashboard:acme_eu", b"2").await.unwrap();
        storage.set("dashboard/../acme", b"3").await.unwrap();

        assert_eq!(storage.get("dashboard:acme.eu").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(storage.get("dashboard:acme_eu").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(storage.get("dashboard/../acme").await.unwrap(), Some(b"3".to_vec()));
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 3);

        storage.remove("dashboard:acme.eu").await.unwrap();
        assert_eq!(storage.get("dashboard:acme_eu").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        storage.set("k", b"v").await.unwrap();
        assert_eq!(storage.len().await, 1);
        storage.remove("k").await.unwrap();
        assert_eq!(storage.len().await, 0);
    }
}

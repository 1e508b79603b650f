//! Session-scoped key-value stores backing the result cache.
//!
//! [`FileStore`] keeps rendered reviews as HTML files in a directory the OS
//! clears when the session ends: the runtime directory
//! (`$XDG_RUNTIME_DIR/prlens`, emptied at logout), or on macOS the per-user
//! temporary directory (emptied at boot). Platforms with neither get a
//! [`MemoryStore`], which lives as long as the process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use sha2::{Digest, Sha256};

/// A key-value store scoped to a user session.
pub trait SessionStore: Send + Sync {
    /// Get the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> std::io::Result<()>;

    /// Remove the value under `key`. Missing keys are not an error.
    fn remove(&self, key: &str) -> std::io::Result<()>;

    /// Remove every entry and report what was removed.
    fn clear(&self) -> std::io::Result<CacheStats>;

    /// Count entries and their total size.
    fn stats(&self) -> std::io::Result<CacheStats>;

    /// Where entries are kept, for stores that live on disk.
    fn path(&self) -> Option<PathBuf> {
        None
    }
}

/// Directory for session files, if this platform has one the OS clears.
pub fn session_dir() -> Option<PathBuf> {
    session_dir_from(
        dirs::runtime_dir(),
        std::env::temp_dir(),
        cfg!(target_os = "macos"),
    )
}

fn session_dir_from(
    runtime_dir: Option<PathBuf>,
    temp_dir: PathBuf,
    temp_purged_at_boot: bool,
) -> Option<PathBuf> {
    match runtime_dir {
        Some(dir) => Some(dir.join(crate::constants::CONFIG_DIR)),
        None if temp_purged_at_boot => Some(temp_dir.join(crate::constants::CONFIG_DIR)),
        None => None,
    }
}

/// The default session store: files in [`session_dir`], or memory when the
/// platform has no directory that is cleared with the session.
pub fn default_store() -> Arc<dyn SessionStore> {
    match session_dir() {
        Some(dir) => Arc::new(FileStore::new_with_dir(dir)),
        None => {
            tracing::debug!("no session directory on this platform, caching in memory");
            Arc::new(MemoryStore::new())
        }
    }
}

/// Filesystem-backed session store.
pub struct FileStore {
    dir: Option<PathBuf>,
}

impl FileStore {
    /// Create a store in [`session_dir`]. Inert when there is none.
    pub fn new() -> Self {
        Self { dir: session_dir() }
    }

    /// Create a store rooted at `dir`.
    pub fn new_with_dir(dir: PathBuf) -> Self {
        Self { dir: Some(dir) }
    }

    /// File path for a key. Keys are URLs, so they are hashed.
    fn key_path(&self, key: &str) -> Option<PathBuf> {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.as_ref().map(|dir| dir.join(format!("{digest}.html")))
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.key_path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable cache entry");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        let Some(path) = self.key_path(key) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, value)
    }

    fn remove(&self, key: &str) -> std::io::Result<()> {
        let Some(path) = self.key_path(key) else {
            return Ok(());
        };
        match std::fs::remove_file(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn clear(&self) -> std::io::Result<CacheStats> {
        let stats = self.stats()?;
        if let Some(ref dir) = self.dir {
            if dir.exists() {
                std::fs::remove_dir_all(dir)?;
            }
        }
        Ok(stats)
    }

    fn stats(&self) -> std::io::Result<CacheStats> {
        let mut stats = CacheStats::default();
        let Some(ref dir) = self.dir else {
            return Ok(stats);
        };
        if !dir.exists() {
            return Ok(stats);
        }

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.path().extension().is_some_and(|e| e == "html") {
                stats.entries += 1;
                stats.total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        Ok(stats)
    }

    fn path(&self) -> Option<PathBuf> {
        self.dir.clone()
    }
}

/// In-process session store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::io::Result<MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| std::io::Error::other("memory store lock poisoned"))
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> std::io::Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn clear(&self) -> std::io::Result<CacheStats> {
        let mut entries = self.lock()?;
        let stats = CacheStats {
            entries: entries.len(),
            total_bytes: entries.values().map(|v| v.len() as u64).sum(),
        };
        entries.clear();
        Ok(stats)
    }

    fn stats(&self) -> std::io::Result<CacheStats> {
        let entries = self.lock()?;
        Ok(CacheStats {
            entries: entries.len(),
            total_bytes: entries.values().map(|v| v.len() as u64).sum(),
        })
    }
}

/// Statistics about the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached entries.
    pub entries: usize,
    /// Total size in bytes.
    pub total_bytes: u64,
}

impl CacheStats {
    /// Format total_bytes as a human-readable string.
    pub fn human_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = 1024 * KB;

        if self.total_bytes >= MB {
            format!("{:.1} MiB", self.total_bytes as f64 / MB as f64)
        } else if self.total_bytes >= KB {
            format!("{:.1} KiB", self.total_bytes as f64 / KB as f64)
        } else {
            format!("{} B", self.total_bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "https://patch-diff.githubusercontent.com/raw/o/r/pull/1.patch";

    #[test]
    fn file_store_set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new_with_dir(dir.path().to_path_buf());

        assert!(store.get(KEY).is_none());
        store.set(KEY, "<p>ok</p>").unwrap();
        assert_eq!(store.get(KEY).as_deref(), Some("<p>ok</p>"));

        store.remove(KEY).unwrap();
        assert!(store.get(KEY).is_none());
        // Removing again is fine.
        store.remove(KEY).unwrap();
    }

    #[test]
    fn file_store_hashes_url_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new_with_dir(dir.path().to_path_buf());
        store.set(KEY, "x").unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].len(), 64 + ".html".len());
    }

    #[test]
    fn file_store_stats_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("session");
        let store = FileStore::new_with_dir(root.clone());
        assert_eq!(store.stats().unwrap(), CacheStats::default());

        store.set("a", "12345").unwrap();
        store.set("b", "123").unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.total_bytes, 8);

        let cleared = store.clear().unwrap();
        assert_eq!(cleared.entries, 2);
        assert!(!root.exists());
        assert_eq!(store.path(), Some(root));
    }

    #[test]
    fn file_store_without_dir_is_inert() {
        let store = FileStore { dir: None };
        store.set("k", "v").unwrap();
        assert!(store.get("k").is_none());
        assert_eq!(store.stats().unwrap().entries, 0);
        assert!(store.path().is_none());
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v2"));
        assert_eq!(store.stats().unwrap().entries, 1);
        store.remove("k").unwrap();
        assert!(store.get("k").is_none());
    }

    #[test]
    fn poisoned_memory_store_reports_errors() {
        let store = Arc::new(MemoryStore::new());
        let holder = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = holder.entries.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(store.set("k", "v").is_err());
        assert!(store.remove("k").is_err());
        assert!(store.clear().is_err());
        assert!(store.get("k").is_none());
    }

    #[test]
    fn session_dir_prefers_runtime_dir() {
        let dir = session_dir_from(
            Some(PathBuf::from("/run/user/1000")),
            PathBuf::from("/tmp"),
            true,
        );
        assert_eq!(dir, Some(PathBuf::from("/run/user/1000/prlens")));
    }

    #[test]
    fn session_dir_uses_temp_only_when_purged_at_boot() {
        let temp = PathBuf::from("/var/folders/xy/T");
        assert_eq!(
            session_dir_from(None, temp.clone(), true),
            Some(temp.join("prlens"))
        );
        assert_eq!(session_dir_from(None, temp, false), None);
    }

    #[test]
    fn human_size_units() {
        let size = |total_bytes| CacheStats { entries: 1, total_bytes }.human_size();
        assert_eq!(size(500), "500 B");
        assert_eq!(size(2048), "2.0 KiB");
        assert_eq!(size(2 * 1024 * 1024), "2.0 MiB");
    }
}

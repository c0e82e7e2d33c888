//! Theme adapter persistence — keyed by theme fingerprint.
//!
//! Adapters are JSON files in a directory with an in-memory index rebuilt
//! on startup. There is no TTL: a fingerprint stays valid until explicitly
//! invalidated, because a structural theme change produces a *different*
//! fingerprint rather than mutating an existing entry.
//!
//! Writes go through a temp file + rename so a concurrent reader never
//! observes a partially written adapter.

use crate::adapter::ThemeAdapter;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

/// Errors from adapter persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt adapter record for {fingerprint}: {source}")]
    Corrupt {
        fingerprint: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Disk-backed store of theme adapters with an in-memory index.
///
/// Shared read-mostly: callers hold it behind `Arc` and every method takes
/// `&self`. The index lock is only held for map access, never across file
/// I/O on the read path after the initial scan.
pub struct AdapterStore {
    dir: PathBuf,
    index: RwLock<HashMap<String, ThemeAdapter>>,
}

impl AdapterStore {
    /// Open a store in `dir`, scanning existing `.json` records into the
    /// index so previously discovered adapters are available immediately.
    pub fn open(dir: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        let mut index = HashMap::new();
        if let Ok(entries) = fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match read_adapter(&path) {
                    Ok(adapter) => {
                        index.insert(adapter.theme_fingerprint.clone(), adapter);
                    }
                    Err(e) => {
                        // A corrupt record is skipped, not fatal: discovery
                        // can always rebuild it.
                        tracing::warn!("skipping unreadable adapter {}: {e}", path.display());
                    }
                }
            }
        }

        tracing::debug!(
            "adapter store opened: {} entries from {}",
            index.len(),
            dir.display()
        );

        Ok(Self {
            dir,
            index: RwLock::new(index),
        })
    }

    /// Open the default store (`~/.veneer/adapters/`).
    pub fn open_default() -> Result<Self, StoreError> {
        let dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".veneer")
            .join("adapters");
        Self::open(dir)
    }

    /// Fetch the adapter for a fingerprint, if one is stored.
    pub fn get(&self, fingerprint: &str) -> Option<ThemeAdapter> {
        self.index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(fingerprint)
            .cloned()
    }

    /// Persist an adapter, replacing any previous entry for its
    /// fingerprint. The on-disk write is atomic per fingerprint.
    pub fn put(&self, adapter: ThemeAdapter) -> Result<(), StoreError> {
        let path = self.record_path(&adapter.theme_fingerprint);
        let tmp = path.with_extension("json.tmp");

        let data = serde_json::to_vec_pretty(&adapter).map_err(|source| StoreError::Corrupt {
            fingerprint: adapter.theme_fingerprint.clone(),
            source,
        })?;
        fs::write(&tmp, data).map_err(|source| StoreError::Io {
            path: tmp.display().to_string(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;

        self.index
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(adapter.theme_fingerprint.clone(), adapter);
        Ok(())
    }

    /// Drop the entry for a fingerprint, both index and disk. Returns
    /// whether an entry existed.
    pub fn invalidate(&self, fingerprint: &str) -> bool {
        let removed = self
            .index
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(fingerprint)
            .is_some();
        if removed {
            let _ = fs::remove_file(self.record_path(fingerprint));
        }
        removed
    }

    /// All stored fingerprints.
    pub fn fingerprints(&self) -> Vec<String> {
        self.index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Remove every stored adapter.
    pub fn clear(&self) {
        let fingerprints = self.fingerprints();
        for fp in fingerprints {
            self.invalidate(&fp);
        }
    }

    pub fn len(&self) -> usize {
        self.index.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, fingerprint: &str) -> PathBuf {
        // Fingerprints are hex strings, but sanitize anyway.
        let safe: String = fingerprint
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

fn read_adapter(path: &Path) -> Result<ThemeAdapter, StoreError> {
    let data = fs::read(path).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| StoreError::Corrupt {
        fingerprint: path.display().to_string(),
        source,
    })
}

//! Persistent key/value backends behind the expiring cache.
//!
//! Both backends store opaque strings; the cache owns the JSON layout.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use log::{debug, warn};

use crate::error::{PaperCatsError, Result};

pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: String) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

/* --------------------------------------------------------------------- */
/*  In-memory                                                            */
/* --------------------------------------------------------------------- */
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set_item(&self, key: &str, value: String) -> Result<()> {
        self.items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

/* --------------------------------------------------------------------- */
/*  Single JSON file on disk                                             */
/* --------------------------------------------------------------------- */
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: RwLock<HashMap<String, String>>,
}

impl FileStorage {
    /// Open the store at `path`. A missing file is an empty store; an
    /// unreadable one is reported rather than silently discarded.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let items = if path.exists() {
            let bytes = fs::read(&path)
                .map_err(|e| PaperCatsError::Storage(format!("reading {}: {e}", path.display())))?;
            serde_json::from_slice(&bytes)
                .map_err(|e| PaperCatsError::Storage(format!("parsing {}: {e}", path.display())))?
        } else {
            HashMap::new()
        };
        debug!("📂 [STORAGE] opened {} ({} items)", path.display(), items.len());

        Ok(Self {
            path,
            items: RwLock::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| PaperCatsError::Storage(e.to_string()))?;
            }
        }
        let json = serde_json::to_vec_pretty(items)
            .map_err(|e| PaperCatsError::Storage(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| {
            warn!("⚠️ [STORAGE] failed writing {}: {}", self.path.display(), e);
            PaperCatsError::Storage(format!("writing {}: {e}", self.path.display()))
        })
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set_item(&self, key: &str, value: String) -> Result<()> {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        let mut next = items.clone();
        next.insert(key.to_string(), value);
        // memory only moves once the file has
        self.persist(&next)?;
        *items = next;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        if !items.contains_key(key) {
            return Ok(());
        }
        let mut next = items.clone();
        next.remove(key);
        self.persist(&next)?;
        *items = next;
        Ok(())
    }
}

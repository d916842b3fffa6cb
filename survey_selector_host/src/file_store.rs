//! Durable key-value tier persisted as a single JSON object file.
//!
//! The whole map is held in memory and rewritten on every mutation (temp file, then
//! rename). Quarantine state is a handful of small records, so this stays cheap.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use survey_selector_core::{KvStore, StoreResult};

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    map: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`. A missing file starts empty; an
    /// unreadable or corrupt file is logged and also starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, String>>(&bytes) {
                Ok(map) => map,
                Err(err) => {
                    log::warn!("ignoring corrupt quarantine file {}: {err}", path.display());
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                log::warn!("cannot read quarantine file {}: {err}", path.display());
                BTreeMap::new()
            }
        };
        log::debug!("opened quarantine file {} ({} entries)", path.display(), map.len());
        Self {
            path,
            map: Mutex::new(map),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling of the store file with `.tmp` appended to the full file name.
    pub fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Apply `change` to a copy of the map, persist the copy and swap it in. On a
    /// persist error the in-memory map is left untouched.
    fn commit<F>(&self, change: F) -> StoreResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let mut map = self.map.lock();
        let mut next = map.clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.persist(&next)?;
        *map = next;
        Ok(())
    }

    fn persist(&self, map: &BTreeMap<String, String>) -> StoreResult<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let tmp = self.tmp_path();
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&serde_json::to_vec_pretty(map)?)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> StoreResult<()> {
        self.commit(|map| {
            map.insert(key.to_string(), value);
            true
        })
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.commit(|map| map.remove(key).is_some())
    }

    fn entries(&self) -> StoreResult<Vec<(String, String)>> {
        Ok(self
            .map
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn clear(&self) -> StoreResult<()> {
        self.commit(|map| {
            map.clear();
            true
        })
    }
}

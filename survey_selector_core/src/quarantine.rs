//! Quarantine persistence: a two-tier key-value port with lazy expiry.
//!
//! Records carrying an expiry live in the durable tier, records without one in the
//! session tier. Reads check durable first, then session. Expired records are removed
//! when read; nothing sweeps in the background.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

pub const QUARANTINE_MARKER: &str = "true";

/// Serialized form: `{"value":"true","expiry":<epoch-ms>}`; `expiry` omitted for session records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

impl QuarantineRecord {
    pub fn new(expiry: Option<i64>) -> Self {
        Self {
            value: QUARANTINE_MARKER.to_string(),
            expiry,
        }
    }

    #[inline]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expiry, Some(e) if now_ms > e)
    }

    pub fn to_json(&self) -> StoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTier {
    Durable,
    Session,
}

impl StorageTier {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageTier::Durable => "durable",
            StorageTier::Session => "session",
        }
    }

    #[inline]
    pub fn for_expiry(expiry: Option<i64>) -> Self {
        if expiry.is_some() {
            StorageTier::Durable
        } else {
            StorageTier::Session
        }
    }
}

/// Synchronous string key-value capability.
pub trait KvStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    fn set(&self, key: &str, value: String) -> StoreResult<()>;
    fn remove(&self, key: &str) -> StoreResult<()>;
    /// All entries, sorted by key.
    fn entries(&self) -> StoreResult<Vec<(String, String)>>;
    fn clear(&self) -> StoreResult<()>;
}

pub type SharedKv = Arc<dyn KvStore + Send + Sync>;

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key)
    }
    fn set(&self, key: &str, value: String) -> StoreResult<()> {
        (**self).set(key, value)
    }
    fn remove(&self, key: &str) -> StoreResult<()> {
        (**self).remove(key)
    }
    fn entries(&self) -> StoreResult<Vec<(String, String)>> {
        (**self).entries()
    }
    fn clear(&self) -> StoreResult<()> {
        (**self).clear()
    }
}

/// In-process store. Used as the session tier, and as the durable tier when nothing
/// outlives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedKv {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> StoreResult<()> {
        self.map.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.map.lock().remove(key);
        Ok(())
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
        self.map.lock().clear();
        Ok(())
    }
}

/// The two tiers behind one `get` / `set` / `delete` port.
#[derive(Clone)]
pub struct QuarantineStore {
    durable: SharedKv,
    session: SharedKv,
}

impl std::fmt::Debug for QuarantineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuarantineStore").finish_non_exhaustive()
    }
}

impl Default for QuarantineStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl QuarantineStore {
    pub fn new(durable: SharedKv, session: SharedKv) -> Self {
        Self { durable, session }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::shared(), MemoryStore::shared())
    }

    pub fn durable(&self) -> &SharedKv {
        &self.durable
    }

    pub fn session(&self) -> &SharedKv {
        &self.session
    }

    pub fn tier(&self, tier: StorageTier) -> &SharedKv {
        match tier {
            StorageTier::Durable => &self.durable,
            StorageTier::Session => &self.session,
        }
    }

    /// Live record for `key`, if any.
    ///
    /// The first tier holding the key decides: an expired durable record is deleted and
    /// reported as absent without falling through to the session tier. Records that
    /// fail to parse are dropped and reported as absent.
    pub fn get(&self, key: &str, now_ms: i64) -> StoreResult<Option<(StorageTier, QuarantineRecord)>> {
        let (tier, raw) = match self.durable.get(key)? {
            Some(raw) => (StorageTier::Durable, raw),
            None => match self.session.get(key)? {
                Some(raw) => (StorageTier::Session, raw),
                None => return Ok(None),
            },
        };

        let rec = match QuarantineRecord::from_json(&raw) {
            Ok(rec) => rec,
            Err(err) => {
                log::warn!("dropping unreadable quarantine record {key}: {err}");
                self.tier(tier).remove(key)?;
                return Ok(None);
            }
        };

        if rec.is_expired(now_ms) {
            self.tier(tier).remove(key)?;
            return Ok(None);
        }

        Ok(Some((tier, rec)))
    }

    pub fn set(&self, key: &str, expiry: Option<i64>) -> StoreResult<StorageTier> {
        let tier = StorageTier::for_expiry(expiry);
        let raw = QuarantineRecord::new(expiry).to_json()?;
        self.tier(tier).set(key, raw)?;
        Ok(tier)
    }

    /// Remove `key` from both tiers.
    pub fn delete(&self, key: &str) -> StoreResult<()> {
        let d = self.durable.remove(key);
        let s = self.session.remove(key);
        d.and(s)
    }

    /// Remove expired durable records under `prefix`. The engine never calls this;
    /// hosts may run it before exporting state.
    pub fn purge_expired(&self, prefix: &str, now_ms: i64) -> StoreResult<usize> {
        let mut purged = 0;
        for (key, raw) in self.durable.entries()? {
            if !key.starts_with(prefix) {
                continue;
            }
            let expired = match QuarantineRecord::from_json(&raw) {
                Ok(rec) => rec.is_expired(now_ms),
                Err(_) => true,
            };
            if expired {
                self.durable.remove(&key)?;
                purged += 1;
            }
        }
        Ok(purged)
    }
}

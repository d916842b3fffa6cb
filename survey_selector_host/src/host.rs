//! Host-facing wrapper around `SelectionEngine`.
//!
//! - builds the two quarantine tiers from `HostConfig`
//! - loads registries from JSON documents
//! - ends sessions (drops session-tier entries)
//! - exports / imports quarantine state as a storage-agnostic snapshot
//!
//! No async. No rendering, no page mapping: candidates come from the caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use survey_selector_core::{
    Candidates, KvStore, MemoryStore, QuarantineRecord, QuarantineStore, SelectionEngine,
    SelectionObserver, SelectorCfg, SharedKv, StorageTier, SurveyDefinition, SurveyRegistry,
};

use crate::adapter::registry_from_json_str;
use crate::config::HostConfig;
use crate::error::HostResult;
use crate::file_store::JsonFileStore;

/// One quarantine entry, keyed by survey id (prefix stripped).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub survey_id: String,
    pub record: QuarantineRecord,
}

/// Snapshot of quarantine state for storage-agnostic persistence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineSnapshot {
    /// Sorted by survey id.
    pub entries: Vec<SnapshotEntry>,
}

/// Counters returned by restore operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreStats {
    /// Entries written from the snapshot.
    pub applied: usize,
    /// Entries that replaced an existing record for the same survey.
    pub overwritten: usize,
}

#[derive(Debug)]
pub struct SelectorHost {
    engine: SelectionEngine,
}

impl SelectorHost {
    /// Build a host from configuration: file-backed durable tier when `durable_path`
    /// is set, memory otherwise; session tier always in memory.
    pub fn new(config: HostConfig) -> Self {
        let durable: SharedKv = match &config.durable_path {
            Some(path) => Arc::new(JsonFileStore::open(path.clone())),
            None => MemoryStore::shared(),
        };
        let store = QuarantineStore::new(durable, MemoryStore::shared());
        Self::from_engine(SelectionEngine::new(config.selector, store))
    }

    /// Wrap a pre-built engine (custom sampler, clock or stores).
    pub fn from_engine(engine: SelectionEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &SelectionEngine {
        &self.engine
    }

    pub fn cfg(&self) -> &SelectorCfg {
        self.engine.cfg()
    }

    pub fn set_registry(&mut self, registry: SurveyRegistry) {
        self.engine.set_registry(registry);
    }

    /// Replace the registry from a JSON document. Returns the number of surveys loaded.
    /// On error the current registry is kept.
    pub fn load_registry_json(&mut self, text: &str) -> HostResult<usize> {
        let registry = registry_from_json_str(text)?;
        let n = registry.len();
        self.engine.set_registry(registry);
        log::debug!("installed survey registry ({n} surveys)");
        Ok(n)
    }

    pub fn set_observer(&mut self, observer: impl SelectionObserver + 'static) {
        self.engine.set_observer(observer);
    }

    pub fn choose(&self, candidates: impl Into<Candidates>) -> Option<&SurveyDefinition> {
        self.engine.choose_survey(candidates)
    }

    pub fn quarantine(&self, survey_id: &str, days: u32) {
        self.engine.quarantine_survey(survey_id, days);
    }

    pub fn is_quarantined(&self, survey_id: &str) -> bool {
        self.engine.is_quarantined(survey_id)
    }

    /// The browsing session ended: drop every session-scoped entry.
    pub fn end_session(&self) -> HostResult<()> {
        self.engine.store().session().clear()?;
        Ok(())
    }

    /// Export live quarantine entries from both tiers.
    ///
    /// Expired durable entries are purged first. Deterministic ordering: sorted by
    /// survey id; a durable entry shadows a session entry for the same survey, matching
    /// read order.
    pub fn snapshot(&self) -> HostResult<QuarantineSnapshot> {
        let store = self.engine.store();
        let prefix = self.cfg().quarantine_key_prefix.as_str();
        let now = self.engine.now_ms();
        let purged = store.purge_expired(prefix, now)?;
        if purged > 0 {
            log::debug!("purged {purged} expired quarantine entries before snapshot");
        }

        let mut entries: Vec<SnapshotEntry> = Vec::new();
        for tier in [StorageTier::Durable, StorageTier::Session] {
            for (key, raw) in store.tier(tier).entries()? {
                let Some(survey_id) = key.strip_prefix(prefix) else {
                    continue;
                };
                if entries.iter().any(|e| e.survey_id == survey_id) {
                    continue;
                }
                match QuarantineRecord::from_json(&raw) {
                    Ok(record) if !record.is_expired(now) => entries.push(SnapshotEntry {
                        survey_id: survey_id.to_string(),
                        record,
                    }),
                    Ok(_) => {}
                    Err(err) => log::warn!("skipping unreadable quarantine record {key}: {err}"),
                }
            }
        }

        entries.sort_by(|a, b| a.survey_id.cmp(&b.survey_id));
        Ok(QuarantineSnapshot { entries })
    }

    /// Replace all quarantine state under this host's prefix with `snap`.
    ///
    /// Snapshot entries are written before stale keys are removed, so a failed write
    /// leaves the previous state in place rather than an empty store.
    pub fn restore(&self, snap: QuarantineSnapshot) -> HostResult<RestoreStats> {
        let store = self.engine.store();
        let prefix = self.cfg().quarantine_key_prefix.clone();
        let mut stale = Vec::new();
        for tier in [StorageTier::Durable, StorageTier::Session] {
            for (key, _) in store.tier(tier).entries()? {
                if key.starts_with(&prefix) {
                    stale.push((tier, key));
                }
            }
        }

        let written = self.import_entries(snap.entries)?;
        for (tier, key) in stale {
            if !written.contains(&(tier, key.clone())) {
                store.tier(tier).remove(&key)?;
            }
        }
        Ok(RestoreStats {
            applied: written.len(),
            overwritten: 0,
        })
    }

    /// Merge `snap` into current state; snapshot entries win on conflict.
    pub fn restore_merge(&self, snap: QuarantineSnapshot) -> HostResult<RestoreStats> {
        let store = self.engine.store();
        let now = self.engine.now_ms();
        let mut overwritten = 0;
        for entry in snap.entries.iter().filter(|e| !e.record.is_expired(now)) {
            let key = self.cfg().quarantine_key(&entry.survey_id);
            if store.durable().get(&key)?.is_some() || store.session().get(&key)?.is_some() {
                overwritten += 1;
            }
        }
        let applied = self.import_entries(snap.entries)?.len();
        Ok(RestoreStats {
            applied,
            overwritten,
        })
    }

    /// Write live snapshot entries. Each record goes to the tier its expiry selects and
    /// is then removed from the other tier. Entries already expired are skipped.
    fn import_entries(&self, entries: Vec<SnapshotEntry>) -> HostResult<Vec<(StorageTier, String)>> {
        let store = self.engine.store();
        let now = self.engine.now_ms();
        let mut written = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.record.is_expired(now) {
                log::debug!("skipping expired snapshot entry {}", entry.survey_id);
                continue;
            }
            let key = self.cfg().quarantine_key(&entry.survey_id);
            let tier = store.set(&key, entry.record.expiry)?;
            let other = match tier {
                StorageTier::Durable => StorageTier::Session,
                StorageTier::Session => StorageTier::Durable,
            };
            store.tier(other).remove(&key)?;
            written.push((tier, key));
        }
        Ok(written)
    }
}

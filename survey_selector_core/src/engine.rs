//! The selection engine: quarantine filter, sampling roll, highest-priority pick.

use crate::candidates::Candidates;
use crate::cfg::SelectorCfg;
use crate::clock::{expiry_after_days, Clock, SystemClock};
use crate::events::{diagnostic, emit, NullObserver, SelectionEvent, SelectionObserver};
use crate::quarantine::{QuarantineStore, StorageTier};
use crate::sampling::{sampled_in, Sampler, ThreadRngSampler};
use crate::survey::{SurveyDefinition, SurveyRegistry};

/// Starting best priority. Priorities are expected to be non-negative; anything at or
/// below this never wins.
pub const PRIORITY_FLOOR: i64 = -1;

pub struct SelectionEngine {
    cfg: SelectorCfg,
    registry: SurveyRegistry,
    store: QuarantineStore,
    sampler: Box<dyn Sampler>,
    clock: Box<dyn Clock>,
    observer: Box<dyn SelectionObserver>,
}

impl std::fmt::Debug for SelectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionEngine")
            .field("cfg", &self.cfg)
            .field("surveys", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl SelectionEngine {
    /// Engine with an empty registry, `rand` draws, the system clock and no observer.
    pub fn new(cfg: SelectorCfg, store: QuarantineStore) -> Self {
        Self {
            cfg,
            registry: SurveyRegistry::default(),
            store,
            sampler: Box::new(ThreadRngSampler),
            clock: Box::new(SystemClock),
            observer: Box::new(NullObserver),
        }
    }

    pub fn with_registry(mut self, registry: SurveyRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_sampler(mut self, sampler: impl Sampler + 'static) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_observer(mut self, observer: impl SelectionObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn cfg(&self) -> &SelectorCfg {
        &self.cfg
    }

    pub fn set_cfg(&mut self, cfg: SelectorCfg) {
        self.cfg = cfg;
    }

    pub fn registry(&self) -> &SurveyRegistry {
        &self.registry
    }

    /// Replace the registry wholesale.
    pub fn set_registry(&mut self, registry: SurveyRegistry) {
        self.registry = registry;
    }

    pub fn set_observer(&mut self, observer: impl SelectionObserver + 'static) {
        self.observer = Box::new(observer);
    }

    pub fn store(&self) -> &QuarantineStore {
        &self.store
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Pick the highest-priority eligible candidate.
    ///
    /// Every resolvable candidate goes through the eligibility check, winner or not,
    /// so sampling-time quarantine is applied to all of them. Ties keep the first seen.
    pub fn choose_survey(&self, candidates: impl Into<Candidates>) -> Option<&SurveyDefinition> {
        let ids = candidates.into().normalize();
        if ids.is_empty() {
            return None;
        }

        let mut max_priority = PRIORITY_FLOOR;
        let mut best: Option<&SurveyDefinition> = None;

        for id in &ids {
            let Some(survey) = self.registry.get(id) else {
                self.log(&format!("no configuration for survey {id}"));
                self.emit(SelectionEvent::MissingConfig {
                    survey_id: id.clone(),
                });
                continue;
            };

            let eligible = self.evaluate(survey);
            match survey.priority {
                Some(p) if eligible && p > max_priority => {
                    max_priority = p;
                    best = Some(survey);
                }
                None if eligible => {
                    self.log(&format!("survey {id} has no usable priority"));
                }
                _ => {}
            }
        }

        match best {
            Some(survey) => {
                self.log(&format!("chose survey {} (priority {max_priority})", survey.id));
                self.emit(SelectionEvent::Chosen {
                    survey_id: survey.id.clone(),
                    priority: max_priority,
                });
            }
            None => {
                self.log(&format!("no survey chosen from [{}]", ids.join(",")));
                self.emit(SelectionEvent::NoneChosen { candidates: ids });
            }
        }
        best
    }

    /// Quarantine + sampling check for one survey. May write quarantine state.
    pub fn evaluate(&self, survey: &SurveyDefinition) -> bool {
        let key = self.cfg.quarantine_key(&survey.id);

        match self.store.get(&key, self.clock.now_ms()) {
            Ok(Some((storage, _))) => {
                self.emit(SelectionEvent::QuarantinedBlock {
                    survey_id: survey.id.clone(),
                    storage,
                });
                return false;
            }
            Ok(None) => {}
            Err(err) => {
                log::warn!("quarantine read for {key} failed: {err}");
                self.log(&format!("quarantine read failed for {}; treating as clear", survey.id));
            }
        }

        let threshold = survey.percentage;
        let draw = self.sampler.draw();
        let days = survey.quarantine_days;

        if sampled_in(draw, threshold) {
            if days > 0 && self.write_quarantine(&key, days).is_some() {
                self.emit(SelectionEvent::QuarantineSetOnSample {
                    survey_id: survey.id.clone(),
                    days,
                });
            }
            self.emit(SelectionEvent::IncludedBySampling {
                survey_id: survey.id.clone(),
                draw,
                threshold,
            });
            return true;
        }

        if self.cfg.user_sampling {
            if days > 0 {
                self.write_quarantine(&key, days);
            }
            self.emit(SelectionEvent::ExcludedQuarantinedUserSampling {
                survey_id: survey.id.clone(),
                draw,
                threshold,
                days,
            });
        } else {
            self.emit(SelectionEvent::ExcludedNotQuarantinedEventSampling {
                survey_id: survey.id.clone(),
                draw,
                threshold,
            });
        }
        false
    }

    /// Quarantine at display time. `days == 0` writes a session entry, otherwise a
    /// durable entry expiring `days` from now.
    pub fn quarantine_survey(&self, survey_id: &str, days: u32) {
        let survey_id = survey_id.trim();
        if survey_id.is_empty() {
            self.log("quarantine requested without a survey id");
            return;
        }

        let key = self.cfg.quarantine_key(survey_id);
        if let Some(storage) = self.write_quarantine(&key, days) {
            self.log(&format!("quarantined survey {survey_id} in {} storage", storage.as_str()));
            self.emit(SelectionEvent::Quarantined {
                survey_id: survey_id.to_string(),
                days,
                storage,
            });
        }
    }

    pub fn is_quarantined(&self, survey_id: &str) -> bool {
        let key = self.cfg.quarantine_key(survey_id.trim());
        match self.store.get(&key, self.clock.now_ms()) {
            Ok(found) => found.is_some(),
            Err(err) => {
                log::warn!("quarantine read for {key} failed: {err}");
                false
            }
        }
    }

    /// Drop any quarantine entry for `survey_id` from both tiers.
    pub fn release_survey(&self, survey_id: &str) {
        let key = self.cfg.quarantine_key(survey_id.trim());
        match self.store.delete(&key) {
            Ok(()) => self.log(&format!("released survey {}", survey_id.trim())),
            Err(err) => log::warn!("quarantine delete for {key} failed: {err}"),
        }
    }

    fn write_quarantine(&self, key: &str, days: u32) -> Option<StorageTier> {
        let expiry = (days > 0).then(|| expiry_after_days(self.clock.now_ms(), days));
        match self.store.set(key, expiry) {
            Ok(tier) => Some(tier),
            Err(err) => {
                log::warn!("quarantine write for {key} failed: {err}");
                self.log(&format!("could not write quarantine entry {key}"));
                None
            }
        }
    }

    #[inline]
    fn emit(&self, event: SelectionEvent) {
        emit(self.observer.as_ref(), event);
    }

    #[inline]
    fn log(&self, message: &str) {
        diagnostic(self.observer.as_ref(), message);
    }
}

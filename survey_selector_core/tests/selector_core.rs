use std::sync::Arc;

use serde_json::{json, Value};
use survey_selector_core::*;

const NOW: i64 = 1_700_000_000_000;

struct Rig {
    engine: SelectionEngine,
    observer: Arc<RecordingObserver>,
    clock: Arc<ManualClock>,
    store: QuarantineStore,
}

fn rig(cfg: SelectorCfg, draw: u32, surveys: Vec<SurveyDefinition>) -> Rig {
    let observer = Arc::new(RecordingObserver::new());
    let clock = Arc::new(ManualClock::new(NOW));
    let store = QuarantineStore::in_memory();
    let engine = SelectionEngine::new(cfg, store.clone())
        .with_registry(SurveyRegistry::from_definitions(surveys))
        .with_sampler(FixedSampler(draw))
        .with_clock(clock.clone())
        .with_observer(observer.clone());
    Rig { engine, observer, clock, store }
}

fn survey(id: &str, priority: i64, percentage: i64) -> SurveyDefinition {
    SurveyDefinition::new(id, priority, percentage, 0)
}

fn stored(store: &QuarantineStore, tier: StorageTier, key: &str) -> Option<QuarantineRecord> {
    store
        .tier(tier)
        .get(key)
        .unwrap()
        .map(|raw| QuarantineRecord::from_json(&raw).unwrap())
}

#[test]
fn empty_input_returns_none_without_events() {
    let r = rig(SelectorCfg::default(), 0, vec![survey("A", 1, 100)]);
    assert!(r.engine.choose_survey("").is_none());
    assert!(r.engine.choose_survey(" , ,").is_none());
    assert!(r.engine.choose_survey(Value::Null).is_none());
    assert!(r.engine.choose_survey(json!(false)).is_none());
    assert!(r.engine.choose_survey(json!(0)).is_none());
    assert!(r.engine.choose_survey(Vec::<String>::new()).is_none());
    assert!(r.engine.choose_survey(None::<&str>).is_none());
    assert!(r.observer.events().is_empty());
}

#[test]
fn unresolved_candidates_report_missing_config_then_none_chosen() {
    let r = rig(SelectorCfg::default(), 0, vec![survey("A", 1, 100)]);
    assert!(r.engine.choose_survey("X, Y").is_none());
    assert_eq!(
        r.observer.events(),
        vec![
            SelectionEvent::MissingConfig { survey_id: "X".into() },
            SelectionEvent::MissingConfig { survey_id: "Y".into() },
            SelectionEvent::NoneChosen {
                candidates: vec!["X".into(), "Y".into()]
            },
        ]
    );
}

#[test]
fn higher_priority_wins_in_any_order() {
    for input in ["low,high", "high,low"] {
        let r = rig(
            SelectorCfg::default(),
            0,
            vec![survey("low", 5, 100), survey("high", 10, 100)],
        );
        let chosen = r.engine.choose_survey(input).unwrap();
        assert_eq!(chosen.id, "high");
    }
}

#[test]
fn equal_priority_keeps_first_seen() {
    let r = rig(
        SelectorCfg::default(),
        0,
        vec![survey("A", 3, 100), survey("B", 3, 100)],
    );
    assert_eq!(r.engine.choose_survey("B,A").unwrap().id, "B");
    assert_eq!(r.engine.choose_survey(vec!["A", "B"]).unwrap().id, "A");
}

#[test]
fn sampling_boundaries_are_inclusive() {
    // (draw, percentage 100 eligible, percentage 0 eligible)
    for (draw, full, zero) in [(0, true, true), (1, true, false), (50, true, false), (99, true, false), (100, true, false)] {
        let r = rig(
            SelectorCfg::default(),
            draw,
            vec![survey("full", 1, 100), survey("zero", 1, 0)],
        );
        let full_survey = r.engine.registry().get("full").unwrap().clone();
        let zero_survey = r.engine.registry().get("zero").unwrap().clone();
        assert_eq!(r.engine.evaluate(&full_survey), full, "draw {draw} pct 100");
        assert_eq!(r.engine.evaluate(&zero_survey), zero, "draw {draw} pct 0");
    }
}

#[test]
fn quarantined_survey_is_never_chosen() {
    let r = rig(SelectorCfg::default(), 0, vec![survey("A", 9, 100), survey("B", 1, 100)]);
    r.engine.quarantine_survey("A", 3);
    r.observer.clear();

    let chosen = r.engine.choose_survey("A,B").unwrap();
    assert_eq!(chosen.id, "B");
    assert_eq!(
        r.observer.event_types(),
        vec![
            "survey_quarantined_block",
            "survey_included_by_sampling",
            "survey_chosen"
        ]
    );
}

#[test]
fn expired_durable_entry_is_removed_on_read() {
    let r = rig(SelectorCfg::default(), 0, vec![survey("A", 1, 100)]);
    r.engine.quarantine_survey("A", 1);
    assert!(r.engine.is_quarantined("A"));

    r.clock.advance_days(1);
    r.clock.advance_ms(1);
    assert!(!r.engine.is_quarantined("A"));
    assert!(stored(&r.store, StorageTier::Durable, "neb_A").is_none());
    assert_eq!(r.engine.choose_survey("A").unwrap().id, "A");
}

#[test]
fn entry_at_exact_expiry_still_blocks() {
    let r = rig(SelectorCfg::default(), 0, vec![survey("A", 1, 100)]);
    r.engine.quarantine_survey("A", 1);
    r.clock.advance_days(1);
    assert!(r.engine.is_quarantined("A"));
}

#[test]
fn user_sampling_quarantines_excluded_surveys() {
    let cfg = SelectorCfg {
        user_sampling: true,
        ..SelectorCfg::default()
    };
    let r = rig(cfg, 80, vec![SurveyDefinition::new("A", 1, 10, 7)]);
    assert!(r.engine.choose_survey("A").is_none());

    let rec = stored(&r.store, StorageTier::Durable, "neb_A").expect("durable entry");
    assert_eq!(rec.expiry, Some(NOW + 7 * MS_PER_DAY));
    assert_eq!(
        r.observer.event_types(),
        vec!["survey_excluded_quarantined_user_sampling", "survey_none_chosen"]
    );
}

#[test]
fn event_sampling_leaves_excluded_surveys_unquarantined() {
    let r = rig(SelectorCfg::default(), 80, vec![SurveyDefinition::new("A", 1, 10, 7)]);
    assert!(r.engine.choose_survey("A").is_none());
    assert!(stored(&r.store, StorageTier::Durable, "neb_A").is_none());
    assert!(stored(&r.store, StorageTier::Session, "neb_A").is_none());
    assert_eq!(
        r.observer.event_types(),
        vec!["survey_excluded_not_quarantined_event_sampling", "survey_none_chosen"]
    );
}

#[test]
fn inclusion_with_quarantine_days_writes_entry_at_sampling_time() {
    let r = rig(
        SelectorCfg::default(),
        0,
        vec![SurveyDefinition::new("A", 1, 100, 30), SurveyDefinition::new("B", 5, 100, 2)],
    );
    assert_eq!(r.engine.choose_survey("A,B").unwrap().id, "B");

    // Both were sampled in, so both are quarantined even though only B won.
    assert!(r.engine.is_quarantined("A"));
    assert!(r.engine.is_quarantined("B"));
    assert_eq!(
        r.observer.event_types(),
        vec![
            "survey_quarantine_set_on_sample",
            "survey_included_by_sampling",
            "survey_quarantine_set_on_sample",
            "survey_included_by_sampling",
            "survey_chosen",
        ]
    );
}

#[test]
fn manual_quarantine_picks_storage_tier_by_days() {
    let r = rig(SelectorCfg::default(), 0, vec![]);

    r.engine.quarantine_survey("S", 0);
    let rec = stored(&r.store, StorageTier::Session, "neb_S").expect("session entry");
    assert_eq!(rec.expiry, None);
    assert!(stored(&r.store, StorageTier::Durable, "neb_S").is_none());

    r.engine.quarantine_survey("D", 10);
    let rec = stored(&r.store, StorageTier::Durable, "neb_D").expect("durable entry");
    let expected = NOW + 10 * MS_PER_DAY;
    assert!((rec.expiry.unwrap() - expected).abs() < 1_000);

    assert_eq!(
        r.observer.events(),
        vec![
            SelectionEvent::Quarantined {
                survey_id: "S".into(),
                days: 0,
                storage: StorageTier::Session
            },
            SelectionEvent::Quarantined {
                survey_id: "D".into(),
                days: 10,
                storage: StorageTier::Durable
            },
        ]
    );
}

#[test]
fn write_then_read_round_trip() {
    let r = rig(SelectorCfg::default(), 0, vec![]);
    r.engine.quarantine_survey("A", 0);
    r.engine.quarantine_survey("B", 4);
    assert!(r.engine.is_quarantined("A"));
    assert!(r.engine.is_quarantined("B"));
    assert!(!r.engine.is_quarantined("C"));

    r.engine.release_survey("B");
    assert!(!r.engine.is_quarantined("B"));
}

#[test]
fn two_full_percentage_surveys_scenario() {
    let registry = SurveyRegistry::from_json_value(&json!({
        "A": { "priority": 1, "percentage": 100 },
        "B": { "priority": 2, "percentage": 100 }
    }))
    .unwrap();
    let r = rig(SelectorCfg::default(), 42, vec![]);
    let mut engine = r.engine;
    engine.set_registry(registry);

    assert_eq!(engine.choose_survey("A,B").unwrap().id, "B");
    assert_eq!(
        r.observer.events(),
        vec![
            SelectionEvent::IncludedBySampling {
                survey_id: "A".into(),
                draw: 42,
                threshold: 100
            },
            SelectionEvent::IncludedBySampling {
                survey_id: "B".into(),
                draw: 42,
                threshold: 100
            },
            SelectionEvent::Chosen {
                survey_id: "B".into(),
                priority: 2
            },
        ]
    );
}

#[test]
fn malformed_fields_are_coerced() {
    let registry = SurveyRegistry::from_json_value(&json!([
        { "id": 7, "priority": "12", "percentage": "100", "name": "Exit poll" },
        { "id": "bad", "priority": "high", "percentage": 100 },
        { "id": "nopct", "priority": 50, "percentage": "lots", "quarantineDays": "x" }
    ]))
    .unwrap();

    let seven = registry.get("7").unwrap();
    assert_eq!(seven.priority, Some(12));
    assert_eq!(seven.percentage, 100);
    assert_eq!(seven.name(), Some("Exit poll"));

    let bad = registry.get("bad").unwrap();
    assert_eq!(bad.priority, None);

    let nopct = registry.get("nopct").unwrap();
    assert_eq!(nopct.percentage, 0);
    assert_eq!(nopct.quarantine_days, 0);

    // "bad" is eligible but can't compete; "nopct" only passes on draw 0.
    let r = rig(SelectorCfg::default(), 5, vec![]);
    let mut engine = r.engine;
    engine.set_registry(registry);
    assert_eq!(engine.choose_survey(json!(["bad", 7, "nopct"])).unwrap().id, "7");
    assert!(engine.choose_survey("bad").is_none());
}

#[test]
fn corrupted_record_counts_as_absent() {
    let r = rig(SelectorCfg::default(), 0, vec![survey("A", 1, 100)]);
    r.store.durable().set("neb_A", "{not json".to_string()).unwrap();
    assert_eq!(r.engine.choose_survey("A").unwrap().id, "A");
    assert!(r.store.durable().get("neb_A").unwrap().is_none());
}

#[test]
fn panicking_observer_does_not_break_selection() {
    struct Boom;
    impl SelectionObserver for Boom {
        fn on_event(&self, _event: &SelectionEvent) {
            panic!("observer failure");
        }
        fn log(&self, _message: &str) {
            panic!("logger failure");
        }
    }

    let engine = SelectionEngine::new(SelectorCfg::default(), QuarantineStore::in_memory())
        .with_registry(SurveyRegistry::from_definitions([survey("A", 1, 100)]))
        .with_sampler(FixedSampler(0))
        .with_observer(Boom);
    assert_eq!(engine.choose_survey("A").unwrap().id, "A");
    engine.quarantine_survey("A", 2);
    assert!(engine.is_quarantined("A"));
}

#[test]
fn fn_observer_receives_wire_names_and_payloads() {
    let seen = Arc::new(parking_lot::Mutex::new(Vec::<(String, Value)>::new()));
    let sink = seen.clone();
    let engine = SelectionEngine::new(SelectorCfg::default(), QuarantineStore::in_memory())
        .with_registry(SurveyRegistry::from_definitions([survey("A", 4, 100)]))
        .with_sampler(FixedSampler(0))
        .with_observer(FnObserver::new(move |ty: &str, payload: &Value| {
            sink.lock().push((ty.to_string(), payload.clone()));
        }));

    engine.choose_survey("A");
    let seen = seen.lock();
    assert_eq!(seen.last().unwrap().0, "survey_chosen");
    assert_eq!(seen.last().unwrap().1, json!({ "surveyId": "A", "priority": 4 }));
}

#[test]
fn custom_prefix_namespaces_keys() {
    let cfg = SelectorCfg {
        quarantine_key_prefix: "qa_".into(),
        ..SelectorCfg::default()
    };
    let r = rig(cfg, 0, vec![]);
    r.engine.quarantine_survey("A", 0);
    assert!(stored(&r.store, StorageTier::Session, "qa_A").is_some());
    assert!(stored(&r.store, StorageTier::Session, "neb_A").is_none());
}

#[test]
fn selector_cfg_reads_camel_case_with_defaults() {
    let cfg: SelectorCfg = serde_json::from_value(json!({ "userSampling": true })).unwrap();
    assert!(cfg.user_sampling);
    assert_eq!(cfg.quarantine_key_prefix, DEFAULT_QUARANTINE_KEY_PREFIX);
}

#[test]
fn candidate_forms_normalize_the_same_way() {
    assert_eq!(Candidates::from(" A ,B,,C ").normalize(), vec!["A", "B", "C"]);
    assert_eq!(
        Candidates::from(json!([" A", 12, null, "", false])).normalize(),
        vec!["A", "12"]
    );
    assert_eq!(Candidates::from(42_i64).normalize(), vec!["42"]);
    assert!(Candidates::from(0_u32).normalize().is_empty());
}

#[test]
fn user_sampling_exclusion_without_days_writes_nothing() {
    let cfg = SelectorCfg {
        user_sampling: true,
        ..SelectorCfg::default()
    };
    let r = rig(cfg, 80, vec![SurveyDefinition::new("A", 1, 10, 0)]);
    assert!(r.engine.choose_survey("A").is_none());

    assert!(r.store.durable().entries().unwrap().is_empty());
    assert!(r.store.session().entries().unwrap().is_empty());
    assert_eq!(
        r.observer.events()[0],
        SelectionEvent::ExcludedQuarantinedUserSampling {
            survey_id: "A".into(),
            draw: 80,
            threshold: 10,
            days: 0
        }
    );
}

#[test]
fn mixed_draws_evaluate_every_candidate() {
    let cfg = SelectorCfg {
        user_sampling: true,
        ..SelectorCfg::default()
    };
    let observer = Arc::new(RecordingObserver::new());
    let engine = SelectionEngine::new(cfg, QuarantineStore::in_memory())
        .with_registry(SurveyRegistry::from_definitions([
            SurveyDefinition::new("A", 1, 50, 3),
            SurveyDefinition::new("B", 8, 50, 5),
            SurveyDefinition::new("C", 4, 50, 0),
            SurveyDefinition::new("D", 2, 50, 0),
        ]))
        .with_sampler(SequenceSampler::new([10, 90, 50, 51], 0))
        .with_clock(Arc::new(ManualClock::new(NOW)))
        .with_observer(observer.clone());

    // B has the top priority but loses its roll; C is the best included candidate.
    assert_eq!(engine.choose_survey("A,B,C,D").unwrap().id, "C");
    assert_eq!(
        observer.event_types(),
        vec![
            "survey_quarantine_set_on_sample",
            "survey_included_by_sampling",
            "survey_excluded_quarantined_user_sampling",
            "survey_included_by_sampling",
            "survey_excluded_quarantined_user_sampling",
            "survey_chosen",
        ]
    );
    let events = observer.events();
    let ids: Vec<Option<&str>> = events.iter().map(SelectionEvent::survey_id).collect();
    assert_eq!(
        ids,
        vec![Some("A"), Some("A"), Some("B"), Some("C"), Some("D"), Some("C")]
    );

    let store = engine.store();
    let durable: Vec<String> = store.durable().entries().unwrap().into_iter().map(|(k, _)| k).collect();
    assert_eq!(durable, vec!["neb_A", "neb_B"]);
    assert!(store.session().entries().unwrap().is_empty());
    assert!(engine.is_quarantined("A"));
    assert!(engine.is_quarantined("B"));
    assert!(!engine.is_quarantined("C"));
    assert!(!engine.is_quarantined("D"));
}

#[test]
fn sequence_sampler_falls_back_when_exhausted() {
    let s = SequenceSampler::new([7, 93], 42);
    assert_eq!((s.draw(), s.draw(), s.draw(), s.draw()), (7, 93, 42, 42));
}

#[test]
fn thread_rng_draws_stay_in_range() {
    let s = ThreadRngSampler;
    for _ in 0..10_000 {
        assert!(s.draw() < SAMPLE_RANGE);
    }
}

/// Durable tier whose writes always fail.
struct ReadOnlyKv(MemoryStore);

impl KvStore for ReadOnlyKv {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.0.get(key)
    }
    fn set(&self, _key: &str, _value: String) -> StoreResult<()> {
        Err(StoreError::Backend {
            message: "read-only".into(),
        })
    }
    fn remove(&self, key: &str) -> StoreResult<()> {
        self.0.remove(key)
    }
    fn entries(&self) -> StoreResult<Vec<(String, String)>> {
        self.0.entries()
    }
    fn clear(&self) -> StoreResult<()> {
        self.0.clear()
    }
}

#[test]
fn failed_write_emits_nothing_and_leaves_no_state() {
    let store = QuarantineStore::new(Arc::new(ReadOnlyKv(MemoryStore::new())), MemoryStore::shared());
    let observer = Arc::new(RecordingObserver::new());
    let engine = SelectionEngine::new(SelectorCfg::default(), store)
        .with_registry(SurveyRegistry::from_definitions([SurveyDefinition::new("A", 1, 100, 7)]))
        .with_sampler(FixedSampler(0))
        .with_clock(Arc::new(ManualClock::new(NOW)))
        .with_observer(observer.clone());

    engine.quarantine_survey("A", 3);
    assert!(observer.events().is_empty());
    assert!(!engine.is_quarantined("A"));
    assert!(observer.logs().iter().any(|l| l.contains("neb_A")));

    // Sampled in, but the on-sample write fails: no set event, still eligible.
    assert_eq!(engine.choose_survey("A").unwrap().id, "A");
    assert_eq!(
        observer.event_types(),
        vec!["survey_included_by_sampling", "survey_chosen"]
    );
    assert!(!engine.is_quarantined("A"));
}

#[test]
fn manual_clock_can_be_set_back() {
    let r = rig(SelectorCfg::default(), 0, vec![]);
    r.engine.quarantine_survey("A", 2);
    r.clock.set(NOW + 3 * MS_PER_DAY);
    assert!(!r.engine.is_quarantined("A"));

    r.engine.quarantine_survey("A", 2);
    r.clock.set(NOW);
    assert!(r.engine.is_quarantined("A"));
    assert_eq!(r.engine.now_ms(), NOW);
}

#[test]
fn registry_exposes_passthrough_fields() {
    let registry = SurveyRegistry::from_json_value(&json!({
        "exit": { "priority": 2, "percentage": 100, "delay": 1500, "template": "modal" },
        "welcome": { "priority": 1, "percentage": 100 }
    }))
    .unwrap();

    let mut ids: Vec<&str> = registry.iter().map(|s| s.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["exit", "welcome"]);

    let exit = registry.get("exit").unwrap();
    assert_eq!(exit.delay(), Some(&json!(1500)));
    assert_eq!(exit.template(), Some("modal"));
    assert_eq!(registry.get("welcome").unwrap().delay(), None);
}

#[test]
fn none_chosen_has_no_single_survey_id() {
    let r = rig(SelectorCfg::default(), 0, vec![]);
    r.engine.choose_survey("X");
    let events = r.observer.events();
    assert_eq!(events[0].survey_id(), Some("X"));
    assert_eq!(events[1].survey_id(), None);
}

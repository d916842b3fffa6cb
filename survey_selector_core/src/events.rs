//! Decision events and the observer seam.
//!
//! Every observer call is made synchronously and behind `catch_unwind`: a panicking
//! observer is discarded and selection carries on.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::quarantine::StorageTier;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum SelectionEvent {
    #[serde(rename = "survey_missing_config")]
    MissingConfig { survey_id: String },

    #[serde(rename = "survey_chosen")]
    Chosen { survey_id: String, priority: i64 },

    #[serde(rename = "survey_none_chosen")]
    NoneChosen { candidates: Vec<String> },

    /// Written by an explicit quarantine request.
    #[serde(rename = "survey_quarantined")]
    Quarantined {
        survey_id: String,
        days: u32,
        storage: StorageTier,
    },

    #[serde(rename = "survey_quarantined_block")]
    QuarantinedBlock {
        survey_id: String,
        storage: StorageTier,
    },

    #[serde(rename = "survey_quarantine_set_on_sample")]
    QuarantineSetOnSample { survey_id: String, days: u32 },

    #[serde(rename = "survey_included_by_sampling")]
    IncludedBySampling {
        survey_id: String,
        draw: u32,
        threshold: i64,
    },

    #[serde(rename = "survey_excluded_quarantined_user_sampling")]
    ExcludedQuarantinedUserSampling {
        survey_id: String,
        draw: u32,
        threshold: i64,
        days: u32,
    },

    #[serde(rename = "survey_excluded_not_quarantined_event_sampling")]
    ExcludedNotQuarantinedEventSampling {
        survey_id: String,
        draw: u32,
        threshold: i64,
    },
}

impl SelectionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SelectionEvent::MissingConfig { .. } => "survey_missing_config",
            SelectionEvent::Chosen { .. } => "survey_chosen",
            SelectionEvent::NoneChosen { .. } => "survey_none_chosen",
            SelectionEvent::Quarantined { .. } => "survey_quarantined",
            SelectionEvent::QuarantinedBlock { .. } => "survey_quarantined_block",
            SelectionEvent::QuarantineSetOnSample { .. } => "survey_quarantine_set_on_sample",
            SelectionEvent::IncludedBySampling { .. } => "survey_included_by_sampling",
            SelectionEvent::ExcludedQuarantinedUserSampling { .. } => {
                "survey_excluded_quarantined_user_sampling"
            }
            SelectionEvent::ExcludedNotQuarantinedEventSampling { .. } => {
                "survey_excluded_not_quarantined_event_sampling"
            }
        }
    }

    pub fn survey_id(&self) -> Option<&str> {
        match self {
            SelectionEvent::NoneChosen { .. } => None,
            SelectionEvent::MissingConfig { survey_id }
            | SelectionEvent::Chosen { survey_id, .. }
            | SelectionEvent::Quarantined { survey_id, .. }
            | SelectionEvent::QuarantinedBlock { survey_id, .. }
            | SelectionEvent::QuarantineSetOnSample { survey_id, .. }
            | SelectionEvent::IncludedBySampling { survey_id, .. }
            | SelectionEvent::ExcludedQuarantinedUserSampling { survey_id, .. }
            | SelectionEvent::ExcludedNotQuarantinedEventSampling { survey_id, .. } => Some(survey_id),
        }
    }

    /// Structured payload without the `type` tag.
    pub fn payload(&self) -> Value {
        let mut v = serde_json::to_value(self).unwrap_or_default();
        if let Value::Object(map) = &mut v {
            map.remove("type");
        }
        v
    }
}

/// Receives decision events and diagnostic lines.
pub trait SelectionObserver {
    fn on_event(&self, event: &SelectionEvent);

    fn log(&self, _message: &str) {}
}

impl<O: SelectionObserver + ?Sized> SelectionObserver for Arc<O> {
    fn on_event(&self, event: &SelectionEvent) {
        (**self).on_event(event)
    }

    fn log(&self, message: &str) {
        (**self).log(message)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl SelectionObserver for NullObserver {
    fn on_event(&self, _event: &SelectionEvent) {}
}

/// Adapts host callbacks of shape `(event_type, payload)` and `(message)`.
pub struct FnObserver<E, L> {
    on_event: E,
    logger: L,
}

impl<E> FnObserver<E, fn(&str)>
where
    E: Fn(&str, &Value),
{
    pub fn new(on_event: E) -> Self {
        fn ignore(_: &str) {}
        Self {
            on_event,
            logger: ignore,
        }
    }
}

impl<E, L> FnObserver<E, L>
where
    E: Fn(&str, &Value),
    L: Fn(&str),
{
    pub fn with_logger(on_event: E, logger: L) -> Self {
        Self { on_event, logger }
    }
}

impl<E, L> SelectionObserver for FnObserver<E, L>
where
    E: Fn(&str, &Value),
    L: Fn(&str),
{
    fn on_event(&self, event: &SelectionEvent) {
        (self.on_event)(event.event_type(), &event.payload());
    }

    fn log(&self, message: &str) {
        (self.logger)(message)
    }
}

/// Keeps every event and log line in arrival order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SelectionEvent>>,
    logs: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SelectionEvent> {
        self.events.lock().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(SelectionEvent::event_type).collect()
    }

    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
        self.logs.lock().clear();
    }
}

impl SelectionObserver for RecordingObserver {
    fn on_event(&self, event: &SelectionEvent) {
        self.events.lock().push(event.clone());
    }

    fn log(&self, message: &str) {
        self.logs.lock().push(message.to_string());
    }
}

pub(crate) fn emit(observer: &dyn SelectionObserver, event: SelectionEvent) {
    log::debug!("{} {}", event.event_type(), event.payload());
    if catch_unwind(AssertUnwindSafe(|| observer.on_event(&event))).is_err() {
        log::warn!("observer panicked on {}; ignored", event.event_type());
    }
}

pub(crate) fn diagnostic(observer: &dyn SelectionObserver, message: &str) {
    log::debug!("{message}");
    let _ = catch_unwind(AssertUnwindSafe(|| observer.log(message)));
}

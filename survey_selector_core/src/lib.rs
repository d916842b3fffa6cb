pub mod candidates;
pub mod cfg;
pub mod clock;
pub mod error;
pub mod events;
pub mod quarantine;
pub mod sampling;
pub mod survey;

pub mod engine;

pub use candidates::Candidates;
pub use cfg::{SelectorCfg, DEFAULT_QUARANTINE_KEY_PREFIX};
pub use clock::{expiry_after_days, Clock, ManualClock, SystemClock, MS_PER_DAY};
pub use error::{RegistryError, StoreError, StoreResult};
pub use events::{FnObserver, NullObserver, RecordingObserver, SelectionEvent, SelectionObserver};
pub use quarantine::{KvStore, MemoryStore, QuarantineRecord, QuarantineStore, SharedKv, StorageTier};
pub use sampling::{sampled_in, FixedSampler, Sampler, SequenceSampler, ThreadRngSampler, SAMPLE_RANGE};
pub use survey::{coerce_int, SurveyDefinition, SurveyRegistry};

pub use engine::{SelectionEngine, PRIORITY_FLOOR};

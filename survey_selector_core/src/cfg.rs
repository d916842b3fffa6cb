use serde::{Deserialize, Serialize};

pub const DEFAULT_QUARANTINE_KEY_PREFIX: &str = "neb_";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorCfg {
    /// Quarantine surveys that lose the sampling roll, so the same user is not re-rolled.
    pub user_sampling: bool,
    pub quarantine_key_prefix: String,
}

impl Default for SelectorCfg {
    fn default() -> Self {
        Self {
            user_sampling: false,
            quarantine_key_prefix: DEFAULT_QUARANTINE_KEY_PREFIX.to_string(),
        }
    }
}

impl SelectorCfg {
    #[inline]
    pub fn quarantine_key(&self, survey_id: &str) -> String {
        format!("{}{}", self.quarantine_key_prefix, survey_id)
    }
}

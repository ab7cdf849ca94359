//! Scenario factory configuration.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{Local, NaiveDate};

/// Default column declaring the alias of a row.
pub const DEFAULT_ALIAS_COLUMN: &str = "_BaseName";

/// Default field used to match existing records in upsert mode.
pub const DEFAULT_UPSERT_KEY: &str = "Name";

/// Bounded poll-until-visible policy with a fixed retry interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of attempts (at least one attempt is always made)
    pub max_attempts: u32,
    /// Delay between attempts
    pub interval: Duration,
}

impl PollPolicy {
    /// Creates a new poll policy.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Single attempt, no waiting. Used by tests and the in-memory store.
    pub fn immediate() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Upper bound on the time spent sleeping between attempts. The first
    /// attempt runs immediately.
    pub fn timeout(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// Factory configuration.
#[derive(Debug, Clone)]
pub struct FactoryConfig {
    /// Treat every file as upsert regardless of its name
    pub force_upsert: bool,
    /// Column declaring the row alias
    pub alias_column: String,
    /// Upsert match field used when neither handler nor override supplies one
    pub default_upsert_key: String,
    /// Per-object upsert match field overrides (object type -> field)
    pub upsert_keys: HashMap<String, String>,
    /// Fixed "today" for relative dates (None = local date at run start)
    pub today: Option<NaiveDate>,
    /// Poll policy for `_Return:` captures
    pub capture_poll: PollPolicy,
    /// Poll policy for records created by server-side automation
    pub automation_poll: PollPolicy,
}

impl FactoryConfig {
    /// Returns the date relative offsets are computed from.
    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            force_upsert: false,
            alias_column: DEFAULT_ALIAS_COLUMN.to_string(),
            default_upsert_key: DEFAULT_UPSERT_KEY.to_string(),
            upsert_keys: HashMap::new(),
            today: None,
            capture_poll: PollPolicy::new(10, Duration::from_millis(500)),
            automation_poll: PollPolicy::new(20, Duration::from_secs(1)),
        }
    }
}

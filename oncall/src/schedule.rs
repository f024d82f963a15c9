use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static SCHEDULE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{4,10}$").expect("schedule pattern is valid"));

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("Invalid schedule")]
    Invalid,
}

/// A PagerDuty schedule id which has passed validation.
///
/// Only uppercase ASCII letters and digits, 4 to 10 characters long. Values of
/// this type are the only thing allowed to reach the resolver or the cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScheduleId(String);

impl ScheduleId {
    pub fn parse(raw: &str) -> Result<Self, ScheduleError> {
        if SCHEDULE_PATTERN.is_match(raw) {
            Ok(ScheduleId(raw.to_string()))
        } else {
            Err(ScheduleError::Invalid)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which the on-call result for this schedule is cached.
    pub fn cache_key(&self) -> String {
        format!("schedule-{}", self.0)
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

use chrono::{DateTime, Utc};

/// Half-open time interval `[from, to)`; a missing bound is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    /// Range with both ends bounded
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self::new(Some(from), Some(to))
    }

    /// Everything at or after `from`
    pub fn since(from: DateTime<Utc>) -> Self {
        Self::new(Some(from), None)
    }

    /// Everything strictly before `to`
    pub fn until(to: DateTime<Utc>) -> Self {
        Self::new(None, Some(to))
    }

    /// Check if the given time falls within the range
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        if let Some(from) = self.from {
            if time < from {
                return false;
            }
        }

        if let Some(to) = self.to {
            if time >= to {
                return false;
            }
        }

        true
    }
}

use chrono::{DateTime, Utc};

/// Source of the current time for timestamps written by the adapters
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Description of one failed processing attempt, as reported by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Type name of the error that was raised
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    /// Full description, typically including a backtrace
    #[serde(default)]
    pub details: String,
    /// Component that raised the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl FailureInfo {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            details: String::new(),
            source: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Capture an error together with its chain of causes
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut details = error.to_string();
        let mut cause = error.source();
        while let Some(inner) = cause {
            details.push_str("\ncaused by: ");
            details.push_str(&inner.to_string());
            cause = inner.source();
        }

        Self {
            error_type: type_label(error),
            message: error.to_string(),
            details,
            source: None,
        }
    }
}

fn type_label(error: &(dyn std::error::Error + 'static)) -> String {
    // Debug output of most error types starts with the type or variant name
    let debug = format!("{:?}", error);
    debug
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("Error")
        .to_string()
}

/// One line of a message's error log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub time: DateTime<Utc>,
    /// 1-based delivery attempt the failure belongs to
    pub attempt: u32,
    #[serde(flatten)]
    pub info: FailureInfo,
}

impl std::fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (attempt {}): {}: {}",
            self.time.to_rfc3339(),
            self.attempt,
            self.info.error_type,
            self.info.message
        )?;
        if let Some(source) = &self.info.source {
            write!(f, " (source: {})", source)?;
        }
        if !self.info.details.is_empty() {
            write!(f, "\n{}", self.info.details)?;
        }
        Ok(())
    }
}

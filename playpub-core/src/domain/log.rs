//! Log domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single line of build output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    pub fn new(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }
}

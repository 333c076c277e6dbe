use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier;

/// An incident notification from Opsgenie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub alias: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub status: String,
    pub source: String,
    /// Number of times the alert fired while open
    pub count: u64,
    pub priority: String,
    pub tags: Vec<String>,
}

impl Alert {
    /// The single dashboard category derived from the alert's tags.
    pub fn primary_tag(&self) -> &'static str {
        classifier::primary_tag(self.tags.as_slice())
    }
}

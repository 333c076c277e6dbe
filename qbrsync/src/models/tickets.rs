use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Display format ServiceNow uses for `opened_at` / `closed_at` with display values on.
pub const TICKET_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %I:%M:%S %p";

const SECONDS_PER_DAY: f64 = 86_400.0;

/// An incident, requested item, or change request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub number: String,
    pub location: String,
    pub ci_name: String,
    pub short_description: String,
    pub state: String,
    /// Empty when ServiceNow returns no category
    pub category: String,
    pub priority: String,
    /// Only meaningful for change requests, empty otherwise
    pub risk: String,
    pub assigned_to: String,
    pub opened_at: NaiveDateTime,
    pub updated_by: String,
    pub closed_at: Option<NaiveDateTime>,
}

impl Ticket {
    /// Days between opening and closing, rounded to two decimals. `None` while the ticket is open.
    pub fn resolution_days(&self) -> Option<f64> {
        let closed_at = self.closed_at?;
        let seconds = (closed_at - self.opened_at).num_seconds() as f64;
        let days = (seconds / SECONDS_PER_DAY).abs();
        Some((days * 100.0).round() / 100.0)
    }
}

/// Parse a ServiceNow display timestamp such as `2024-01-01 09:00:00 AM`.
pub fn parse_ticket_timestamp(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), TICKET_TIMESTAMP_FORMAT)
}
